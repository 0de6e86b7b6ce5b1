//! Address parsing for values coming back from collaborators.

use alloy_core::primitives::Address;

use crate::error::DeployError;

/// Length of a `0x`-prefixed address string.
const ADDRESS_STR_LEN: usize = 42;

/// Parse a `0x`-prefixed, 40 hex character address.
///
/// Stricter than [`Address::from_str`], which also accepts unprefixed input.
pub fn parse_address(raw: &str) -> Result<Address, DeployError> {
    let raw = raw.trim();
    if !raw.starts_with("0x") || raw.len() != ADDRESS_STR_LEN {
        return Err(DeployError::MalformedAddress(raw.to_string()));
    }

    if !raw[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DeployError::MalformedAddress(raw.to_string()));
    }

    raw.parse::<Address>()
        .map_err(|_| DeployError::MalformedAddress(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_address() {
        let address = parse_address("0xA62c64Ec38d4b280192acE99ddFee60768C51562").unwrap();
        assert_eq!(
            format!("{address:#x}"),
            "0xa62c64ec38d4b280192ace99ddfee60768c51562"
        );
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert!(parse_address(" 0xa62c64ec38d4b280192ace99ddfee60768c51562\n").is_ok());
    }

    #[test]
    fn test_parse_rejects_missing_prefix() {
        assert!(parse_address("a62c64ec38d4b280192ace99ddfee60768c51562").is_err());
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        assert!(parse_address("0xa62c64ec38d4b280192ace99ddfee60768c515").is_err());
        assert!(parse_address("0x").is_err());
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        let err = parse_address("0xz62c64ec38d4b280192ace99ddfee60768c51562").unwrap_err();
        assert!(matches!(err, DeployError::MalformedAddress(_)));
    }
}
