//! Constructor arguments.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue},
    hex,
};
use anyhow::{Context, Result};
use derive_more::{Deref, From};

/// Ordered constructor arguments for a contract.
///
/// Values are typed ABI values, rendered to strings for the build tool and
/// ABI-encoded for explorer verification.
#[derive(Debug, Clone, Default, PartialEq, Deref, From)]
pub struct ConstructorArgs(Vec<DynSolValue>);

impl ConstructorArgs {
    pub fn new(values: impl IntoIterator<Item = DynSolValue>) -> Self {
        Self(values.into_iter().collect())
    }

    /// No constructor arguments.
    pub fn none() -> Self {
        Self::default()
    }

    /// Build arguments by coercing raw strings to the given types.
    pub fn coerce(types: &[DynSolType], raw: &[impl AsRef<str>]) -> Result<Self> {
        if types.len() != raw.len() {
            anyhow::bail!(
                "expected {} constructor arguments, got {}",
                types.len(),
                raw.len()
            );
        }

        types
            .iter()
            .zip(raw)
            .enumerate()
            .map(|(index, (ty, value))| {
                ty.coerce_str(value.as_ref()).with_context(|| {
                    format!(
                        "constructor argument {index} `{}` is not a valid {ty}",
                        value.as_ref()
                    )
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Check the arguments against a constructor signature.
    ///
    /// Returns a human-readable reason on mismatch.
    pub fn check(&self, types: &[DynSolType]) -> Result<(), String> {
        if types.len() != self.0.len() {
            return Err(format!(
                "expected {} arguments, got {}",
                types.len(),
                self.0.len()
            ));
        }

        for (index, (ty, value)) in types.iter().zip(&self.0).enumerate() {
            if !ty.matches(value) {
                let found = value
                    .as_type()
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(format!("argument {index} should be {ty}, found {found}"));
            }
        }

        Ok(())
    }

    /// ABI-encode the arguments as constructor parameters.
    pub fn abi_encode(&self) -> Vec<u8> {
        if self.0.is_empty() {
            return Vec::new();
        }
        DynSolValue::Tuple(self.0.clone()).abi_encode_params()
    }

    /// Render each argument in the textual form `forge` accepts.
    pub fn to_cli_args(&self) -> Result<Vec<String>> {
        self.0.iter().map(render).collect()
    }
}

fn render(value: &DynSolValue) -> Result<String> {
    let rendered = match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::FixedBytes(word, size) => hex::encode_prefixed(&word[..*size]),
        DynSolValue::Address(address) => address.to_checksum(None),
        DynSolValue::Function(function) => hex::encode_prefixed(function),
        DynSolValue::Bytes(bytes) => hex::encode_prefixed(bytes),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) => {
            format!("[{}]", render_all(values)?)
        }
        DynSolValue::Tuple(values) => format!("({})", render_all(values)?),
        #[allow(unreachable_patterns)]
        other => anyhow::bail!("unsupported constructor argument {other:?}"),
    };
    Ok(rendered)
}

fn render_all(values: &[DynSolValue]) -> Result<String> {
    Ok(values
        .iter()
        .map(render)
        .collect::<Result<Vec<_>>>()?
        .join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::{U256, address};

    const ADMIN: &str = "0xA62c64Ec38d4b280192acE99ddFee60768C51562";

    #[test]
    fn test_render_primitives() {
        let args = ConstructorArgs::new([
            DynSolValue::String("ForgeUSD".to_string()),
            DynSolValue::Uint(U256::from(18u64), 8),
            DynSolValue::Bool(true),
            DynSolValue::Address(address!("0xa62c64ec38d4b280192ace99ddfee60768c51562")),
            DynSolValue::Bytes(vec![0xde, 0xad]),
        ]);

        assert_eq!(
            args.to_cli_args().unwrap(),
            vec!["ForgeUSD", "18", "true", ADMIN, "0xdead"]
        );
    }

    #[test]
    fn test_render_nested() {
        let args = ConstructorArgs::new([
            DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1u64), 256),
                DynSolValue::Uint(U256::from(2u64), 256),
            ]),
            DynSolValue::Tuple(vec![
                DynSolValue::Bool(false),
                DynSolValue::String("x".to_string()),
            ]),
        ]);

        assert_eq!(args.to_cli_args().unwrap(), vec!["[1,2]", "(false,x)"]);
    }

    #[test]
    fn test_abi_encode_empty() {
        assert!(ConstructorArgs::none().abi_encode().is_empty());
    }

    #[test]
    fn test_abi_encode_address() {
        let args = ConstructorArgs::new([DynSolValue::Address(address!(
            "0xa62c64ec38d4b280192ace99ddfee60768c51562"
        ))]);

        assert_eq!(
            hex::encode(args.abi_encode()),
            "000000000000000000000000a62c64ec38d4b280192ace99ddfee60768c51562"
        );
    }

    #[test]
    fn test_coerce_from_strings() {
        let types = [DynSolType::Address, DynSolType::Uint(256)];
        let args = ConstructorArgs::coerce(&types, &[ADMIN, "1000"]).unwrap();

        assert_eq!(args.len(), 2);
        assert_eq!(args[1], DynSolValue::Uint(U256::from(1000u64), 256));
        assert!(args.check(&types).is_ok());
    }

    #[test]
    fn test_coerce_rejects_bad_values() {
        assert!(ConstructorArgs::coerce(&[DynSolType::Address], &["not-an-address"]).is_err());
        assert!(ConstructorArgs::coerce(&[DynSolType::Address], &[ADMIN, ADMIN]).is_err());
    }

    #[test]
    fn test_check_mismatch() {
        let args = ConstructorArgs::new([DynSolValue::String("x".to_string())]);

        assert!(args.check(&[]).is_err());
        let reason = args.check(&[DynSolType::Address]).unwrap_err();
        assert!(reason.contains("argument 0"), "{reason}");
    }
}
