//! The deploy/verify capability the orchestrator drives.

use std::future::Future;

use alloy_core::primitives::{Address, Bytes};
use anyhow::Result;

use crate::{args::ConstructorArgs, registry::SourceId};

/// A library already deployed and linked into the contract being created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedLibrary {
    pub source: SourceId,
    pub name: String,
    pub address: Address,
}

impl LinkedLibrary {
    /// Render as `path:Contract:0xaddress`, the form the build tool links with.
    pub fn to_link_arg(&self) -> String {
        format!("{}:{}", self.source, self.address.to_checksum(None))
    }
}

/// Everything needed to create one contract.
#[derive(Debug, Clone)]
pub struct CreateRequest<'a> {
    pub name: &'a str,
    pub source: &'a SourceId,
    pub constructor_args: &'a ConstructorArgs,
    pub libraries: &'a [LinkedLibrary],
}

/// Raw result of a create call. The address is validated by the deployer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutput {
    pub deployed_to: String,
    pub transaction_hash: Option<String>,
}

/// A request to publish a deployed contract's metadata to the explorer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub address: Address,
    pub source: SourceId,
    pub constructor_args: Bytes,
    pub chain_id: u64,
    pub libraries: Vec<LinkedLibrary>,
}

/// Result of one verification submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The submission was accepted and the explorer confirmed it.
    Verified,
    /// The explorer already had the source for this address.
    AlreadyVerified,
    /// Anything without an explicit success marker. Retried.
    Inconclusive(String),
}

impl VerifyOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Verified | Self::AlreadyVerified)
    }
}

/// External collaborator that creates and verifies contracts.
pub trait DeployBackend: Send + Sync {
    /// Create a contract on-chain and report its address.
    fn create(&self, request: &CreateRequest<'_>) -> impl Future<Output = Result<CreateOutput>> + Send;

    /// Submit a verification request to the explorer.
    fn verify(&self, request: &VerificationRequest) -> impl Future<Output = Result<VerifyOutcome>> + Send;

    /// Ask the explorer whether the address is already verified.
    fn check_verified(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<bool>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;

    #[test]
    fn test_link_arg() {
        let library = LinkedLibrary {
            source: SourceId::new("src/lib/Math.sol", "Math"),
            name: "Math".to_string(),
            address: address!("0xa62c64ec38d4b280192ace99ddfee60768c51562"),
        };

        assert_eq!(
            library.to_link_arg(),
            "src/lib/Math.sol:Math:0xA62c64Ec38d4b280192acE99ddFee60768C51562"
        );
    }

    #[test]
    fn test_outcome_success() {
        assert!(VerifyOutcome::Verified.is_success());
        assert!(VerifyOutcome::AlreadyVerified.is_success());
        assert!(!VerifyOutcome::Inconclusive("Pending in queue".to_string()).is_success());
    }
}
