//! Error kinds callers need to tell apart.
//!
//! Everything else flows through [`anyhow::Error`] with context attached. These
//! enums are carried inside it and can be recovered with `downcast_ref`.

use std::time::Duration;

use alloy_core::primitives::Address;

/// Missing or invalid configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration key `{0}`")]
    MissingKey(&'static str),
    #[error("invalid value for configuration key `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// A registry that cannot be built.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("contract `{0}` is registered more than once")]
    DuplicateContract(String),
    #[error("contract `{contract}` links against unregistered library `{library}`")]
    UnknownLibrary { contract: String, library: String },
    #[error("contract `{0}` links against itself")]
    SelfLink(String),
    #[error("library dependency cycle through `{0}`")]
    DependencyCycle(String),
    #[error("contract `{contract}` declares invalid constructor type `{ty}`: {reason}")]
    InvalidConstructorType {
        contract: String,
        ty: String,
        reason: String,
    },
    #[error("invalid source identifier `{0}`, expected `path:Contract`")]
    InvalidSourceId(String),
}

/// Failures of a single `deploy` call.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("contract `{0}` is not registered")]
    UnknownContract(String),
    #[error("library `{library}` not yet deployed for contract `{contract}`")]
    DependencyNotDeployed { contract: String, library: String },
    #[error("constructor arguments for `{contract}` do not match its signature: {reason}")]
    ConstructorMismatch { contract: String, reason: String },
    #[error("malformed deployed address `{0}`")]
    MalformedAddress(String),
    #[error("`{contract}` is already recorded at {recorded}, refusing to overwrite with {attempted}")]
    AddressConflict {
        contract: String,
        recorded: Address,
        attempted: Address,
    },
    #[error("failed to create `{contract}`: {reason}")]
    CreateFailed { contract: String, reason: String },
}

/// Terminal verification failures. Only raised once a configured bound trips.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("verification of {address} still failing after {attempts} attempts: {last_error}")]
    AttemptsExhausted {
        address: Address,
        attempts: usize,
        last_error: String,
    },
    #[error("verification of {address} did not complete within {deadline:?}")]
    DeadlineElapsed { address: Address, deadline: Duration },
    #[error("verification of {0} was cancelled")]
    Cancelled(Address),
}
