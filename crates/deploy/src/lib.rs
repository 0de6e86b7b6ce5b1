//! chainstage-deploy - Idempotent deployment and verification of Solidity contracts.
//!
//! Contracts are registered once in a [`ContractRegistry`], then deployed in order
//! through a [`Deployer`]. Deployed addresses are persisted in a [`RecordStore`]
//! per deployment environment, so re-running a deployment only creates what is
//! missing. Every deployed contract is verified on the block explorer, retrying
//! until the explorer confirms it.

mod address;
pub use address::parse_address;

mod args;
pub use args::ConstructorArgs;

pub mod backend;
pub use backend::{
    CreateOutput, CreateRequest, DeployBackend, LinkedLibrary, VerificationRequest, VerifyOutcome,
};

mod chain;
pub use chain::{ChainClient, ContractInstance};

mod config;
pub use config::{CONFIG_FILENAME, DEFAULT_DEPLOYMENTS_DIR, DeployConfig};

mod deployer;
pub use deployer::{CallOutcome, DeployedContract, Deployer};

pub mod error;
pub use error::{ConfigError, DeployError, RegistryError, VerificationError};

mod explorer;
pub use explorer::{DEFAULT_EXPLORER_API_URL, EtherscanClient};

pub mod forge;
pub use forge::{DEFAULT_FORGE_BINARY, ForgeBackend, ForgeConfig};

mod record;
pub use record::{FileRecordStore, MemoryRecordStore, RecordStore};

mod registry;
pub use registry::{ContractRegistration, ContractRegistry, ContractRegistryBuilder, SourceId};

mod verify;
pub use verify::{DEFAULT_VERIFY_INTERVAL, RetryPolicy, VerificationPoller, Verified};
