//! Deployment configuration.
//!
//! Values come from an optional TOML file, overridden by environment variables
//! of the same name in upper case (`RPC_URL`, `PRIVATE_KEY`, ...).

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use url::Url;

use crate::{
    error::ConfigError,
    explorer::{DEFAULT_EXPLORER_API_URL, EtherscanClient},
    forge::{DEFAULT_FORGE_BINARY, ForgeConfig},
    verify::{DEFAULT_VERIFY_INTERVAL, RetryPolicy},
};

/// The default name of the configuration file.
pub const CONFIG_FILENAME: &str = "Chainstage.toml";

/// Default directory holding one record file per deployment environment.
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deployments";

/// Environment variables read by [`DeployConfig::load`].
const ENV_KEYS: &[&str] = &[
    "DEPLOYMENT_NAME",
    "RPC_URL",
    "PRIVATE_KEY",
    "CHAIN_ID",
    "ETHERSCAN_API_KEY",
    "EXPLORER_API_URL",
    "DEPLOYMENTS_DIR",
    "PROJECT_ROOT",
    "FORGE_BINARY",
    "VERIFY_INTERVAL_SECS",
    "VERIFY_MAX_ATTEMPTS",
    "VERIFY_TIMEOUT_SECS",
];

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    deployment_name: Option<String>,
    rpc_url: Option<String>,
    private_key: Option<String>,
    chain_id: Option<u64>,
    etherscan_api_key: Option<String>,
    explorer_api_url: Option<String>,
    deployments_dir: Option<PathBuf>,
    project_root: Option<PathBuf>,
    forge_binary: Option<PathBuf>,
    verify_interval_secs: Option<u64>,
    verify_max_attempts: Option<usize>,
    verify_timeout_secs: Option<u64>,
}

fn required<T>(value: Option<T>, key: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::MissingKey(key))
}

fn required_str(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    required(value.filter(|s| !s.trim().is_empty()), key)
}

/// Reject an explicit zero.
fn positive<T>(value: Option<T>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: PartialEq + Default,
{
    match value {
        Some(v) if v == T::default() => Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        other => Ok(other),
    }
}

/// Settings for one deployment environment.
#[derive(Clone)]
pub struct DeployConfig {
    /// Name of the deployment environment, also the record file name.
    pub deployment_name: String,
    /// RPC endpoint of the target chain.
    pub rpc_url: Url,
    /// Numeric chain identifier, used for verification.
    pub chain_id: u64,
    /// Explorer API key. Verification is disabled without one.
    pub etherscan_api_key: Option<String>,
    /// Explorer API endpoint.
    pub explorer_api_url: String,
    /// Directory holding the deployment records.
    pub deployments_dir: PathBuf,
    /// Foundry project root the build tool runs in.
    pub project_root: PathBuf,
    /// Path or name of the forge binary.
    pub forge_binary: PathBuf,
    /// Retry policy of the verification loop.
    pub retry: RetryPolicy,
    private_key: String,
}

impl std::fmt::Debug for DeployConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployConfig")
            .field("deployment_name", &self.deployment_name)
            .field("rpc_url", &self.rpc_url.as_str())
            .field("chain_id", &self.chain_id)
            .field("etherscan_api_key", &self.etherscan_api_key.as_ref().map(|_| "<redacted>"))
            .field("explorer_api_url", &self.explorer_api_url)
            .field("deployments_dir", &self.deployments_dir)
            .field("project_root", &self.project_root)
            .field("forge_binary", &self.forge_binary)
            .field("retry", &self.retry)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl DeployConfig {
    /// Configuration sources: the TOML file if given, then the environment.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::raw().only(ENV_KEYS))
    }

    /// Load the configuration from the file and the environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_file
            && !path.exists()
        {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let config = Self::from_figment(&Self::figment(config_file))?;
        tracing::debug!(config = ?config, "Configuration loaded");
        Ok(config)
    }

    /// Build the configuration from an arbitrary figment.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let raw: RawConfig = figment
            .extract()
            .context("Failed to read configuration")?;

        let deployment_name = required_str(raw.deployment_name, "DEPLOYMENT_NAME")?;
        if deployment_name.contains(['/', '\\']) {
            return Err(ConfigError::Invalid {
                key: "DEPLOYMENT_NAME",
                reason: "must not contain path separators".to_string(),
            }
            .into());
        }

        let rpc_url = required_str(raw.rpc_url, "RPC_URL")?;
        let rpc_url = Url::parse(&rpc_url).map_err(|e| ConfigError::Invalid {
            key: "RPC_URL",
            reason: e.to_string(),
        })?;

        let private_key = required_str(raw.private_key, "PRIVATE_KEY")?;
        let chain_id = required(raw.chain_id, "CHAIN_ID")?;

        let retry = RetryPolicy::default()
            .interval(
                positive(raw.verify_interval_secs, "VERIFY_INTERVAL_SECS")?
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_VERIFY_INTERVAL),
            )
            .max_attempts(positive(raw.verify_max_attempts, "VERIFY_MAX_ATTEMPTS")?)
            .deadline(positive(raw.verify_timeout_secs, "VERIFY_TIMEOUT_SECS")?.map(Duration::from_secs));

        Ok(Self {
            deployment_name,
            rpc_url,
            chain_id,
            etherscan_api_key: raw.etherscan_api_key.filter(|k| !k.trim().is_empty()),
            explorer_api_url: raw
                .explorer_api_url
                .unwrap_or_else(|| DEFAULT_EXPLORER_API_URL.to_string()),
            deployments_dir: raw
                .deployments_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEPLOYMENTS_DIR)),
            project_root: raw.project_root.unwrap_or_else(|| PathBuf::from(".")),
            forge_binary: raw
                .forge_binary
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FORGE_BINARY)),
            retry,
            private_key,
        })
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    /// Path of the record file for this deployment environment.
    pub fn record_path(&self) -> PathBuf {
        self.deployments_dir
            .join(format!("{}.json", self.deployment_name))
    }

    /// Explorer client, if an API key is configured.
    pub fn explorer(&self) -> Result<Option<EtherscanClient>> {
        self.etherscan_api_key
            .as_ref()
            .map(|key| EtherscanClient::new(&self.explorer_api_url, key, self.chain_id))
            .transpose()
    }

    /// Settings for the forge backend.
    pub fn forge(&self) -> ForgeConfig {
        ForgeConfig {
            binary: self.forge_binary.clone(),
            project_root: self.project_root.clone(),
            rpc_url: self.rpc_url.to_string(),
            private_key: self.private_key.clone(),
        }
    }
}
