//! [`DeployBackend`] backed by the `forge` CLI.
//!
//! Contracts are created with `forge create` and verified with
//! `forge verify-contract`. Verification status is read from the explorer API.

mod cmd;

pub use cmd::{ForgeCreateCmdBuilder, ForgeVerifyCmdBuilder};

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::process::Command;

use crate::{
    backend::{CreateOutput, CreateRequest, DeployBackend, VerificationRequest, VerifyOutcome},
    error::DeployError,
    explorer::EtherscanClient,
};

/// Default name of the forge binary.
pub const DEFAULT_FORGE_BINARY: &str = "forge";

const DEPLOYED_TO_MARKER: &str = "Deployed to:";
const TRANSACTION_HASH_MARKER: &str = "Transaction hash:";

/// Markers `forge verify-contract` prints on success, matched case-insensitively.
const ALREADY_VERIFIED_MARKERS: &[&str] = &["is already verified", "already verified"];
const VERIFIED_MARKERS: &[&str] = &["successfully verified", "pass - verified"];

/// Configuration for the forge backend.
#[derive(Clone)]
pub struct ForgeConfig {
    /// Path or name of the forge binary.
    pub binary: PathBuf,
    /// Foundry project root, used as the working directory.
    pub project_root: PathBuf,
    /// RPC endpoint the contracts are deployed to.
    pub rpc_url: String,
    /// Private key of the deployer.
    pub private_key: String,
}

impl std::fmt::Debug for ForgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeConfig")
            .field("binary", &self.binary)
            .field("project_root", &self.project_root)
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Output of a finished forge invocation.
struct ForgeOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Deploys and verifies contracts by shelling out to `forge`.
#[derive(Debug, Clone)]
pub struct ForgeBackend {
    config: ForgeConfig,
    explorer: Option<EtherscanClient>,
}

impl ForgeBackend {
    pub fn new(config: ForgeConfig, explorer: Option<EtherscanClient>) -> Self {
        Self { config, explorer }
    }

    fn explorer(&self) -> Result<&EtherscanClient> {
        self.explorer
            .as_ref()
            .context("Verification requires an explorer API key")
    }

    async fn run(&self, args: Vec<String>) -> Result<ForgeOutput> {
        let api_key = self.explorer.as_ref().map(EtherscanClient::api_key).unwrap_or_default();
        tracing::debug!(
            binary = %self.config.binary.display(),
            args = ?redact(&args, &[&self.config.private_key, api_key]),
            "Running forge"
        );

        let output = Command::new(&self.config.binary)
            .args(&args)
            .current_dir(&self.config.project_root)
            // A dropped attempt (deadline, cancellation) must not leave forge submitting.
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.config.binary.display()))?;

        Ok(ForgeOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl DeployBackend for ForgeBackend {
    async fn create(&self, request: &CreateRequest<'_>) -> Result<CreateOutput> {
        let args = ForgeCreateCmdBuilder::new(request.source)
            .rpc_url(&self.config.rpc_url)
            .private_key(&self.config.private_key)
            .libraries(request.libraries)
            .constructor_args(request.constructor_args.to_cli_args()?)
            .build();

        let output = self.run(args).await?;
        if !output.success {
            return Err(DeployError::CreateFailed {
                contract: request.name.to_string(),
                reason: last_line(&output.stderr)
                    .or_else(|| last_line(&output.stdout))
                    .unwrap_or("forge exited with an error")
                    .to_string(),
            }
            .into());
        }

        parse_create_output(&output.stdout).ok_or_else(|| {
            DeployError::CreateFailed {
                contract: request.name.to_string(),
                reason: format!("no `{DEPLOYED_TO_MARKER}` line in forge output"),
            }
            .into()
        })
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<VerifyOutcome> {
        let explorer = self.explorer()?;
        let args = ForgeVerifyCmdBuilder::new(request.address, &request.source, request.chain_id)
            .api_key(explorer.api_key())
            .constructor_args(request.constructor_args.to_vec())
            .libraries(&request.libraries)
            .build();

        let output = self.run(args).await?;
        let combined = format!("{}\n{}", output.stdout, output.stderr);

        // forge exits non-zero for "already verified", so the output decides.
        let outcome = interpret_verify_output(&combined);
        if !output.success && !outcome.is_success() {
            anyhow::bail!(
                "forge verify-contract failed: {}",
                last_line(&output.stderr).unwrap_or("no output")
            );
        }

        Ok(outcome)
    }

    async fn check_verified(&self, request: &VerificationRequest) -> Result<bool> {
        self.explorer()?.is_verified(request.address).await
    }
}

/// Extract the deployed address and transaction hash from `forge create` output.
fn parse_create_output(stdout: &str) -> Option<CreateOutput> {
    let value_after = |marker: &str| {
        stdout.lines().find_map(|line| {
            line.split_once(marker)
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .map(str::to_string)
        })
    };

    Some(CreateOutput {
        deployed_to: value_after(DEPLOYED_TO_MARKER)?,
        transaction_hash: value_after(TRANSACTION_HASH_MARKER),
    })
}

/// Classify `forge verify-contract` output. Only explicit markers count as success.
fn interpret_verify_output(output: &str) -> VerifyOutcome {
    let lower = output.to_ascii_lowercase();

    if ALREADY_VERIFIED_MARKERS.iter().any(|m| lower.contains(m)) {
        VerifyOutcome::AlreadyVerified
    } else if VERIFIED_MARKERS.iter().any(|m| lower.contains(m)) {
        VerifyOutcome::Verified
    } else {
        VerifyOutcome::Inconclusive(last_line(output).unwrap_or_default().to_string())
    }
}

fn last_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).rfind(|line| !line.is_empty())
}

/// Replace secret values in a command line before logging it.
fn redact(args: &[String], secrets: &[&str]) -> Vec<String> {
    args.iter()
        .map(|arg| {
            if secrets.iter().any(|s| !s.is_empty() && arg == s) {
                "<redacted>".to_string()
            } else {
                arg.clone()
            }
        })
        .collect()
}
