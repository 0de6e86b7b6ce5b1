//! chainstage deploys a set of Solidity contracts once, records where they live and
//! verifies them on the block explorer.

mod cli;
mod manifest;

use std::path::Path;

use anyhow::{Context, Result};
use chainstage_deploy::{
    ChainClient, DeployConfig, Deployer, FileRecordStore, ForgeBackend, RecordStore,
    VerificationPoller,
};
use clap::Parser;
use comfy_table::Table;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command};
use manifest::Manifest;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    if let Err(err) = run(cli).await {
        tracing::error!(error = format!("{err:#}"), "chainstage failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = DeployConfig::load(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the current step");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Command::Deploy { manifest } => deploy(&config, &manifest, cancel).await,
        Command::Verify { manifest } => verify(&config, &manifest, cancel).await,
        Command::Status {
            manifest,
            check_code,
        } => status(&config, &manifest, check_code).await,
        Command::Clear => clear(&config),
    }
}

/// Build a deployer for the configured environment.
fn deployer(
    config: &DeployConfig,
    manifest: &Manifest,
    cancel: CancellationToken,
) -> Result<Deployer<FileRecordStore, ForgeBackend>> {
    let registry = manifest.registry()?;
    let store = FileRecordStore::load(config.record_path())?;
    let explorer = config.explorer()?;
    let verify = explorer.is_some();

    let deployer = Deployer::new(
        registry,
        store,
        ForgeBackend::new(config.forge(), explorer),
        config.chain_id,
    );

    if !verify {
        tracing::warn!("ETHERSCAN_API_KEY is not set, contracts will not be verified");
        return Ok(deployer);
    }

    Ok(deployer.with_verification(VerificationPoller::new(config.retry.clone(), cancel)))
}

async fn deploy(config: &DeployConfig, manifest_path: &Path, cancel: CancellationToken) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let mut deployer = deployer(config, &manifest, cancel.clone())?;
    let plan = manifest.plan(deployer.registry())?;

    tracing::info!(
        deployment = %config.deployment_name,
        chain_id = config.chain_id,
        record = %config.record_path().display(),
        contracts = plan.len(),
        "Starting deployment"
    );

    for (name, args) in plan {
        if cancel.is_cancelled() {
            anyhow::bail!("Deployment interrupted before `{name}`");
        }
        deployer.deploy(&name, args).await?;
    }

    tracing::info!(deployment = %config.deployment_name, "Deployment complete");
    print_table(&config.deployment_name, deployer.store(), &manifest, None);

    Ok(())
}

async fn verify(config: &DeployConfig, manifest_path: &Path, cancel: CancellationToken) -> Result<()> {
    if config.etherscan_api_key.is_none() {
        anyhow::bail!("ETHERSCAN_API_KEY is required to verify contracts");
    }

    let manifest = Manifest::load(manifest_path)?;
    let deployer = deployer(config, &manifest, cancel)?;
    let plan = manifest.plan(deployer.registry())?;

    deployer
        .verify_all(plan.iter().map(|(name, args)| (name.as_str(), args)))
        .await?;

    tracing::info!(deployment = %config.deployment_name, "Verification complete");
    Ok(())
}

async fn status(config: &DeployConfig, manifest_path: &Path, check_code: bool) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let store = FileRecordStore::snapshot(config.record_path())?;

    let chain = if check_code {
        Some(
            ChainClient::connect(&config.rpc_url, config.private_key())
                .await
                .context("Failed to connect to the chain")?,
        )
    } else {
        None
    };

    let mut has_code = Vec::with_capacity(manifest.contracts.len());
    for entry in &manifest.contracts {
        let code = match (&chain, store.get(&entry.name)) {
            (Some(chain), Some(address)) => Some(chain.has_code(address).await?),
            _ => None,
        };
        has_code.push(code);
    }

    print_table(
        &config.deployment_name,
        &store,
        &manifest,
        chain.as_ref().map(|_| has_code.as_slice()),
    );

    Ok(())
}

fn clear(config: &DeployConfig) -> Result<()> {
    let mut store = FileRecordStore::load(config.record_path())?;
    let count = store.entries().len();
    store.clear()?;

    tracing::info!(
        deployment = %config.deployment_name,
        record = %store.path().display(),
        cleared = count,
        "Forgot recorded deployments"
    );

    Ok(())
}

fn print_table(
    deployment: &str,
    store: &impl RecordStore,
    manifest: &Manifest,
    has_code: Option<&[Option<bool>]>,
) {
    let mut table = Table::new();

    let mut header = vec!["Contract", "Source", "Address"];
    if has_code.is_some() {
        header.push("Code");
    }
    table.set_header(header);

    for (index, entry) in manifest.contracts.iter().enumerate() {
        let address = store
            .get(&entry.name)
            .map(|address| address.to_checksum(None))
            .unwrap_or_else(|| "-".to_string());
        let source = format!(
            "{}:{}",
            entry.path,
            entry.contract.as_deref().unwrap_or(&entry.name)
        );

        let mut row = vec![entry.name.clone(), source, address];
        if let Some(has_code) = has_code {
            row.push(match has_code.get(index).copied().flatten() {
                Some(true) => "yes".to_string(),
                Some(false) => "missing".to_string(),
                None => "-".to_string(),
            });
        }
        table.add_row(row);
    }

    println!("Deployment `{deployment}`\n{table}");
}
