//! The deploy orchestrator.

use std::future::Future;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};

use crate::{
    address::parse_address,
    args::ConstructorArgs,
    backend::{CreateRequest, DeployBackend, LinkedLibrary, VerificationRequest},
    chain::{ChainClient, ContractInstance},
    error::DeployError,
    record::RecordStore,
    registry::{ContractRegistration, ContractRegistry, SourceId},
    verify::VerificationPoller,
};

/// A contract known to be deployed in the current environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    name: String,
    source: SourceId,
    address: Address,
}

impl DeployedContract {
    pub(crate) fn new(registration: &ContractRegistration, address: Address) -> Self {
        Self {
            name: registration.name().to_string(),
            source: registration.source().clone(),
            address,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Attach to the deployed contract through a signing chain client.
    pub fn attach<'a>(&self, chain: &'a ChainClient) -> ContractInstance<'a> {
        chain.at(self.address)
    }
}

/// Result of [`Deployer::call`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T> {
    /// The effect was already present, nothing was submitted.
    AlreadyComplete,
    /// The operation was submitted and completed.
    Executed(T),
}

/// Deploys registered contracts idempotently and drives their verification.
///
/// Contracts are deployed one at a time, in the order the caller asks for them.
/// An address is persisted before its verification starts, so an interrupted
/// run can always be resumed by running it again.
pub struct Deployer<S, B> {
    registry: ContractRegistry,
    store: S,
    backend: B,
    chain_id: u64,
    verifier: Option<VerificationPoller>,
}

impl<S, B> Deployer<S, B>
where
    S: RecordStore,
    B: DeployBackend,
{
    /// Create a deployer with verification disabled.
    pub fn new(registry: ContractRegistry, store: S, backend: B, chain_id: u64) -> Self {
        Self {
            registry,
            store,
            backend,
            chain_id,
            verifier: None,
        }
    }

    /// Verify every deployed contract with the given poller.
    pub fn with_verification(mut self, verifier: VerificationPoller) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Recorded address of a contract, if it has been deployed.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.store.get(name)
    }

    /// Forget every recorded deployment.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()
    }

    /// Deploy `name`, or attach to it if it is already recorded.
    ///
    /// Verification runs to completion before this returns, both for fresh
    /// deployments and for recorded ones that are not verified yet.
    pub async fn deploy(&mut self, name: &str, args: ConstructorArgs) -> Result<DeployedContract> {
        let registration = self
            .registry
            .get(name)
            .ok_or_else(|| DeployError::UnknownContract(name.to_string()))?;

        if let Some(types) = registration.constructor_types() {
            args.check(types)
                .map_err(|reason| DeployError::ConstructorMismatch {
                    contract: name.to_string(),
                    reason,
                })?;
        }

        if let Some(address) = self.store.get(name) {
            tracing::info!(contract = %name, address = %address, "Already deployed");
            let libraries = resolve_libraries(&self.registry, &self.store, registration)?;
            self.run_verification(registration, address, &args, libraries)
                .await?;
            return Ok(DeployedContract::new(registration, address));
        }

        let libraries = resolve_libraries(&self.registry, &self.store, registration)?;

        tracing::info!(
            contract = %name,
            source = %registration.source(),
            libraries = libraries.len(),
            "Deploying..."
        );

        let output = self
            .backend
            .create(&CreateRequest {
                name,
                source: registration.source(),
                constructor_args: &args,
                libraries: &libraries,
            })
            .await
            .with_context(|| format!("Failed to deploy `{name}`"))?;

        let address = parse_address(&output.deployed_to)?;

        self.store
            .set(name, address)
            .with_context(|| format!("Failed to record address of `{name}`"))?;

        tracing::info!(
            contract = %name,
            address = %address,
            tx_hash = ?output.transaction_hash,
            "Deployed"
        );

        self.run_verification(registration, address, &args, libraries)
            .await?;

        Ok(DeployedContract::new(registration, address))
    }

    /// Re-run verification for every recorded contract of a deployment plan.
    ///
    /// Contracts that are not recorded yet are skipped.
    pub async fn verify_all<'a>(
        &self,
        plan: impl IntoIterator<Item = (&'a str, &'a ConstructorArgs)>,
    ) -> Result<()> {
        for (name, args) in plan {
            let registration = self
                .registry
                .get(name)
                .ok_or_else(|| DeployError::UnknownContract(name.to_string()))?;

            let Some(address) = self.store.get(name) else {
                tracing::info!(contract = %name, "Not deployed yet, skipping verification");
                continue;
            };

            let libraries = resolve_libraries(&self.registry, &self.store, registration)?;
            self.run_verification(registration, address, args, libraries)
                .await?;
        }

        Ok(())
    }

    /// Run a state-changing operation unless its effect is already present.
    ///
    /// `operation` is not polled, and therefore not submitted, when
    /// `already_complete` reports the effect as present.
    pub async fn call<T, Op, P, Fut>(
        &self,
        label: &str,
        operation: Op,
        already_complete: P,
    ) -> Result<CallOutcome<T>>
    where
        Op: Future<Output = Result<T>>,
        P: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let done = already_complete()
            .await
            .with_context(|| format!("Failed to check whether `{label}` already ran"))?;

        if done {
            tracing::info!(call = %label, "Already complete");
            return Ok(CallOutcome::AlreadyComplete);
        }

        tracing::info!(call = %label, "Executing...");
        let value = operation
            .await
            .with_context(|| format!("Failed to execute `{label}`"))?;
        tracing::info!(call = %label, "Complete");

        Ok(CallOutcome::Executed(value))
    }

    async fn run_verification(
        &self,
        registration: &ContractRegistration,
        address: Address,
        args: &ConstructorArgs,
        libraries: Vec<LinkedLibrary>,
    ) -> Result<()> {
        let Some(verifier) = &self.verifier else {
            tracing::debug!(contract = %registration.name(), "Verification disabled, skipping");
            return Ok(());
        };

        let request = VerificationRequest {
            address,
            source: registration.source().clone(),
            constructor_args: args.abi_encode().into(),
            chain_id: self.chain_id,
            libraries,
        };

        verifier
            .run(&self.backend, registration.name(), &request)
            .await?;

        Ok(())
    }
}

/// Resolve the linked libraries of a contract from the record.
fn resolve_libraries(
    registry: &ContractRegistry,
    store: &impl RecordStore,
    registration: &ContractRegistration,
) -> Result<Vec<LinkedLibrary>, DeployError> {
    registration
        .libraries()
        .iter()
        .map(|library| {
            let address = store
                .get(library)
                .ok_or_else(|| DeployError::DependencyNotDeployed {
                    contract: registration.name().to_string(),
                    library: library.clone(),
                })?;
            let source = registry
                .get(library)
                .ok_or_else(|| DeployError::UnknownContract(library.clone()))?
                .source()
                .clone();

            Ok(LinkedLibrary {
                source,
                name: library.clone(),
                address,
            })
        })
        .collect()
}
