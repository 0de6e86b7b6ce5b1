//! Deployment manifest: which contracts to deploy, in which order, with which arguments.

use std::path::Path;

use anyhow::{Context, Result};
use chainstage_deploy::{ConstructorArgs, ContractRegistration, ContractRegistry, SourceId};
use serde::Deserialize;

/// One `[[contracts]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractEntry {
    /// Logical name, the key in the deployment record.
    pub name: String,
    /// Solidity source path, relative to the project root.
    pub path: String,
    /// Contract name inside the source file. Defaults to `name`.
    #[serde(default)]
    pub contract: Option<String>,
    /// Names of the libraries to link.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Constructor parameter types, e.g. `["address", "uint256"]`.
    #[serde(default)]
    pub constructor: Vec<String>,
    /// Constructor arguments, one string per parameter.
    #[serde(default)]
    pub args: Vec<String>,
}

impl ContractEntry {
    fn registration(&self) -> ContractRegistration {
        let contract = self.contract.as_deref().unwrap_or(&self.name);
        let registration = ContractRegistration::with_source(
            &self.name,
            SourceId::new(&self.path, contract),
        )
        .constructor(&self.constructor);

        self.libraries
            .iter()
            .fold(registration, |registration, library| registration.library(library))
    }
}

/// The contracts of a deployment, in deployment order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub contracts: Vec<ContractEntry>,
}

impl Manifest {
    /// Load a manifest from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest from {}", path.display()))?;
        content
            .parse()
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }

    /// Build the registry of every contract in the manifest.
    pub fn registry(&self) -> Result<ContractRegistry> {
        let registry = self
            .contracts
            .iter()
            .fold(ContractRegistry::builder(), |builder, entry| {
                builder.register(entry.registration())
            })
            .build()?;
        Ok(registry)
    }

    /// Pair each contract with its typed constructor arguments, in manifest order.
    pub fn plan(&self, registry: &ContractRegistry) -> Result<Vec<(String, ConstructorArgs)>> {
        self.contracts
            .iter()
            .map(|entry| {
                let types = registry
                    .get(&entry.name)
                    .and_then(|registration| registration.constructor_types())
                    .unwrap_or_default();

                let args = ConstructorArgs::coerce(types, &entry.args)
                    .with_context(|| format!("Invalid constructor arguments for `{}`", entry.name))?;

                Ok((entry.name.clone(), args))
            })
            .collect()
    }
}

impl std::str::FromStr for Manifest {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainstage_deploy::RegistryError;
    use tempdir::TempDir;

    const MANIFEST: &str = r#"
        [[contracts]]
        name = "MedianAggregator"
        path = "src/aggregator/MedianAggregator.sol"

        [[contracts]]
        name = "EvenFeeHandler"
        path = "src/feeHandler/EvenFeeHandler.sol"

        [[contracts]]
        name = "AlloraAdapter"
        path = "src/AlloraAdapter.sol"
        libraries = ["MedianAggregator", "EvenFeeHandler"]
        constructor = ["address"]
        args = ["0x238d0abd53fc68fafa0ccd860446e381b400b5be"]
    "#;

    #[test]
    fn test_manifest_plan_keeps_order() {
        let manifest: Manifest = MANIFEST.parse().unwrap();
        let registry = manifest.registry().unwrap();
        let plan = manifest.plan(&registry).unwrap();

        let names: Vec<_> = plan.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["MedianAggregator", "EvenFeeHandler", "AlloraAdapter"]);
        assert!(plan[0].1.is_empty());
        assert_eq!(plan[2].1.len(), 1);
        assert_eq!(
            plan[2].1.to_cli_args().unwrap(),
            vec!["0x238D0abD53fC68fAfa0CCD860446e381b400b5Be"]
        );
    }

    #[test]
    fn test_contract_name_override() {
        let manifest: Manifest = r#"
            [[contracts]]
            name = "FeeHandlerV2"
            path = "src/feeHandler/EvenFeeHandler.sol"
            contract = "EvenFeeHandler"
        "#
        .parse()
        .unwrap();
        let registry = manifest.registry().unwrap();

        assert_eq!(
            registry.get("FeeHandlerV2").unwrap().source().to_string(),
            "src/feeHandler/EvenFeeHandler.sol:EvenFeeHandler"
        );
    }

    #[test]
    fn test_unknown_library_is_rejected() {
        let manifest: Manifest = r#"
            [[contracts]]
            name = "AlloraAdapter"
            path = "src/AlloraAdapter.sol"
            libraries = ["MedianAggregator"]
        "#
        .parse()
        .unwrap();

        let err = manifest.registry().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RegistryError>(),
            Some(RegistryError::UnknownLibrary { .. })
        ));
    }

    #[test]
    fn test_argument_count_mismatch() {
        let manifest: Manifest = r#"
            [[contracts]]
            name = "AlloraAdapter"
            path = "src/AlloraAdapter.sol"
            constructor = ["address"]
        "#
        .parse()
        .unwrap();
        let registry = manifest.registry().unwrap();

        assert!(manifest.plan(&registry).is_err());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result: Result<Manifest, _> = r#"
            [[contracts]]
            name = "A"
            path = "src/A.sol"
            linked = ["B"]
        "#
        .parse();

        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new("chainstage-test").unwrap();
        let path = dir.path().join("Deploy.toml");
        std::fs::write(&path, MANIFEST).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.contracts.len(), 3);
        assert_eq!(manifest.contracts[2].libraries.len(), 2);
    }
}
