//! Static registry of the contracts a deployment knows about.
//!
//! The registry maps a logical contract name to the source identifier the build
//! tool understands, the libraries its bytecode links against, and optionally
//! its constructor signature. It is validated once at construction, so an
//! unknown library or a dependency cycle is caught before anything is sent.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    str::FromStr,
};

use alloy_core::dyn_abi::DynSolType;

use crate::error::RegistryError;

/// Identifier of a contract for the build tool: `path/to/Source.sol:Contract`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceId {
    /// Path of the source unit, relative to the project root.
    pub path: String,
    /// Name of the contract inside the source unit.
    pub contract: String,
}

impl SourceId {
    pub fn new(path: impl Into<String>, contract: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contract: contract.into(),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.contract)
    }
}

impl FromStr for SourceId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((path, contract)) if !path.is_empty() && !contract.is_empty() => {
                Ok(Self::new(path, contract))
            }
            _ => Err(RegistryError::InvalidSourceId(s.to_string())),
        }
    }
}

/// A contract the deployer can create.
#[derive(Debug, Clone)]
pub struct ContractRegistration {
    name: String,
    source: SourceId,
    libraries: Vec<String>,
    constructor: Option<Vec<String>>,
    constructor_types: Option<Vec<DynSolType>>,
}

impl ContractRegistration {
    /// Register `name`, found in the source unit at `path` under the same name.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        let name = name.into();
        let source = SourceId::new(path, name.clone());
        Self::with_source(name, source)
    }

    /// Register `name` with an explicit source identifier.
    pub fn with_source(name: impl Into<String>, source: SourceId) -> Self {
        Self {
            name: name.into(),
            source,
            libraries: Vec::new(),
            constructor: None,
            constructor_types: None,
        }
    }

    /// Add a library this contract links against. Order is preserved.
    pub fn library(mut self, name: impl Into<String>) -> Self {
        self.libraries.push(name.into());
        self
    }

    /// Declare the constructor parameter types, e.g. `["address", "uint256"]`.
    ///
    /// Arguments passed to `deploy` are checked against these types.
    pub fn constructor(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.constructor = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn libraries(&self) -> &[String] {
        &self.libraries
    }

    /// Parsed constructor types, if a constructor signature was declared.
    pub fn constructor_types(&self) -> Option<&[DynSolType]> {
        self.constructor_types.as_deref()
    }

    fn resolve_constructor(&mut self) -> Result<(), RegistryError> {
        let Some(types) = &self.constructor else {
            return Ok(());
        };

        let parsed = types
            .iter()
            .map(|ty| {
                DynSolType::parse(ty).map_err(|e| RegistryError::InvalidConstructorType {
                    contract: self.name.clone(),
                    ty: ty.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.constructor_types = Some(parsed);
        Ok(())
    }
}

/// Validated set of [`ContractRegistration`]s.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: BTreeMap<String, ContractRegistration>,
}

impl ContractRegistry {
    pub fn builder() -> ContractRegistryBuilder {
        ContractRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&ContractRegistration> {
        self.contracts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContractRegistration> {
        self.contracts.values()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

/// Builder for a [`ContractRegistry`].
#[derive(Debug, Default)]
pub struct ContractRegistryBuilder {
    registrations: Vec<ContractRegistration>,
}

impl ContractRegistryBuilder {
    pub fn register(mut self, registration: ContractRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Validate the registrations and build the registry.
    pub fn build(self) -> Result<ContractRegistry, RegistryError> {
        let mut contracts = BTreeMap::new();
        for mut registration in self.registrations {
            registration.resolve_constructor()?;
            let name = registration.name.clone();
            if contracts.insert(name.clone(), registration).is_some() {
                return Err(RegistryError::DuplicateContract(name));
            }
        }

        for registration in contracts.values() {
            for library in &registration.libraries {
                if *library == registration.name {
                    return Err(RegistryError::SelfLink(library.clone()));
                }
                if !contracts.contains_key(library) {
                    return Err(RegistryError::UnknownLibrary {
                        contract: registration.name.clone(),
                        library: library.clone(),
                    });
                }
            }
        }

        let registry = ContractRegistry { contracts };
        registry.check_acyclic()?;

        Ok(registry)
    }
}

impl ContractRegistry {
    fn check_acyclic(&self) -> Result<(), RegistryError> {
        let mut done = HashSet::new();
        for name in self.contracts.keys() {
            let mut path = HashSet::new();
            self.visit(name, &mut path, &mut done)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        path: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Result<(), RegistryError> {
        if done.contains(name) {
            return Ok(());
        }
        if !path.insert(name) {
            return Err(RegistryError::DependencyCycle(name.to_string()));
        }

        if let Some(registration) = self.contracts.get(name) {
            for library in &registration.libraries {
                self.visit(library, path, done)?;
            }
        }

        path.remove(name);
        done.insert(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_display_and_parse() {
        let id = SourceId::new("src/aggregator/MedianAggregator.sol", "MedianAggregator");
        assert_eq!(
            id.to_string(),
            "src/aggregator/MedianAggregator.sol:MedianAggregator"
        );
        assert_eq!(id.to_string().parse::<SourceId>().unwrap(), id);
    }

    #[test]
    fn test_source_id_rejects_missing_contract() {
        assert!("src/A.sol".parse::<SourceId>().is_err());
        assert!("src/A.sol:".parse::<SourceId>().is_err());
        assert!(":A".parse::<SourceId>().is_err());
    }

    #[test]
    fn test_registration_defaults_source_contract_to_name() {
        let registration = ContractRegistration::new("AlloraAdapter", "src/AlloraAdapter.sol");
        assert_eq!(registration.source().contract, "AlloraAdapter");
        assert!(registration.libraries().is_empty());
        assert!(registration.constructor_types().is_none());
    }

    #[test]
    fn test_build_registry() {
        let registry = ContractRegistry::builder()
            .register(ContractRegistration::new("A", "src/A.sol"))
            .register(ContractRegistration::new("B", "src/B.sol").library("A"))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("B").unwrap().libraries(), ["A".to_string()]);
        assert!(registry.get("C").is_none());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let err = ContractRegistry::builder()
            .register(ContractRegistration::new("A", "src/A.sol"))
            .register(ContractRegistration::new("A", "src/Other.sol"))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateContract("A".to_string()));
    }

    #[test]
    fn test_unknown_library_is_rejected() {
        let err = ContractRegistry::builder()
            .register(ContractRegistration::new("B", "src/B.sol").library("A"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownLibrary {
                contract: "B".to_string(),
                library: "A".to_string()
            }
        );
    }

    #[test]
    fn test_self_link_is_rejected() {
        let err = ContractRegistry::builder()
            .register(ContractRegistration::new("A", "src/A.sol").library("A"))
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::SelfLink("A".to_string()));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let err = ContractRegistry::builder()
            .register(ContractRegistration::new("A", "src/A.sol").library("C"))
            .register(ContractRegistration::new("B", "src/B.sol").library("A"))
            .register(ContractRegistration::new("C", "src/C.sol").library("B"))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::DependencyCycle(_)));
    }

    #[test]
    fn test_shared_library_is_not_a_cycle() {
        let registry = ContractRegistry::builder()
            .register(ContractRegistration::new("Math", "src/Math.sol"))
            .register(ContractRegistration::new("A", "src/A.sol").library("Math"))
            .register(
                ContractRegistration::new("B", "src/B.sol")
                    .library("Math")
                    .library("A"),
            )
            .build();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_constructor_types_are_parsed() {
        let registry = ContractRegistry::builder()
            .register(ContractRegistration::new("A", "src/A.sol").constructor(["address", "uint256"]))
            .build()
            .unwrap();

        let types = registry.get("A").unwrap().constructor_types().unwrap();
        assert_eq!(types, [DynSolType::Address, DynSolType::Uint(256)]);
    }

    #[test]
    fn test_invalid_constructor_type_is_rejected() {
        let err = ContractRegistry::builder()
            .register(ContractRegistration::new("A", "src/A.sol").constructor(["adress"]))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConstructorType { .. }));
    }
}
