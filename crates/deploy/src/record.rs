//! Durable record of deployed contract addresses.
//!
//! One record exists per deployment environment. It is the sole source of truth
//! for what has already been deployed, so every write is a full atomic rewrite.

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use fs2::FileExt;

use crate::{address::parse_address, error::DeployError};

/// Storage for the name -> address mapping of one deployment environment.
pub trait RecordStore {
    /// Look up the recorded address of a contract.
    fn get(&self, name: &str) -> Option<Address>;

    /// Record the address of a contract and flush it before returning.
    ///
    /// Recording the same address twice is a no-op. Recording a different
    /// address for an existing name fails with [`DeployError::AddressConflict`].
    fn set(&mut self, name: &str, address: Address) -> Result<()>;

    /// Drop every recorded address and flush.
    fn clear(&mut self) -> Result<()>;

    /// All recorded entries, ordered by name.
    fn entries(&self) -> Vec<(String, Address)>;
}

fn check_conflict(
    addresses: &BTreeMap<String, Address>,
    name: &str,
    address: Address,
) -> Result<bool> {
    match addresses.get(name) {
        Some(recorded) if *recorded == address => Ok(false),
        Some(recorded) => Err(DeployError::AddressConflict {
            contract: name.to_string(),
            recorded: *recorded,
            attempted: address,
        }
        .into()),
        None => Ok(true),
    }
}

/// In-memory record, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    addresses: BTreeMap<String, Address>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, name: &str) -> Option<Address> {
        self.addresses.get(name).copied()
    }

    fn set(&mut self, name: &str, address: Address) -> Result<()> {
        if check_conflict(&self.addresses, name, address)? {
            self.addresses.insert(name.to_string(), address);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.addresses.clear();
        Ok(())
    }

    fn entries(&self) -> Vec<(String, Address)> {
        self.addresses
            .iter()
            .map(|(name, address)| (name.clone(), *address))
            .collect()
    }
}

/// Record persisted as a flat JSON object `{ "Name": "0x..." }`.
///
/// The store holds an exclusive advisory lock on `<file>.lock` for its whole
/// lifetime, so two orchestrators cannot target the same environment at once.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
    addresses: BTreeMap<String, Address>,
    _lock: File,
}

impl FileRecordStore {
    /// Load the record at `path`, or create an empty one if the file is absent.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create deployments directory {}", parent.display())
            })?;
        }

        let lock = Self::acquire_lock(&path)?;

        let mut store = Self {
            path,
            addresses: BTreeMap::new(),
            _lock: lock,
        };

        if store.path.exists() {
            store.addresses = Self::read(&store.path)?;
            tracing::debug!(
                path = %store.path.display(),
                contracts = store.addresses.len(),
                "Deployment record loaded"
            );
        } else {
            store.flush()?;
            tracing::info!(path = %store.path.display(), "Initialized empty deployment record");
        }

        Ok(store)
    }

    /// Path of the backing JSON file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.with_extension("json.lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        lock.try_lock_exclusive().with_context(|| {
            format!(
                "Deployment record {} is in use by another process",
                path.display()
            )
        })?;

        Ok(lock)
    }

    fn read(path: &Path) -> Result<BTreeMap<String, Address>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment record {}", path.display()))?;

        let raw: BTreeMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployment record {}", path.display()))?;

        raw.into_iter()
            .map(|(name, address)| {
                let address = parse_address(&address).with_context(|| {
                    format!(
                        "Invalid address for `{name}` in deployment record {}",
                        path.display()
                    )
                })?;
                Ok((name, address))
            })
            .collect()
    }

    /// Rewrite the whole file through a temp file and a rename.
    fn flush(&self) -> Result<()> {
        let raw: BTreeMap<&str, String> = self
            .addresses
            .iter()
            .map(|(name, address)| (name.as_str(), address.to_checksum(None)))
            .collect();
        let json =
            serde_json::to_string_pretty(&raw).context("Failed to serialize deployment record")?;

        let tmp_path = self.path.with_extension("json.tmp");
        let mut tmp = File::create(&tmp_path)
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        tmp.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tmp.sync_all()
            .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to replace deployment record {}",
                self.path.display()
            )
        })?;

        sync_parent_dir(&self.path)
    }

    /// Read the record at `path` without taking the lock or creating anything.
    ///
    /// A missing file reads as an empty record.
    pub fn snapshot(path: impl AsRef<Path>) -> Result<MemoryRecordStore> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(MemoryRecordStore::default());
        }

        Ok(MemoryRecordStore {
            addresses: Self::read(path)?,
        })
    }
}

/// Make a rename in the directory holding `path` durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .with_context(|| format!("Failed to sync directory {}", parent.display()))
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

impl RecordStore for FileRecordStore {
    fn get(&self, name: &str) -> Option<Address> {
        self.addresses.get(name).copied()
    }

    fn set(&mut self, name: &str, address: Address) -> Result<()> {
        if !check_conflict(&self.addresses, name, address)? {
            return Ok(());
        }

        self.addresses.insert(name.to_string(), address);
        if let Err(err) = self.flush() {
            self.addresses.remove(name);
            return Err(err);
        }

        tracing::debug!(contract = %name, address = %address, path = %self.path.display(), "Address recorded");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let previous = std::mem::take(&mut self.addresses);
        if let Err(err) = self.flush() {
            self.addresses = previous;
            return Err(err);
        }

        tracing::info!(path = %self.path.display(), "Deployment record cleared");
        Ok(())
    }

    fn entries(&self) -> Vec<(String, Address)> {
        self.addresses
            .iter()
            .map(|(name, address)| (name.clone(), *address))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;
    use tempdir::TempDir;

    const ADDR_A: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    const ADDR_B: Address = address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

    #[test]
    fn test_load_creates_empty_record() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("deployments/sepolia.json");

        let store = FileRecordStore::load(&path).expect("Failed to load record");

        assert!(store.entries().is_empty());
        let content = std::fs::read_to_string(&path).expect("Record file should exist");
        assert_eq!(content.trim(), "{}");
    }

    #[test]
    fn test_set_then_reload() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("sepolia.json");

        {
            let mut store = FileRecordStore::load(&path).expect("Failed to load record");
            store.set("MedianAggregator", ADDR_A).expect("Failed to set");
        }

        let store = FileRecordStore::load(&path).expect("Failed to reload record");
        assert_eq!(store.get("MedianAggregator"), Some(ADDR_A));
        assert_eq!(store.get("AlloraAdapter"), None);
    }

    #[test]
    fn test_file_is_flat_json_object() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("sepolia.json");

        let mut store = FileRecordStore::load(&path).expect("Failed to load record");
        store.set("A", ADDR_A).expect("Failed to set");

        let content = std::fs::read_to_string(&path).expect("Failed to read record");
        let value: serde_json::Value = serde_json::from_str(&content).expect("Invalid JSON");
        let object = value.as_object().expect("Record should be a JSON object");
        assert_eq!(object.len(), 1);
        assert_eq!(
            object["A"].as_str().map(str::to_lowercase).as_deref(),
            Some("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_clear_resets_state() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("sepolia.json");

        {
            let mut store = FileRecordStore::load(&path).expect("Failed to load record");
            store.set("A", ADDR_A).expect("Failed to set");
            store.set("B", ADDR_B).expect("Failed to set");
            store.clear().expect("Failed to clear");
            assert_eq!(store.get("A"), None);
            assert_eq!(store.get("B"), None);
        }

        let store = FileRecordStore::load(&path).expect("Failed to reload record");
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_conflicting_set_is_rejected() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("sepolia.json");

        let mut store = FileRecordStore::load(&path).expect("Failed to load record");
        store.set("A", ADDR_A).expect("Failed to set");
        store.set("A", ADDR_A).expect("Same address should be a no-op");

        let err = store.set("A", ADDR_B).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::AddressConflict { .. })
        ));
        assert_eq!(store.get("A"), Some(ADDR_A));
    }

    #[test]
    fn test_corrupted_file_is_an_error() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("sepolia.json");
        std::fs::write(&path, "{ invalid json }").expect("Failed to write corrupted file");

        assert!(FileRecordStore::load(&path).is_err());
    }

    #[test]
    fn test_malformed_address_in_file_is_an_error() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("sepolia.json");
        std::fs::write(&path, r#"{"A": "0x1234"}"#).expect("Failed to write record");

        assert!(FileRecordStore::load(&path).is_err());
    }

    #[test]
    fn test_second_store_on_same_file_is_refused() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("sepolia.json");

        let _store = FileRecordStore::load(&path).expect("Failed to load record");
        assert!(FileRecordStore::load(&path).is_err());
    }

    #[test]
    fn test_snapshot_does_not_lock_or_create() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("deployments/sepolia.json");

        let empty = FileRecordStore::snapshot(&path).expect("Failed to read missing record");
        assert!(empty.entries().is_empty());
        assert!(!path.exists());
        assert!(!temp_dir.path().join("deployments").exists());

        let mut store = FileRecordStore::load(&path).expect("Failed to load record");
        store.set("A", ADDR_A).expect("Failed to set");

        // Readable while another store holds the lock.
        let snapshot = FileRecordStore::snapshot(&path).expect("Failed to read locked record");
        assert_eq!(snapshot.get("A"), Some(ADDR_A));
    }

    #[test]
    fn test_snapshot_of_corrupted_file_is_an_error() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join("sepolia.json");
        std::fs::write(&path, "[]").expect("Failed to write record");

        assert!(FileRecordStore::snapshot(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_parent_dir() {
        let temp_dir = TempDir::new("chainstage-test").expect("Failed to create temp dir");

        sync_parent_dir(&temp_dir.path().join("sepolia.json")).expect("Failed to sync directory");
        sync_parent_dir(Path::new("sepolia.json")).expect("Failed to sync current directory");
        assert!(sync_parent_dir(&temp_dir.path().join("missing/sepolia.json")).is_err());
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryRecordStore::new();
        store.set("B", ADDR_B).unwrap();
        store.set("A", ADDR_A).unwrap();

        assert_eq!(
            store.entries(),
            vec![("A".to_string(), ADDR_A), ("B".to_string(), ADDR_B)]
        );
        assert!(store.set("A", ADDR_B).is_err());

        store.clear().unwrap();
        assert_eq!(store.get("A"), None);
    }
}
