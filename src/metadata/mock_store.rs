//! Mock implementation of MetadataStorage trait for testing

use crate::metadata::{MetadataError, MetadataResult, MetadataStorage, Partition};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    partitions: BTreeMap<String, Partition>,
    usage: HashMap<String, u64>,
    files: BTreeSet<(String, String)>,
    keys: BTreeSet<(String, String)>,
}

/// Mock implementation of MetadataStorage for testing.
///
/// All tables sit behind one lock so every operation is atomic, which gives
/// the same admission guarantees as the conditional write of the SQL backend.
pub struct MockMetadataStore {
    tables: Mutex<Tables>,
    fail_file_writes: AtomicBool,
    fail_releases: AtomicBool,
    fail_lookups: AtomicBool,
}

impl MockMetadataStore {
    /// Create a new mock metadata store
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            fail_file_writes: AtomicBool::new(false),
            fail_releases: AtomicBool::new(false),
            fail_lookups: AtomicBool::new(false),
        }
    }

    /// Make `insert_file` and `delete_file` fail
    pub fn set_fail_file_writes(&self, fail: bool) {
        self.fail_file_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `release_usage` fail
    pub fn set_fail_releases(&self, fail: bool) {
        self.fail_releases.store(fail, Ordering::SeqCst);
    }

    /// Make `partitions_for_key` fail
    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Number of recorded files across all partitions
    pub fn file_count(&self) -> usize {
        self.tables.lock().map(|t| t.files.len()).unwrap_or(0)
    }

    fn tables(&self) -> MetadataResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| MetadataError::Internal("mock metadata lock poisoned".to_string()))
    }

    fn injected(flag: &AtomicBool, what: &str) -> MetadataResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(MetadataError::Internal(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

impl Default for MockMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStorage for MockMetadataStore {
    fn partitions_for_key(&self, key: &str) -> MetadataResult<Vec<Partition>> {
        Self::injected(&self.fail_lookups, "lookup")?;
        let tables = self.tables()?;
        Ok(tables
            .keys
            .iter()
            .filter(|(k, _)| k == key)
            .filter_map(|(_, name)| tables.partitions.get(name).cloned())
            .collect())
    }

    fn get_partition(&self, name: &str) -> MetadataResult<Option<Partition>> {
        Ok(self.tables()?.partitions.get(name).cloned())
    }

    fn insert_partition(&self, partition: &Partition) -> MetadataResult<()> {
        let mut tables = self.tables()?;
        if tables.partitions.contains_key(&partition.name) {
            return Err(MetadataError::PartitionExists(partition.name.clone()));
        }
        tables.partitions.insert(partition.name.clone(), partition.clone());
        Ok(())
    }

    fn delete_partition(&self, name: &str) -> MetadataResult<()> {
        let mut tables = self.tables()?;
        if tables.partitions.remove(name).is_none() {
            return Err(MetadataError::PartitionNotExists(name.to_string()));
        }
        tables.usage.remove(name);
        tables.keys.retain(|(_, partition)| partition != name);
        Ok(())
    }

    fn insert_key(&self, key: &str, partitions: &[String]) -> MetadataResult<()> {
        let mut tables = self.tables()?;
        if let Some(missing) = partitions.iter().find(|p| !tables.partitions.contains_key(*p)) {
            return Err(MetadataError::PartitionNotExists(missing.clone()));
        }
        for partition in partitions {
            tables.keys.insert((key.to_string(), partition.clone()));
        }
        Ok(())
    }

    fn delete_key(&self, key: &str) -> MetadataResult<()> {
        self.tables()?.keys.retain(|(k, _)| k != key);
        Ok(())
    }

    fn reserve_usage(&self, name: &str, size: u64) -> MetadataResult<()> {
        let mut tables = self.tables()?;
        let ceiling = tables.partitions.get(name).map(|p| p.max_size);
        let current = tables.usage.get(name).copied().unwrap_or(0);
        match (ceiling, current.checked_add(size)) {
            (Some(ceiling), Some(total)) if total <= ceiling => {
                tables.usage.insert(name.to_string(), total);
                Ok(())
            }
            _ => Err(MetadataError::QuotaExceeded {
                partition: name.to_string(),
                requested: size,
            }),
        }
    }

    fn release_usage(&self, name: &str, size: u64) -> MetadataResult<()> {
        Self::injected(&self.fail_releases, "release")?;
        let mut tables = self.tables()?;
        if let Some(current) = tables.usage.get_mut(name) {
            *current = current.saturating_sub(size);
        }
        Ok(())
    }

    fn usage(&self, name: &str) -> MetadataResult<u64> {
        Ok(self.tables()?.usage.get(name).copied().unwrap_or(0))
    }

    fn insert_file(&self, name: &str, file_path: &str) -> MetadataResult<()> {
        Self::injected(&self.fail_file_writes, "file write")?;
        self.tables()?
            .files
            .insert((name.to_string(), file_path.to_string()));
        Ok(())
    }

    fn delete_file(&self, name: &str, file_path: &str) -> MetadataResult<()> {
        Self::injected(&self.fail_file_writes, "file write")?;
        self.tables()?
            .files
            .remove(&(name.to_string(), file_path.to_string()));
        Ok(())
    }

    fn list_files(&self, name: &str) -> MetadataResult<Vec<String>> {
        Ok(self
            .tables()?
            .files
            .iter()
            .filter(|(partition, _)| partition == name)
            .map(|(_, path)| path.clone())
            .collect())
    }

    fn orphaned_partitions(&self) -> MetadataResult<Vec<String>> {
        let tables = self.tables()?;
        let names: BTreeSet<String> = tables
            .files
            .iter()
            .filter(|(partition, _)| !tables.partitions.contains_key(partition))
            .map(|(partition, _)| partition.clone())
            .collect();
        Ok(names.into_iter().collect())
    }
}
