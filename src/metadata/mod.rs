//! Metadata Storage Layer Abstraction
//!
//! This module provides an abstraction over the transactional metadata store
//! that holds partitions, key mappings, per-partition usage and recorded files.
//! The usage ledger is only ever mutated through `reserve_usage` and
//! `release_usage`, each of which must be a single atomic statement on the
//! backing store.

pub mod sqlite_store;
pub mod mock_store;

#[cfg(test)]
mod comprehensive_test;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a partition maps client-supplied relative paths onto object paths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PathRule {
    /// Relative paths are joined under this prefix
    Prefix(String),
    /// Every upload lands on this fixed path; relative paths are ignored
    Exact(String),
}

impl PathRule {
    /// The configured prefix or fixed path
    pub fn path(&self) -> &str {
        match self {
            PathRule::Prefix(path) | PathRule::Exact(path) => path,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, PathRule::Exact(_))
    }
}

/// A named, quota-bounded storage namespace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Partition {
    /// Globally unique partition name
    pub name: String,
    /// Quota ceiling in bytes
    pub max_size: u64,
    /// Path-namespace rule
    pub path_rule: PathRule,
    /// `+`-joined validation policy, empty when uploads are not validated
    pub validates: String,
}

impl Partition {
    /// Resolve a client-supplied relative path to the full object path.
    ///
    /// Exact partitions always resolve to their fixed path. Prefix partitions
    /// join the relative path under the prefix with exactly one separator; an
    /// empty relative path yields the bare prefix.
    pub fn resolve_path(&self, relative_path: &str) -> String {
        match &self.path_rule {
            PathRule::Exact(path) => path.clone(),
            PathRule::Prefix(prefix) if relative_path.is_empty() => prefix.clone(),
            PathRule::Prefix(prefix) => {
                let root = prefix.trim_start_matches('/').trim_end_matches('/');
                let relative = relative_path.trim_start_matches('/');
                if root.is_empty() {
                    relative.to_string()
                } else {
                    format!("{}/{}", root, relative)
                }
            }
        }
    }
}

/// Metadata store operation errors
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("partition already exists: {0}")]
    PartitionExists(String),

    #[error("partition does not exist: {0}")]
    PartitionNotExists(String),

    #[error("quota exceeded for partition {partition} reserving {requested} bytes")]
    QuotaExceeded { partition: String, requested: u64 },

    #[error("size out of range: {0}")]
    SizeOutOfRange(u64),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for metadata operations
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Trait defining the metadata storage interface
pub trait MetadataStorage: Send + Sync {
    /// All partitions a key is authorised for (empty for unknown keys)
    fn partitions_for_key(&self, key: &str) -> MetadataResult<Vec<Partition>>;

    /// Look up one partition definition
    fn get_partition(&self, name: &str) -> MetadataResult<Option<Partition>>;

    /// Insert a partition; `PartitionExists` on a name collision
    fn insert_partition(&self, partition: &Partition) -> MetadataResult<()>;

    /// Delete a partition, cascading to its usage row and key mappings.
    /// `PartitionNotExists` if nothing was deleted.
    fn delete_partition(&self, name: &str) -> MetadataResult<()>;

    /// Map a key to every listed partition, all or nothing.
    /// `PartitionNotExists` if any partition is unknown.
    fn insert_key(&self, key: &str, partitions: &[String]) -> MetadataResult<()>;

    /// Remove every mapping of a key
    fn delete_key(&self, key: &str) -> MetadataResult<()>;

    /// Atomically add `size` bytes to a partition's usage if the result stays
    /// within the quota ceiling; `QuotaExceeded` otherwise, with usage unchanged.
    fn reserve_usage(&self, name: &str, size: u64) -> MetadataResult<()>;

    /// Subtract up to `size` bytes from a partition's usage, never below zero
    fn release_usage(&self, name: &str, size: u64) -> MetadataResult<()>;

    /// Currently recorded usage (zero when no usage row exists)
    fn usage(&self, name: &str) -> MetadataResult<u64>;

    /// Record a stored object; recording an existing path is a no-op
    fn insert_file(&self, name: &str, file_path: &str) -> MetadataResult<()>;

    /// Forget a stored object; forgetting an unknown path is a no-op
    fn delete_file(&self, name: &str, file_path: &str) -> MetadataResult<()>;

    /// Recorded object paths for a partition name
    fn list_files(&self, name: &str) -> MetadataResult<Vec<String>>;

    /// Partition names that still have recorded files but no definition
    fn orphaned_partitions(&self) -> MetadataResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix_partition(prefix: &str) -> Partition {
        Partition {
            name: "images".to_string(),
            max_size: 1024,
            path_rule: PathRule::Prefix(prefix.to_string()),
            validates: String::new(),
        }
    }

    #[test]
    fn test_resolve_path_with_trailing_separator_prefix() {
        assert_eq!(prefix_partition("images/").resolve_path("a.png"), "images/a.png");
    }

    #[test]
    fn test_resolve_path_with_leading_separator_relative() {
        assert_eq!(prefix_partition("images").resolve_path("/a.png"), "images/a.png");
        assert_eq!(prefix_partition("images/").resolve_path("/a.png"), "images/a.png");
        assert_eq!(prefix_partition("/images").resolve_path("nested/a.png"), "images/nested/a.png");
    }

    #[test]
    fn test_resolve_path_empty_relative_yields_bare_prefix() {
        assert_eq!(prefix_partition("images/").resolve_path(""), "images/");
        assert_eq!(prefix_partition("images").resolve_path(""), "images");
    }

    #[test]
    fn test_resolve_path_exact_ignores_relative() {
        let partition = Partition {
            name: "avatar".to_string(),
            max_size: 1024,
            path_rule: PathRule::Exact("avatars/me.png".to_string()),
            validates: String::new(),
        };
        assert_eq!(partition.resolve_path("other.png"), "avatars/me.png");
        assert_eq!(partition.resolve_path(""), "avatars/me.png");
        assert!(partition.path_rule.is_exact());
    }
}
