//! Partition registry
//!
//! Owns partition definitions and key authorisation. Partitions are created
//! from a comma-separated rule set, e.g. `prefix=images/,max-size=5mb,ensure=png+1:1`,
//! which is fully validated before anything is persisted.

use crate::config::DEFAULT_PARTITION_SIZE;
use crate::error::GatewayError;
use crate::metadata::{MetadataError, MetadataStorage, Partition, PathRule};
use crate::service::sweep_service::{SweepReport, SweepService};
use crate::storage::validate_object_path;
use crate::validation::ValidationPipeline;
use log::{debug, info};
use std::sync::Arc;
use uuid::Uuid;

/// Parse `N`, `Nb`, `Nkb`, `Nmb`, `Ngb` or `Ntb` (case-insensitive) into bytes.
/// Returns `None` for malformed input or on overflow.
pub fn parse_size(input: &str) -> Option<u64> {
    let input = input.trim().to_ascii_lowercase();
    let digits_end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(digits_end);
    let number: u64 = number.parse().ok()?;
    let multiplier: u64 = match unit.trim() {
        "" | "b" => 1,
        "kb" => 1 << 10,
        "mb" => 1 << 20,
        "gb" => 1 << 30,
        "tb" => 1 << 40,
        _ => return None,
    };
    number.checked_mul(multiplier)
}

fn invalid_rule(reason: impl Into<String>) -> GatewayError {
    GatewayError::InvalidRuleSet(reason.into())
}

/// Check that a path rule names a usable object path or prefix
fn check_path_rule(rule: &PathRule) -> Result<(), GatewayError> {
    match rule {
        PathRule::Exact(path) => {
            if path.ends_with('/') {
                return Err(invalid_rule(format!("exact path {:?} names a directory", path)));
            }
            validate_object_path(path)
                .map_err(|_| invalid_rule(format!("invalid exact path {:?}", path)))
        }
        PathRule::Prefix(prefix) => {
            let root = prefix.trim_matches('/');
            if root.is_empty() {
                return Err(invalid_rule("prefix is empty"));
            }
            validate_object_path(root)
                .map_err(|_| invalid_rule(format!("invalid prefix {:?}", prefix)))
        }
    }
}

#[derive(Clone)]
pub struct PartitionService {
    store: Arc<dyn MetadataStorage>,
    validators: Arc<ValidationPipeline>,
    sweeper: SweepService,
}

impl PartitionService {
    pub fn new(
        store: Arc<dyn MetadataStorage>,
        validators: Arc<ValidationPipeline>,
        sweeper: SweepService,
    ) -> Self {
        Self {
            store,
            validators,
            sweeper,
        }
    }

    /// Every partition the key is authorised for. A key is valid only while
    /// it maps to at least one partition.
    pub fn resolve_partitions(&self, key: &str) -> Result<Vec<Partition>, GatewayError> {
        let partitions = self
            .store
            .partitions_for_key(key)
            .map_err(|e| GatewayError::internal("Error resolving key", e))?;
        if partitions.is_empty() {
            return Err(GatewayError::UnknownKey);
        }
        Ok(partitions)
    }

    /// The named partition, provided the key is authorised for it
    pub fn authorize(&self, key: &str, partition: &str) -> Result<Partition, GatewayError> {
        self.resolve_partitions(key)?
            .into_iter()
            .find(|p| p.name == partition)
            .ok_or_else(|| {
                GatewayError::InvalidPartition(
                    "Partition not found or not associated with key".to_string(),
                )
            })
    }

    /// Build a partition definition from a rule set without persisting it
    pub fn parse_rule_set(&self, name: &str, rule_set: &str) -> Result<Partition, GatewayError> {
        if name.is_empty() {
            return Err(GatewayError::InvalidPartition("Partition name is empty".to_string()));
        }

        let mut path_rule = None;
        let mut max_size = None;
        let mut validates = String::new();

        for rule in rule_set.split(',').map(str::trim).filter(|r| !r.is_empty()) {
            let (kind, value) = rule
                .split_once('=')
                .ok_or_else(|| invalid_rule(format!("malformed rule {:?}", rule)))?;
            match kind {
                "prefix" => path_rule = Some(PathRule::Prefix(value.to_string())),
                "exact" => path_rule = Some(PathRule::Exact(value.to_string())),
                "max-size" => {
                    let size = parse_size(value)
                        .ok_or_else(|| invalid_rule(format!("invalid size {:?}", value)))?;
                    if size == 0 {
                        return Err(invalid_rule("max-size must be positive"));
                    }
                    max_size = Some(size);
                }
                "ensure" => {
                    if !self.validators.is_satisfiable(value) {
                        return Err(invalid_rule(format!("unsatisfiable policy {:?}", value)));
                    }
                    validates = value.to_string();
                }
                other => return Err(invalid_rule(format!("unknown rule {:?}", other))),
            }
        }

        let path_rule = path_rule.ok_or_else(|| invalid_rule("no prefix or exact path"))?;
        check_path_rule(&path_rule)?;

        Ok(Partition {
            name: name.to_string(),
            max_size: max_size.unwrap_or(DEFAULT_PARTITION_SIZE),
            path_rule,
            validates,
        })
    }

    pub fn create_partition(&self, name: &str, rule_set: &str) -> Result<Partition, GatewayError> {
        let partition = self.parse_rule_set(name, rule_set)?;
        self.store.insert_partition(&partition).map_err(|e| match e {
            MetadataError::PartitionExists(_) => GatewayError::PartitionExists,
            other => GatewayError::internal("Error creating partition", other),
        })?;
        info!(
            "Created partition {} ({:?}, {} bytes, policy {:?})",
            partition.name, partition.path_rule, partition.max_size, partition.validates
        );
        Ok(partition)
    }

    /// Delete a partition, then sweep its recorded files. Returns once every
    /// dispatched blob delete has finished, successful or not.
    pub async fn delete_partition(&self, name: &str) -> Result<SweepReport, GatewayError> {
        self.store.delete_partition(name).map_err(|e| match e {
            MetadataError::PartitionNotExists(_) => GatewayError::PartitionNotExists,
            other => GatewayError::internal("Error deleting partition", other),
        })?;
        info!("Deleted partition {}", name);
        self.sweeper.sweep_partition(name).await
    }

    /// Mint a random key authorised for every listed partition
    pub fn create_key(&self, partitions: &[String]) -> Result<String, GatewayError> {
        if partitions.is_empty() {
            return Err(GatewayError::PartitionsEmpty);
        }
        let key = Uuid::new_v4().to_string();
        self.store.insert_key(&key, partitions).map_err(|e| match e {
            MetadataError::PartitionNotExists(name) => {
                GatewayError::InvalidPartition(format!("Partition {} does not exist", name))
            }
            other => GatewayError::internal("Error inserting key", other),
        })?;
        info!("Created key for partitions {:?}", partitions);
        Ok(key)
    }

    pub fn delete_key(&self, key: &str) -> Result<(), GatewayError> {
        self.store
            .delete_key(key)
            .map_err(|e| GatewayError::internal("Error deleting key", e))?;
        debug!("Deleted key mappings");
        Ok(())
    }
}
