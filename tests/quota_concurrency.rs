use partition_gate::config::MetadataConfig;
use partition_gate::metadata::sqlite_store::SQLiteMetadataStore;
use partition_gate::metadata::{MetadataError, MetadataStorage, Partition, PathRule};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

const CEILING: u64 = 1000;
const CHUNK: u64 = 10;

/// Two independent connections stand in for two gateway processes sharing
/// one database file; the conditional write alone must keep them in bounds.
#[test]
fn test_reservations_across_connections_never_exceed_ceiling() {
    let dir = TempDir::new().unwrap();
    let config = MetadataConfig {
        db_path: dir.path().join("metadata.db").display().to_string(),
        ..MetadataConfig::default()
    };

    let first = Arc::new(SQLiteMetadataStore::open(&config).unwrap());
    let second = Arc::new(SQLiteMetadataStore::open(&config).unwrap());
    first
        .insert_partition(&Partition {
            name: "shared".to_string(),
            max_size: CEILING,
            path_rule: PathRule::Prefix("shared".to_string()),
            validates: String::new(),
        })
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = if i % 2 == 0 { first.clone() } else { second.clone() };
            thread::spawn(move || {
                let mut admitted = 0u64;
                for _ in 0..25 {
                    match store.reserve_usage("shared", CHUNK) {
                        Ok(()) => admitted += 1,
                        Err(MetadataError::QuotaExceeded { .. }) => {}
                        Err(e) => panic!("unexpected reservation error: {}", e),
                    }
                }
                admitted
            })
        })
        .collect();

    let admitted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted * CHUNK, CEILING);
    assert_eq!(first.usage("shared").unwrap(), CEILING);
    assert_eq!(second.usage("shared").unwrap(), CEILING);
    println!("✓ {} reservations admitted across two connections", admitted);
}
