//! Comprehensive test to verify both metadata backends honour the same contract

#[cfg(test)]
mod integration_tests {
    use crate::metadata::mock_store::MockMetadataStore;
    use crate::metadata::sqlite_store::SQLiteMetadataStore;
    use crate::metadata::{MetadataError, MetadataStorage, PathRule, Partition};
    use std::sync::Arc;

    fn backends() -> Vec<(&'static str, Arc<dyn MetadataStorage>)> {
        vec![
            ("sqlite", Arc::new(SQLiteMetadataStore::open_in_memory().unwrap())),
            ("mock", Arc::new(MockMetadataStore::new())),
        ]
    }

    fn partition(name: &str, max_size: u64) -> Partition {
        Partition {
            name: name.to_string(),
            max_size,
            path_rule: PathRule::Prefix(format!("{}/", name)),
            validates: String::new(),
        }
    }

    #[test]
    fn test_ledger_contract_end_to_end() {
        for (backend, store) in backends() {
            println!("Testing with backend: {}", backend);

            store.insert_partition(&partition("photos", 1000)).unwrap();
            store.insert_partition(&partition("docs", 50)).unwrap();
            store
                .insert_key("key-1", &["photos".to_string(), "docs".to_string()])
                .unwrap();

            let names: Vec<String> = store
                .partitions_for_key("key-1")
                .unwrap()
                .into_iter()
                .map(|p| p.name)
                .collect();
            assert_eq!(names, vec!["docs".to_string(), "photos".to_string()], "{}", backend);

            // No usage row yet means zero usage
            assert_eq!(store.usage("photos").unwrap(), 0);

            store.reserve_usage("photos", 600).unwrap();
            assert!(matches!(
                store.reserve_usage("photos", 401),
                Err(MetadataError::QuotaExceeded { .. })
            ));
            store.reserve_usage("photos", 400).unwrap();
            assert_eq!(store.usage("photos").unwrap(), 1000);

            // Partitions are independent
            assert!(matches!(
                store.reserve_usage("docs", 51),
                Err(MetadataError::QuotaExceeded { .. })
            ));
            store.reserve_usage("docs", 50).unwrap();

            store.release_usage("photos", 400).unwrap();
            assert_eq!(store.usage("photos").unwrap(), 600);

            store.insert_file("photos", "photos/a.png").unwrap();
            store.insert_file("photos", "photos/b.png").unwrap();
            assert_eq!(store.list_files("photos").unwrap().len(), 2);

            store.delete_partition("photos").unwrap();
            assert_eq!(store.usage("photos").unwrap(), 0);
            assert_eq!(store.orphaned_partitions().unwrap(), vec!["photos".to_string()]);
            assert_eq!(store.partitions_for_key("key-1").unwrap().len(), 1);

            store.delete_key("key-1").unwrap();
            assert!(store.partitions_for_key("key-1").unwrap().is_empty());

            println!("✓ Backend {} passed all tests", backend);
        }
    }

    #[test]
    fn test_unknown_partition_errors() {
        for (backend, store) in backends() {
            assert!(
                matches!(
                    store.delete_partition("ghost"),
                    Err(MetadataError::PartitionNotExists(_))
                ),
                "{}",
                backend
            );
            assert!(matches!(
                store.insert_key("key", &["ghost".to_string()]),
                Err(MetadataError::PartitionNotExists(_))
            ));
            assert!(store.get_partition("ghost").unwrap().is_none());
        }
    }
}
