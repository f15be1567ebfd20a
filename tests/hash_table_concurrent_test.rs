use std::sync::Arc;
use std::thread;

use anyhow::Result;
use talusdb::index::hash::ExtendibleHashTable;

mod common;
use common::create_test_buffer_pool;

#[test]
fn test_concurrent_readers_with_one_writer() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(64)?;
    let table = Arc::new(ExtendibleHashTable::<i32, i32>::new(buffer_pool)?);

    // Static keys the readers hammer; the writer works a disjoint range
    for key in 0..64 {
        assert!(table.insert(key, 1000 + key)?);
    }

    thread::scope(|scope| {
        for _ in 0..4 {
            let table = Arc::clone(&table);
            scope.spawn(move || {
                for _ in 0..100 {
                    for key in 0..64 {
                        let values = table.get_value(&key).unwrap();
                        assert_eq!(values, vec![1000 + key]);
                    }
                    table.verify_integrity().unwrap();
                }
            });
        }

        let writer_table = Arc::clone(&table);
        scope.spawn(move || {
            for round in 0..200 {
                let key = 10_000 + round;
                assert!(writer_table.insert(key, round).unwrap());
                assert!(writer_table.remove(&key, &round).unwrap());
            }
        });
    });

    table.verify_integrity()?;
    for key in 0..64 {
        assert_eq!(table.get_value(&key)?, vec![1000 + key]);
    }

    Ok(())
}

#[test]
fn test_concurrent_inserts_disjoint_ranges() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(100)?;
    let table = Arc::new(ExtendibleHashTable::<i32, i32>::new(buffer_pool)?);

    thread::scope(|scope| {
        for worker in 0..4 {
            let table = Arc::clone(&table);
            scope.spawn(move || {
                let base = worker * 500;
                for key in base..base + 500 {
                    assert!(table.insert(key, key * 2).unwrap());
                }
            });
        }
    });

    table.verify_integrity()?;
    for key in 0..2000 {
        assert_eq!(table.get_value(&key)?, vec![key * 2]);
    }

    Ok(())
}

#[test]
fn test_concurrent_mixed_workload() -> Result<()> {
    let (buffer_pool, _temp_file) = create_test_buffer_pool(100)?;
    let table = Arc::new(ExtendibleHashTable::<i32, i32>::new(buffer_pool)?);

    // Each worker inserts its range, removes half of it, and checks what
    // it kept; ranges never overlap, so every assertion is deterministic
    thread::scope(|scope| {
        for worker in 0..4 {
            let table = Arc::clone(&table);
            scope.spawn(move || {
                let base = worker * 400;
                for key in base..base + 400 {
                    assert!(table.insert(key, key).unwrap());
                }
                for key in (base..base + 400).step_by(2) {
                    assert!(table.remove(&key, &key).unwrap());
                }
                for key in base..base + 400 {
                    let values = table.get_value(&key).unwrap();
                    if key % 2 == 0 {
                        assert!(values.is_empty());
                    } else {
                        assert_eq!(values, vec![key]);
                    }
                }
            });
        }
    });

    table.verify_integrity()?;

    Ok(())
}
