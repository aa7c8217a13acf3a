use std::sync::Arc;
use std::thread;

use super::*;

fn line(text: &str) -> LogRecord {
    LogRecord::line(LogLevel::Info, DateTimeStamp::new(1, 0), text)
}

#[test]
fn test_acquire_returns_cleared_record_with_single_ref() {
    let pool = EntryPool::new(4, 8);
    let mut entry = pool.acquire();
    entry.text = Some("hello".to_string());
    entry.tags.insert("Sql");
    entry.source_id = "s1".to_string();
    let entry = entry.freeze();
    assert_eq!(entry.ref_count(), 1);
    assert_eq!(pool.alive(), 1);
    drop(entry);

    assert_eq!(pool.alive(), 0);
    assert_eq!(pool.idle(), 1);

    let reused = pool.acquire();
    assert_eq!(reused.text, None);
    assert!(reused.tags.is_empty());
    assert!(reused.source_id.is_empty());
    assert_eq!(pool.stats().allocated, 1);
}

#[test]
fn test_balanced_retain_release_returns_alive_to_zero() {
    let pool = EntryPool::new(4, 16);
    let entries: Vec<PooledEntry> = (0..10)
        .map(|i| pool.acquire_from(&line(&format!("entry {i}"))))
        .collect();
    let retained: Vec<PooledEntry> = entries.iter().flat_map(|e| [e.clone(), e.clone()]).collect();

    assert_eq!(pool.alive(), 10);
    assert_eq!(entries[3].ref_count(), 3);
    assert_eq!(entries[3].text_or_empty(), "entry 3");

    drop(entries);
    assert_eq!(pool.alive(), 10);
    drop(retained);

    let stats = pool.stats();
    assert_eq!(stats.alive, 0);
    assert_eq!(stats.double_releases, 0);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.idle, 10);
}

#[test]
fn test_soft_capacity_grows_and_hard_capacity_drops() {
    let pool = EntryPool::new(2, 4);
    let entries: Vec<PooledEntry> = (0..10).map(|_| pool.acquire().freeze()).collect();
    drop(entries);

    let stats = pool.stats();
    assert_eq!(stats.alive, 0);
    // one fast slot + the hard maximum in the idle queue
    assert_eq!(stats.idle, 5);
    assert_eq!(stats.dropped, 5);
    assert_eq!(stats.capacity, 4);
}

#[test]
fn test_mutation_before_freeze_is_visible_to_clones() {
    let pool = EntryPool::new(4, 8);
    let mut entry = pool.acquire();
    entry.assign(&line("original").with_tags("A|B"));
    let frozen = entry.freeze();
    let clone = frozen.clone();
    assert_eq!(clone.text_or_empty(), "original");
    assert!(clone.tags.contains("B"));
    assert_eq!(frozen.ref_count(), 2);
}

#[test]
fn test_concurrent_acquire_release_balances() {
    let pool = EntryPool::new(16, 64);
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let pool = pool.clone();
            thread::spawn(move || {
                for i in 0..500 {
                    let entry = pool.acquire_from(&line(&format!("{t}-{i}")));
                    let shared = Arc::new(entry.clone());
                    drop(entry);
                    assert_eq!(shared.text_or_empty(), format!("{t}-{i}"));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let stats = pool.stats();
    assert_eq!(stats.alive, 0);
    assert_eq!(stats.double_releases, 0);
}

#[test]
fn test_shared_pool_is_process_wide() {
    let a = EntryPool::shared();
    let b = EntryPool::shared();
    let entry = a.acquire().freeze();
    assert!(b.alive() >= 1);
    drop(entry);
}
