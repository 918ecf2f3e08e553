//! Cross-module integration tests for the concrete scenarios in the
//! testable-properties section: replacer policies, B+-tree split/merge,
//! lock-manager deadlock, and recovery redo/undo.

use std::sync::Arc;
use std::time::Duration;

use small_kernel::buffer::{BufferPool, ReplacerPolicy};
use small_kernel::disk::manager::DiskManager;
use small_kernel::index::{BPlusTreeIndex, IndexRoots};
use small_kernel::record::{Field, RowId};
use small_kernel::record::types::ColumnType;
use small_kernel::recovery::LogManager;
use small_kernel::txn::{LockManager, TransactionManager};
use small_kernel::config::IsolationLevel;

fn pool(policy: ReplacerPolicy, capacity: usize) -> (Arc<BufferPool>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskManager::open(dir.path().join("test.db")).unwrap();
    (Arc::new(BufferPool::new(disk, capacity, policy)), dir)
}

/// S1: under CLOCK, repeatedly touching one page keeps it resident while
/// cold pages churn through the remaining frames.
#[test]
fn s1_clock_replacer_favors_recently_touched_pages() {
    let (pool, _dir) = pool(ReplacerPolicy::Clock, 2);
    let (hot, mut data) = pool.new_page().unwrap();
    data[0] = 99;
    pool.write_page(hot, data).unwrap();
    pool.unpin_page(hot, true).unwrap();

    for _ in 0..5 {
        pool.fetch_page(hot).unwrap();
        pool.unpin_page(hot, false).unwrap();

        let (cold, _) = pool.new_page().unwrap();
        pool.unpin_page(cold, false).unwrap();
    }

    let data = pool.fetch_page(hot).unwrap();
    pool.unpin_page(hot, false).unwrap();
    assert_eq!(data[0], 99);
}

/// S2: under LRU with capacity 1, a second page forces the first one's
/// eviction, and it can still be faulted back in afterward.
#[test]
fn s2_lru_replacer_evicts_the_single_least_recent_frame() {
    let (pool, _dir) = pool(ReplacerPolicy::Lru, 1);
    let (a, mut data) = pool.new_page().unwrap();
    data[0] = 7;
    pool.write_page(a, data).unwrap();
    pool.unpin_page(a, true).unwrap();

    let (b, _) = pool.new_page().unwrap();
    pool.unpin_page(b, false).unwrap();

    let reloaded = pool.fetch_page(a).unwrap();
    assert_eq!(reloaded[0], 7);
    pool.unpin_page(a, false).unwrap();
}

fn small_index(leaf_max: usize, internal_max: usize) -> (BPlusTreeIndex, Arc<BufferPool>, tempfile::TempDir) {
    let (pool, dir) = pool(ReplacerPolicy::Clock, 64);
    let roots = IndexRoots::create(pool.clone()).unwrap();
    let index = BPlusTreeIndex::with_max_sizes(pool.clone(), 1, ColumnType::Int32, leaf_max, internal_max, roots);
    (index, pool, dir)
}

/// S3: inserting one key past a leaf's capacity splits it and promotes a
/// separator into a freshly created internal root.
#[test]
fn s3_leaf_split_promotes_a_separator() {
    let (index, pool, _dir) = small_index(4, 4);
    for k in 1..=5 {
        index.insert(Field::Int32(k), RowId::new(k as u32, 0)).unwrap();
    }

    let collected: Vec<i32> = index
        .iter()
        .unwrap()
        .map(|(k, _)| match k {
            Field::Int32(v) => v,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(collected, vec![1, 2, 3, 4, 5]);
    assert!(pool.all_unpinned());
}

/// S4: deleting back down below the minimum merges a leaf's siblings,
/// eventually collapsing a single-child root back into a leaf.
#[test]
fn s4_leaf_merges_collapse_the_root_back_to_a_leaf() {
    let (index, pool, _dir) = small_index(4, 4);
    for k in 1..=5 {
        index.insert(Field::Int32(k), RowId::new(k as u32, 0)).unwrap();
    }

    index.delete(&Field::Int32(4)).unwrap();
    index.delete(&Field::Int32(5)).unwrap();
    index.delete(&Field::Int32(3)).unwrap();

    let collected: Vec<i32> = index
        .iter()
        .unwrap()
        .map(|(k, _)| match k {
            Field::Int32(v) => v,
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(collected, vec![1, 2]);
    assert!(pool.all_unpinned());
}

/// S5: two transactions each hold one row exclusively and wait on the
/// other's row; the cycle breaker aborts the higher-numbered transaction.
#[test]
fn s5_lock_manager_breaks_a_two_transaction_deadlock() {
    let txn_manager = Arc::new(TransactionManager::new());
    let lm = Arc::new(LockManager::new(
        txn_manager.clone(),
        IsolationLevel::ReadCommitted,
        Duration::from_millis(20),
    ));

    let a = txn_manager.begin();
    let b = txn_manager.begin();
    let r1 = RowId::new(0, 0);
    let r2 = RowId::new(0, 1);

    lm.lock_exclusive(&a, r1).unwrap();
    lm.lock_exclusive(&b, r2).unwrap();

    let lm_b = lm.clone();
    let b_clone = b.clone();
    let waiter = std::thread::spawn(move || lm_b.lock_exclusive(&b_clone, r1));

    std::thread::sleep(Duration::from_millis(80));
    let a_result = lm.lock_exclusive(&a, r2);
    let b_result = waiter.join().unwrap();

    // `b` has the higher transaction id, so the cycle breaker always picks
    // it as the victim; `a` must then actually be granted r2, not just
    // "not error" - proving the victim's held locks were released, not only
    // its wait-for edges.
    assert!(a_result.is_ok());
    assert!(matches!(
        b_result,
        Err(small_kernel::DbError::LockAbort(small_kernel::error::AbortReason::Deadlock))
    ));
}

/// S6: a committed transaction's writes survive Redo; a transaction that
/// never commits is rolled back by Undo.
#[test]
fn s6_recovery_redoes_committed_writes_and_undoes_losers() {
    let log = LogManager::new();
    let checkpoint = log.checkpoint();

    log.begin(1);
    log.insert(1, "x", "committed");
    log.commit(1);

    log.begin(2);
    log.insert(2, "y", "uncommitted");
    log.update(2, "y", "still-uncommitted");
    // txn 2 never commits or aborts

    let recovered = log.recover(&checkpoint);
    assert_eq!(recovered.get("x").map(String::as_str), Some("committed"));
    assert_eq!(recovered.get("y"), None);
}
