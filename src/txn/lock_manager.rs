//! Strict 2PL lock manager over row ids (§4.8), grounded on the teacher's
//! `transaction::concurrent_status::ConcurrentStatus` for the S/X latch
//! maps and wait-for bookkeeping, generalized from its inline polling
//! loop into condvar-based blocking with a background cycle breaker.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::IsolationLevel;
use crate::error::{AbortReason, DbError};
use crate::record::row::RowId;
use crate::txn::transaction::{Transaction, TransactionId, TransactionManager, TransactionStatus};
use crate::txn::wait_for_graph::WaitForGraph;
use crate::types::SmallResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Default)]
struct RowLockState {
    sharing: HashSet<TransactionId>,
    writer: Option<TransactionId>,
    is_upgrading: bool,
}

impl RowLockState {
    fn is_free_for_shared(&self, id: TransactionId) -> bool {
        self.writer.is_none() || self.writer == Some(id)
    }

    fn is_free_for_exclusive(&self, id: TransactionId) -> bool {
        (self.writer.is_none() || self.writer == Some(id))
            && (self.sharing.is_empty() || (self.sharing.len() == 1 && self.sharing.contains(&id)))
    }
}

struct Inner {
    rows: HashMap<RowId, RowLockState>,
    wait_for: WaitForGraph,
    held: HashMap<TransactionId, HashSet<RowId>>,
}

impl Inner {
    fn grant(&mut self, id: TransactionId, rid: RowId) {
        self.held.entry(id).or_default().insert(rid);
    }

    fn release_row(&mut self, id: TransactionId, rid: RowId) {
        if let Some(state) = self.rows.get_mut(&rid) {
            state.sharing.remove(&id);
            if state.writer == Some(id) {
                state.writer = None;
            }
            if state.sharing.is_empty() && state.writer.is_none() {
                self.rows.remove(&rid);
            }
        }
    }

    /// Release every row `id` currently holds. Used both by `unlock` for a
    /// single row and by the cycle breaker, which must free all of a
    /// victim's locks at once so the transactions waiting on it can proceed.
    fn release_all(&mut self, id: TransactionId) {
        if let Some(rows) = self.held.remove(&id) {
            for rid in rows {
                self.release_row(id, rid);
            }
        }
        self.wait_for.remove_transaction(id);
    }
}

/// Per-row request queues guarded by one global mutex + condvar, plus a
/// background thread that periodically breaks cycles in the waits-for
/// graph by aborting the numerically largest transaction id in any cycle.
pub struct LockManager {
    inner: Arc<Mutex<Inner>>,
    cond: Arc<Condvar>,
    txn_manager: Arc<TransactionManager>,
    isolation: IsolationLevel,
    shutdown: crossbeam_channel::Sender<()>,
    breaker: Option<JoinHandle<()>>,
}

impl LockManager {
    pub fn new(
        txn_manager: Arc<TransactionManager>,
        isolation: IsolationLevel,
        cycle_detection_interval: Duration,
    ) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            rows: HashMap::new(),
            wait_for: WaitForGraph::new(),
            held: HashMap::new(),
        }));
        let cond = Arc::new(Condvar::new());
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded(0);

        let breaker = {
            let inner = inner.clone();
            let cond = cond.clone();
            let txn_manager = txn_manager.clone();
            std::thread::spawn(move || loop {
                match shutdown_rx.recv_timeout(cycle_detection_interval) {
                    Ok(()) => break,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                }

                let victim = {
                    let mut guard = inner.lock().unwrap();
                    match guard.wait_for.find_cycle() {
                        Some(cycle) => {
                            let victim = *cycle.iter().max().expect("cycle is non-empty");
                            // Release every row the victim already holds, not
                            // just its outgoing wait-for edges, so whichever
                            // transaction it was blocking can actually be
                            // granted the lock once woken.
                            guard.release_all(victim);
                            Some(victim)
                        }
                        None => None,
                    }
                };

                if let Some(victim) = victim {
                    log::warn!("cycle breaker aborting transaction {} as deadlock victim", victim);
                    txn_manager.abort(victim);
                    cond.notify_all();
                }
            })
        };

        Self {
            inner,
            cond,
            txn_manager,
            isolation,
            shutdown,
            breaker: Some(breaker),
        }
    }

    fn check_not_shrinking(&self, txn: &Transaction) -> SmallResult {
        if txn.status() == TransactionStatus::Shrinking {
            return Err(DbError::LockAbort(AbortReason::LockOnShrinking));
        }
        Ok(())
    }

    fn check_aborted(&self, txn: &Transaction) -> SmallResult {
        if self.txn_manager.status(txn.id()) == Some(TransactionStatus::Aborted) {
            return Err(DbError::LockAbort(AbortReason::Deadlock));
        }
        Ok(())
    }

    pub fn lock_shared(&self, txn: &Transaction, rid: RowId) -> SmallResult {
        if self.isolation == IsolationLevel::ReadUncommitted {
            return Err(DbError::LockAbort(AbortReason::LockSharedOnReadUncommitted));
        }
        self.check_not_shrinking(txn)?;

        let mut guard = self.inner.lock().unwrap();
        loop {
            let id = txn.id();
            let state = guard.rows.entry(rid).or_default();
            if state.is_free_for_shared(id) {
                state.sharing.insert(id);
                guard.wait_for.remove_waiter(id);
                guard.grant(id, rid);
                return Ok(());
            }

            if let Some(writer) = state.writer {
                guard.wait_for.add_edge(id, writer);
            }

            guard = self.cond.wait(guard).unwrap();
            if let Err(e) = self.check_aborted(txn) {
                self.cleanup_waiter(&mut guard, rid, id);
                return Err(e);
            }
        }
    }

    pub fn lock_exclusive(&self, txn: &Transaction, rid: RowId) -> SmallResult {
        self.check_not_shrinking(txn)?;

        let mut guard = self.inner.lock().unwrap();
        loop {
            let id = txn.id();
            let state = guard.rows.entry(rid).or_default();
            if state.is_free_for_exclusive(id) {
                state.writer = Some(id);
                guard.wait_for.remove_waiter(id);
                guard.grant(id, rid);
                return Ok(());
            }

            if let Some(writer) = state.writer {
                if writer != id {
                    guard.wait_for.add_edge(id, writer);
                }
            }
            for &holder in &state.sharing {
                if holder != id {
                    guard.wait_for.add_edge(id, holder);
                }
            }

            guard = self.cond.wait(guard).unwrap();
            if let Err(e) = self.check_aborted(txn) {
                self.cleanup_waiter(&mut guard, rid, id);
                return Err(e);
            }
        }
    }

    pub fn lock_upgrade(&self, txn: &Transaction, rid: RowId) -> SmallResult {
        self.check_not_shrinking(txn)?;

        let mut guard = self.inner.lock().unwrap();
        let id = txn.id();
        {
            let state = guard.rows.entry(rid).or_default();
            if state.is_upgrading {
                return Err(DbError::LockAbort(AbortReason::UpgradeConflict));
            }
            state.is_upgrading = true;
            state.sharing.remove(&id);
        }

        loop {
            let state = guard.rows.get_mut(&rid).expect("row entry created above");
            if state.writer.is_none() && state.sharing.is_empty() {
                state.is_upgrading = false;
                state.writer = Some(id);
                guard.wait_for.remove_waiter(id);
                guard.grant(id, rid);
                return Ok(());
            }

            if let Some(writer) = state.writer {
                guard.wait_for.add_edge(id, writer);
            }
            for &holder in &state.sharing {
                guard.wait_for.add_edge(id, holder);
            }

            guard = self.cond.wait(guard).unwrap();
            if let Err(e) = self.check_aborted(txn) {
                if let Some(state) = guard.rows.get_mut(&rid) {
                    state.is_upgrading = false;
                }
                self.cleanup_waiter(&mut guard, rid, id);
                return Err(e);
            }
        }
    }

    pub fn unlock(&self, txn: &Transaction, rid: RowId) -> SmallResult {
        let mut guard = self.inner.lock().unwrap();
        let id = txn.id();
        guard.release_row(id, rid);
        if let Some(rows) = guard.held.get_mut(&id) {
            rows.remove(&rid);
        }
        txn.begin_shrinking();
        self.cond.notify_all();
        Ok(())
    }

    /// Drop a still-waiting request (the waiter was never granted the lock,
    /// so nothing in `held` needs to change) and its outgoing wait-for edge.
    fn cleanup_waiter(&self, guard: &mut Inner, rid: RowId, id: TransactionId) {
        if let Some(state) = guard.rows.get_mut(&rid) {
            state.sharing.remove(&id);
            if state.writer == Some(id) {
                state.writer = None;
            }
        }
        guard.wait_for.remove_waiter(id);
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.breaker.take() {
            let _ = handle.join();
        }
    }
}
