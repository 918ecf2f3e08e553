//! In-memory ARIES-style log manager (§4.10), grounded on the teacher's
//! `transaction::log_aries::LogManager` for the START/UPDATE/COMMIT/ABORT/
//! CHECKPOINT shape and the redo-then-undo recovery structure, replacing
//! its on-disk `SmallFile` of before/after page images with an ordered
//! in-memory map of logical key-value records.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use log::{debug, info};

use crate::recovery::log_record::{LogBody, LogRecord, Lsn};
use crate::txn::TransactionId;

/// A point-in-time snapshot recovery replays from: the last LSN already
/// reflected in `committed_state`, the active transaction table at that
/// point, and the key-value state itself.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub persisted_lsn: Lsn,
    pub att: HashMap<TransactionId, Lsn>,
    pub committed_state: HashMap<String, String>,
}

struct Inner {
    log: BTreeMap<Lsn, LogRecord>,
    next_lsn: Lsn,
    last_lsn: HashMap<TransactionId, Lsn>,
    active: HashSet<TransactionId>,
    db: HashMap<String, String>,
}

pub struct LogManager {
    inner: Mutex<Inner>,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                log: BTreeMap::new(),
                next_lsn: 1,
                last_lsn: HashMap::new(),
                active: HashSet::new(),
                db: HashMap::new(),
            }),
        }
    }

    fn append(inner: &mut Inner, txn_id: TransactionId, body: LogBody) -> Lsn {
        let lsn = inner.next_lsn;
        inner.next_lsn += 1;
        let prev_lsn = inner.last_lsn.get(&txn_id).copied();
        inner.log.insert(
            lsn,
            LogRecord {
                lsn,
                txn_id,
                prev_lsn,
                body,
            },
        );
        inner.last_lsn.insert(txn_id, lsn);
        lsn
    }

    pub fn begin(&self, txn_id: TransactionId) -> Lsn {
        let mut inner = self.inner.lock().unwrap();
        inner.active.insert(txn_id);
        debug!("log: BEGIN txn {}", txn_id);
        Self::append(&mut inner, txn_id, LogBody::Begin)
    }

    pub fn commit(&self, txn_id: TransactionId) -> Lsn {
        let mut inner = self.inner.lock().unwrap();
        inner.active.remove(&txn_id);
        debug!("log: COMMIT txn {}", txn_id);
        Self::append(&mut inner, txn_id, LogBody::Commit)
    }

    pub fn abort(&self, txn_id: TransactionId) -> Lsn {
        let mut inner = self.inner.lock().unwrap();
        inner.active.remove(&txn_id);
        debug!("log: ABORT txn {}", txn_id);
        Self::append(&mut inner, txn_id, LogBody::Abort)
    }

    pub fn insert(&self, txn_id: TransactionId, key: impl Into<String>, value: impl Into<String>) -> Lsn {
        let mut inner = self.inner.lock().unwrap();
        let key = key.into();
        let value = value.into();
        inner.db.insert(key.clone(), value.clone());
        Self::append(&mut inner, txn_id, LogBody::Insert { key, value })
    }

    /// No-op (returns `None`) if `key` is not currently present — there is
    /// nothing to delete and nothing worth logging.
    pub fn delete(&self, txn_id: TransactionId, key: impl Into<String>) -> Option<Lsn> {
        let mut inner = self.inner.lock().unwrap();
        let key = key.into();
        let value = inner.db.remove(&key)?;
        Some(Self::append(&mut inner, txn_id, LogBody::Delete { key, value }))
    }

    pub fn update(&self, txn_id: TransactionId, key: impl Into<String>, new_value: impl Into<String>) -> Lsn {
        let mut inner = self.inner.lock().unwrap();
        let key = key.into();
        let new_value = new_value.into();
        let old_value = inner.db.get(&key).cloned().unwrap_or_else(|| new_value.clone());
        inner.db.insert(key.clone(), new_value.clone());
        Self::append(
            &mut inner,
            txn_id,
            LogBody::Update {
                key,
                old_value,
                new_value,
            },
        )
    }

    /// Current live key-value state, as mutated by `insert`/`delete`/
    /// `update` above (the "normal operation" path, independent of the
    /// recovery simulation below).
    pub fn snapshot_state(&self) -> HashMap<String, String> {
        self.inner.lock().unwrap().db.clone()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        let inner = self.inner.lock().unwrap();
        let att = inner
            .active
            .iter()
            .filter_map(|&tid| inner.last_lsn.get(&tid).map(|&lsn| (tid, lsn)))
            .collect();
        Checkpoint {
            persisted_lsn: inner.next_lsn.saturating_sub(1),
            att,
            committed_state: inner.db.clone(),
        }
    }

    /// Redo every record past the checkpoint's LSN, then undo every
    /// transaction still active afterward, in LSN-descending order per
    /// transaction. Reads the log only — calling this twice against the
    /// same checkpoint yields the same map both times.
    pub fn recover(&self, checkpoint: &Checkpoint) -> HashMap<String, String> {
        let inner = self.inner.lock().unwrap();
        let mut db = checkpoint.committed_state.clone();
        let mut att = checkpoint.att.clone();

        for (&lsn, record) in inner.log.range((checkpoint.persisted_lsn + 1)..) {
            match &record.body {
                LogBody::Begin => {
                    att.insert(record.txn_id, lsn);
                }
                LogBody::Commit | LogBody::Abort => {
                    att.remove(&record.txn_id);
                }
                LogBody::Insert { key, value } => {
                    db.insert(key.clone(), value.clone());
                    att.insert(record.txn_id, lsn);
                }
                LogBody::Delete { key, .. } => {
                    db.remove(key);
                    att.insert(record.txn_id, lsn);
                }
                LogBody::Update { key, new_value, .. } => {
                    db.insert(key.clone(), new_value.clone());
                    att.insert(record.txn_id, lsn);
                }
            }
        }

        for (&txn_id, &last_lsn) in att.iter() {
            info!("recovery: undoing loser transaction {}", txn_id);
            let mut cursor = Some(last_lsn);
            while let Some(lsn) = cursor {
                let record = inner.log.get(&lsn).expect("prev_lsn must reference a real record");
                match &record.body {
                    LogBody::Insert { key, .. } => {
                        db.remove(key);
                    }
                    LogBody::Delete { key, value } => {
                        db.insert(key.clone(), value.clone());
                    }
                    LogBody::Update { key, old_value, .. } => {
                        db.insert(key.clone(), old_value.clone());
                    }
                    LogBody::Begin | LogBody::Commit | LogBody::Abort => {}
                }
                cursor = record.prev_lsn;
            }
        }

        db
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redo_replays_committed_writes_past_the_checkpoint() {
        let log = LogManager::new();
        log.begin(1);
        log.insert(1, "a", "1");
        log.commit(1);
        let checkpoint = log.checkpoint();

        log.begin(2);
        log.insert(2, "b", "2");
        log.commit(2);

        let recovered = log.recover(&checkpoint);
        assert_eq!(recovered.get("a").map(String::as_str), Some("1"));
        assert_eq!(recovered.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn undo_reverses_a_loser_transaction_still_active_after_redo() {
        let log = LogManager::new();
        let checkpoint = log.checkpoint();

        log.begin(1);
        log.insert(1, "a", "1");
        log.update(1, "a", "2");
        // no commit/abort: txn 1 is a loser

        let recovered = log.recover(&checkpoint);
        assert_eq!(recovered.get("a"), None);
    }

    #[test]
    fn committed_transactions_are_not_undone() {
        let log = LogManager::new();
        let checkpoint = log.checkpoint();

        log.begin(1);
        log.insert(1, "a", "1");
        log.commit(1);

        log.begin(2);
        log.insert(2, "b", "2");
        // txn 2 never commits

        let recovered = log.recover(&checkpoint);
        assert_eq!(recovered.get("a").map(String::as_str), Some("1"));
        assert_eq!(recovered.get("b"), None);
    }

    #[test]
    fn recovery_is_idempotent() {
        let log = LogManager::new();
        let checkpoint = log.checkpoint();
        log.begin(1);
        log.insert(1, "a", "1");
        log.commit(1);

        let first = log.recover(&checkpoint);
        let second = log.recover(&checkpoint);
        assert_eq!(first, second);
    }

    #[test]
    fn delete_of_an_absent_key_logs_nothing() {
        let log = LogManager::new();
        log.begin(1);
        assert!(log.delete(1, "missing").is_none());
    }
}
