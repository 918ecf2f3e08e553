//! Transaction identity and status (§3.1), grounded on the teacher's
//! `transaction::tx::{Transaction, TransactionID, TransactionStatus}`
//! — the id counter and the shape of commit/abort survive; status gains
//! the Growing/Shrinking split strict 2PL requires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub type TransactionId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

pub struct Transaction {
    id: TransactionId,
    status: Mutex<TransactionStatus>,
}

impl Transaction {
    fn new() -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            status: Mutex::new(TransactionStatus::Growing),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        *self.status.lock().unwrap()
    }

    /// The first Unlock moves a Growing transaction to Shrinking; a
    /// no-op once already Shrinking/Committed/Aborted.
    pub fn begin_shrinking(&self) {
        let mut status = self.status.lock().unwrap();
        if *status == TransactionStatus::Growing {
            *status = TransactionStatus::Shrinking;
        }
    }

    pub fn set_status(&self, status: TransactionStatus) {
        *self.status.lock().unwrap() = status;
    }
}

/// Hands out transaction ids and is the callback target the lock
/// manager's cycle breaker uses to abort a victim by id.
pub struct TransactionManager {
    transactions: Mutex<HashMap<TransactionId, std::sync::Arc<Transaction>>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
        }
    }

    pub fn begin(&self) -> std::sync::Arc<Transaction> {
        let txn = std::sync::Arc::new(Transaction::new());
        self.transactions
            .lock()
            .unwrap()
            .insert(txn.id(), txn.clone());
        txn
    }

    pub fn status(&self, id: TransactionId) -> Option<TransactionStatus> {
        self.transactions.lock().unwrap().get(&id).map(|t| t.status())
    }

    /// Called by the lock manager's cycle breaker; marks the victim
    /// Aborted so its blocked thread observes the state on wakeup.
    pub fn abort(&self, id: TransactionId) {
        if let Some(txn) = self.transactions.lock().unwrap().get(&id) {
            txn.set_status(TransactionStatus::Aborted);
        }
    }

    pub fn forget(&self, id: TransactionId) {
        self.transactions.lock().unwrap().remove(&id);
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
