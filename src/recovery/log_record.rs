//! Log record shapes for the in-memory recovery model (§4.10), grounded on
//! the teacher's `transaction::log_aries::RecordType` tag set, trimmed from
//! five physical page-image records down to the logical key-value payload
//! the model calls for.

use crate::txn::TransactionId;

pub type Lsn = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum LogBody {
    Begin,
    Commit,
    Abort,
    Insert { key: String, value: String },
    Delete { key: String, value: String },
    Update {
        key: String,
        old_value: String,
        new_value: String,
    },
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub txn_id: TransactionId,
    /// Previous LSN written by the same transaction, forming the per-txn
    /// back-chain Undo walks without scanning the whole log.
    pub prev_lsn: Option<Lsn>,
    pub body: LogBody,
}
