//! Top-level engine handle: wires the disk manager, buffer pool, catalog,
//! transaction/lock manager, and recovery log into one instance (§2.1,
//! §3.1). Grounded on the teacher's `Database`, but an owned instance
//! instead of a `OnceCell` global — tests open several databases side by
//! side, which a process-wide singleton can't support.

use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::catalog::Catalog;
use crate::config::EngineOptions;
use crate::disk::manager::DiskManager;
use crate::recovery::LogManager;
use crate::record::Schema;
use crate::txn::{LockManager, Transaction, TransactionManager};
use crate::types::DbResult;

pub struct Database {
    options: EngineOptions,
    buffer_pool: Arc<BufferPool>,
    catalog: Catalog,
    txn_manager: Arc<TransactionManager>,
    lock_manager: Arc<LockManager>,
    log_manager: Arc<LogManager>,
}

impl Database {
    /// Open (creating if absent) the database file at `options.db_path`.
    pub fn open(options: EngineOptions) -> DbResult<Self> {
        let is_new = !options.db_path.exists();
        let disk = DiskManager::open(&options.db_path)?;
        let buffer_pool = Arc::new(BufferPool::new(disk, options.buffer_pool_frames, options.replacer_policy));

        // `Catalog::create` is the very first page allocation made against a
        // fresh disk, so the catalog meta page always lands at logical page
        // 0 — safe to hardcode on reopen.
        let catalog = if is_new {
            Catalog::create(buffer_pool.clone())?
        } else {
            Catalog::open(buffer_pool.clone(), 0)?
        };

        let txn_manager = Arc::new(TransactionManager::new());
        let lock_manager = Arc::new(LockManager::new(
            txn_manager.clone(),
            options.isolation_level,
            options.cycle_detection_interval,
        ));
        let log_manager = Arc::new(LogManager::new());

        log::info!("opened database at {:?} (new={})", options.db_path, is_new);

        Ok(Self {
            options,
            buffer_pool,
            catalog,
            txn_manager,
            lock_manager,
            log_manager,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn log_manager(&self) -> &Arc<LogManager> {
        &self.log_manager
    }

    pub fn begin_transaction(&self) -> Arc<Transaction> {
        let txn = self.txn_manager.begin();
        self.log_manager.begin(txn.id());
        txn
    }

    pub fn commit_transaction(&self, txn: &Transaction) {
        txn.set_status(crate::txn::TransactionStatus::Committed);
        self.log_manager.commit(txn.id());
        self.txn_manager.forget(txn.id());
    }

    pub fn abort_transaction(&self, txn: &Transaction) {
        txn.set_status(crate::txn::TransactionStatus::Aborted);
        self.log_manager.abort(txn.id());
        self.txn_manager.forget(txn.id());
    }

    pub fn create_table(&self, name: &str, schema: Schema) -> DbResult<u32> {
        self.catalog.create_table(name, schema)
    }

    pub fn flush_all(&self) -> DbResult<()> {
        self.buffer_pool.flush_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Column, ColumnType};

    #[test]
    fn open_creates_a_fresh_catalog_and_create_table_round_trips() {
        crate::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let options = EngineOptions::new(dir.path().join("test.db")).with_buffer_pool_frames(16);
        let db = Database::open(options).unwrap();

        let schema = Schema::new(vec![Column::new("id", ColumnType::Int32, 0, false, true)]);
        let table_id = db.create_table("widgets", schema).unwrap();
        assert!(db.catalog().get_table(table_id).is_some());
    }

    #[test]
    fn begin_and_commit_a_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let options = EngineOptions::new(dir.path().join("test.db")).with_buffer_pool_frames(16);
        let db = Database::open(options).unwrap();

        let txn = db.begin_transaction();
        db.commit_transaction(&txn);
        assert_eq!(txn.status(), crate::txn::TransactionStatus::Committed);
    }
}
