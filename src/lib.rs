pub mod buffer;
pub mod catalog;
pub mod config;
pub mod database;
pub mod disk;
pub mod error;
pub mod heap;
pub mod index;
pub mod io;
pub mod record;
pub mod recovery;
pub mod txn;
pub mod types;

pub use config::EngineOptions;
pub use database::Database;
pub use error::DbError;
pub use types::{DbResult, SmallResult};

/// Shared test-only logging setup so `RUST_LOG=debug cargo test -- --nocapture`
/// shows engine traces; guarded so the repeated `mod tests` across the crate
/// don't each try to install their own global logger.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    static INIT: once_cell::sync::OnceCell<()> = once_cell::sync::OnceCell::new();
    INIT.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}
