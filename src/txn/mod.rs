//! Transaction management: identity/status, the waits-for graph, and the
//! strict 2PL lock manager built on top of them (§3.1, §4.8).

pub mod lock_manager;
pub mod transaction;
pub mod wait_for_graph;

pub use lock_manager::{LockManager, LockMode};
pub use transaction::{Transaction, TransactionId, TransactionManager, TransactionStatus};
pub use wait_for_graph::WaitForGraph;
