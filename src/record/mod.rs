//! Schema, Column, Field, Row — the record layer (§4.5).

pub mod column;
pub mod field;
pub mod row;
pub mod schema;
pub mod types;

pub use column::Column;
pub use field::Field;
pub use row::{Row, RowId};
pub use schema::Schema;
pub use types::ColumnType;
