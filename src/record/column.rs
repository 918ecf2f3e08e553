//! A single column definition (§3, §4.5).

use crate::error::DbError;
use crate::io::{Decodeable, Encodeable, SmallWriter};
use crate::record::types::ColumnType;
use crate::types::DbResult;

const COLUMN_MAGIC: u32 = 0x434F4C31; // "COL1"

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub col_type: ColumnType,
    pub length: u32,
    pub ordinal: u32,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        col_type: ColumnType,
        ordinal: u32,
        nullable: bool,
        unique: bool,
    ) -> Self {
        let length = col_type.size() as u32;
        Self {
            name: name.into(),
            col_type,
            length,
            ordinal,
            nullable,
            unique,
        }
    }
}

impl Encodeable for Column {
    fn encode(&self) -> Vec<u8> {
        let mut w = SmallWriter::new();
        w.write(&COLUMN_MAGIC);
        w.write(&self.name);
        w.write(&self.col_type);
        w.write(&self.length);
        w.write(&self.ordinal);
        w.write(&self.nullable);
        w.write(&self.unique);
        w.to_bytes()
    }
}

impl Decodeable for Column {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, COLUMN_MAGIC, "column magic mismatch");
        let name = String::decode_from(reader);
        let col_type = ColumnType::decode_from(reader);
        let length = u32::decode_from(reader);
        let ordinal = u32::decode_from(reader);
        let nullable = bool::decode_from(reader);
        let unique = bool::decode_from(reader);
        Self {
            name,
            col_type,
            length,
            ordinal,
            nullable,
            unique,
        }
    }
}

/// Fallible variant of decode, used by the catalog so a torn meta page
/// surfaces as [`DbError::Corruption`] instead of a panic.
pub fn decode_column<R: std::io::Read>(reader: &mut R) -> DbResult<Column> {
    let magic = u32::decode_from(reader);
    if magic != COLUMN_MAGIC {
        return Err(DbError::corruption("column magic mismatch"));
    }
    let name = String::decode_from(reader);
    let col_type = ColumnType::decode_from(reader);
    let length = u32::decode_from(reader);
    let ordinal = u32::decode_from(reader);
    let nullable = bool::decode_from(reader);
    let unique = bool::decode_from(reader);
    Ok(Column {
        name,
        col_type,
        length,
        ordinal,
        nullable,
        unique,
    })
}
