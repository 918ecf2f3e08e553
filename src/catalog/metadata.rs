//! Persisted metadata records for one table or one index (§4.9), each
//! self-describing with its own magic the way `Schema`/`Column` already do.

use crate::io::{Decodeable, Encodeable, SmallWriter};
use crate::record::Schema;

const TABLE_META_MAGIC: u32 = 0x5441424D; // "TABM"
const INDEX_META_MAGIC: u32 = 0x4958444D; // "IXDM"

#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub table_id: u32,
    pub name: String,
    pub schema: Schema,
    pub first_page_id: u32,
}

impl Encodeable for TableMetadata {
    fn encode(&self) -> Vec<u8> {
        let mut w = SmallWriter::new();
        w.write(&TABLE_META_MAGIC);
        w.write(&self.table_id);
        w.write(&self.name);
        w.write(&self.schema);
        w.write(&self.first_page_id);
        w.to_bytes()
    }
}

impl Decodeable for TableMetadata {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, TABLE_META_MAGIC, "table metadata magic mismatch");
        let table_id = u32::decode_from(reader);
        let name = String::decode_from(reader);
        let schema = Schema::decode_from(reader);
        let first_page_id = u32::decode_from(reader);
        Self {
            table_id,
            name,
            schema,
            first_page_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    pub index_id: u32,
    pub name: String,
    pub table_id: u32,
    pub column: String,
}

impl Encodeable for IndexMetadata {
    fn encode(&self) -> Vec<u8> {
        let mut w = SmallWriter::new();
        w.write(&INDEX_META_MAGIC);
        w.write(&self.index_id);
        w.write(&self.name);
        w.write(&self.table_id);
        w.write(&self.column);
        w.to_bytes()
    }
}

impl Decodeable for IndexMetadata {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, INDEX_META_MAGIC, "index metadata magic mismatch");
        let index_id = u32::decode_from(reader);
        let name = String::decode_from(reader);
        let table_id = u32::decode_from(reader);
        let column = String::decode_from(reader);
        Self {
            index_id,
            name,
            table_id,
            column,
        }
    }
}
