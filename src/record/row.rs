//! RowId + ordered fields (§3, §4.5).

use bit_vec::BitVec;

use crate::error::DbError;
use crate::io::{read_exact, Decodeable, Encodeable};
use crate::record::field::Field;
use crate::record::schema::Schema;
use crate::types::DbResult;

/// Identifies one tuple in a table heap: the slotted page it lives on and
/// its slot number within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId {
    pub page_id: u32,
    pub slot: u32,
}

impl RowId {
    pub fn new(page_id: u32, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl Encodeable for RowId {
    fn encode(&self) -> Vec<u8> {
        let mut buf = self.page_id.encode();
        buf.extend(self.slot.encode());
        buf
    }
}

impl Decodeable for RowId {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let page_id = u32::decode_from(reader);
        let slot = u32::decode_from(reader);
        Self { page_id, slot }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub rid: RowId,
    pub fields: Vec<Field>,
}

impl Row {
    pub fn new(rid: RowId, fields: Vec<Field>) -> Self {
        Self { rid, fields }
    }

    /// Serialized form: RowId, column count, null bitmap
    /// (`ceil(n / 8)` bytes), then each non-null field back to back, typed
    /// by `schema`.
    pub fn encode(&self, schema: &Schema) -> Vec<u8> {
        let n = self.fields.len();
        let mut buf = self.rid.encode();
        buf.extend((n as u16).encode());

        let mut bits = BitVec::from_elem(n, false);
        for (i, f) in self.fields.iter().enumerate() {
            if f.is_null() {
                bits.set(i, true);
            }
        }
        buf.extend(bits.to_bytes());

        for (i, f) in self.fields.iter().enumerate() {
            if !f.is_null() {
                buf.extend(f.encode_value(schema.columns[i].col_type));
            }
        }
        buf
    }

    pub fn decode<R: std::io::Read>(reader: &mut R, schema: &Schema) -> DbResult<Self> {
        let rid = RowId::decode_from(reader);
        let n = u16::decode_from(reader) as usize;
        if n != schema.column_count() {
            return Err(DbError::corruption(format!(
                "row column count {} does not match schema column count {}",
                n,
                schema.column_count()
            )));
        }
        let bitmap_bytes = read_exact(reader, (n + 7) / 8);
        let bits = BitVec::from_bytes(&bitmap_bytes);

        let mut fields = Vec::with_capacity(n);
        for (i, col) in schema.columns.iter().enumerate() {
            if bits[i] {
                fields.push(Field::Null);
            } else {
                fields.push(Field::decode_value(reader, col.col_type));
            }
        }
        Ok(Self { rid, fields })
    }

    /// Serialized byte length of this row under `schema`, without actually
    /// encoding it — used by the heap to decide whether a tuple fits in a
    /// page's free space.
    pub fn encoded_size(&self, schema: &Schema) -> usize {
        let n = self.fields.len();
        let mut size = 4 + 4 + 2 + (n + 7) / 8;
        for (i, f) in self.fields.iter().enumerate() {
            if !f.is_null() {
                size += schema.columns[i].col_type.size();
            }
        }
        size
    }

    /// Project this row onto `key_schema` by column name, preserving this
    /// row's RowId so the projected row can still be traced back to its
    /// source tuple.
    pub fn project(&self, full_schema: &Schema, key_schema: &Schema) -> DbResult<Row> {
        let mut fields = Vec::with_capacity(key_schema.column_count());
        for col in &key_schema.columns {
            let idx = full_schema.index_of(&col.name)?;
            fields.push(self.fields[idx].clone());
        }
        Ok(Row::new(self.rid, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::column::Column;
    use crate::record::types::ColumnType;

    fn schema() -> Schema {
        Schema::new(vec![
            Column::new("id", ColumnType::Int32, 0, false, true),
            Column::new("name", ColumnType::Char(8), 1, true, false),
        ])
    }

    #[test]
    fn round_trips_with_no_nulls() {
        let schema = schema();
        let row = Row::new(
            RowId::new(3, 1),
            vec![Field::Int32(7), Field::Char("abc".to_string())],
        );
        let bytes = row.encode(&schema);
        assert_eq!(bytes.len(), row.encoded_size(&schema));
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Row::decode(&mut cursor, &schema).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn round_trips_with_a_null_field() {
        let schema = schema();
        let row = Row::new(RowId::new(0, 0), vec![Field::Int32(1), Field::Null]);
        let bytes = row.encode(&schema);
        assert_eq!(bytes.len(), row.encoded_size(&schema));
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Row::decode(&mut cursor, &schema).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn projects_a_key_schema_and_keeps_the_rowid() {
        let schema = schema();
        let row = Row::new(
            RowId::new(2, 5),
            vec![Field::Int32(9), Field::Char("x".to_string())],
        );
        let key_schema = schema.project(&["id".to_string()]).unwrap();
        let projected = row.project(&schema, &key_schema).unwrap();
        assert_eq!(projected.rid, row.rid);
        assert_eq!(projected.fields, vec![Field::Int32(9)]);
    }
}
