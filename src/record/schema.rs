//! An ordered sequence of columns (§3, §4.5).

use crate::error::DbError;
use crate::io::{Decodeable, Encodeable, SmallWriter};
use crate::record::column::Column;
use crate::types::DbResult;

const SCHEMA_MAGIC: u32 = 0x53434831; // "SCH1"

#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub columns: Vec<Column>,
    /// Whether this schema instance owns (deep-copied) its columns, as
    /// opposed to a projection sharing column definitions with a table's
    /// canonical schema.
    pub is_manage: bool,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            is_manage: true,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn index_of(&self, name: &str) -> DbResult<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| DbError::not_found(format!("column {}", name)))
    }

    /// Project a sub-schema over the named columns, in the order given —
    /// used to build an index's key schema from a table schema.
    pub fn project(&self, names: &[String]) -> DbResult<Schema> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let col = self
                .columns
                .iter()
                .find(|c| &c.name == name)
                .ok_or_else(|| DbError::not_found(format!("column {}", name)))?;
            columns.push(col.clone());
        }
        Ok(Schema {
            columns,
            is_manage: true,
        })
    }
}

impl Encodeable for Schema {
    fn encode(&self) -> Vec<u8> {
        let mut w = SmallWriter::new();
        w.write(&SCHEMA_MAGIC);
        w.write(&(self.columns.len() as u32));
        for col in &self.columns {
            w.write(col);
        }
        w.write(&self.is_manage);
        w.to_bytes()
    }
}

impl Decodeable for Schema {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let magic = u32::decode_from(reader);
        assert_eq!(magic, SCHEMA_MAGIC, "schema magic mismatch");
        let count = u32::decode_from(reader);
        let mut columns = Vec::with_capacity(count as usize);
        for _ in 0..count {
            columns.push(Column::decode_from(reader));
        }
        let is_manage = bool::decode_from(reader);
        Self { columns, is_manage }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::types::ColumnType;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", ColumnType::Int32, 0, false, true),
            Column::new("name", ColumnType::Char(16), 1, true, false),
        ])
    }

    #[test]
    fn round_trips_through_bytes() {
        let schema = sample_schema();
        let bytes = schema.encode();
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Schema::decode_from(&mut cursor);
        assert_eq!(decoded, schema);
    }

    #[test]
    fn projects_named_columns_in_order() {
        let schema = sample_schema();
        let projected = schema.project(&["name".to_string(), "id".to_string()]).unwrap();
        assert_eq!(projected.columns[0].name, "name");
        assert_eq!(projected.columns[1].name, "id");
    }
}
