//! A single typed, nullable value (§3, §4.5).

use crate::error::DbError;
use crate::io::{read_exact, Decodeable, Encodeable};
use crate::record::types::ColumnType;
use crate::types::DbResult;

#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int32(i32),
    Float32(f32),
    Char(String),
    Null,
}

impl Field {
    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Encode the value payload for a non-null field. The null bit itself
    /// lives in the row's bitmap, not here.
    pub fn encode_value(&self, col_type: ColumnType) -> Vec<u8> {
        match (self, col_type) {
            (Field::Int32(v), ColumnType::Int32) => v.encode(),
            (Field::Float32(v), ColumnType::Float32) => v.encode(),
            (Field::Char(s), ColumnType::Char(len)) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.resize(len as usize, 0);
                bytes
            }
            _ => panic!("field/column type mismatch"),
        }
    }

    pub fn decode_value<R: std::io::Read>(reader: &mut R, col_type: ColumnType) -> Self {
        match col_type {
            ColumnType::Int32 => Field::Int32(i32::decode_from(reader)),
            ColumnType::Float32 => Field::Float32(f32::decode_from(reader)),
            ColumnType::Char(len) => {
                let bytes = read_exact(reader, len as usize);
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Field::Char(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
        }
    }

    pub fn as_i32(&self) -> DbResult<i32> {
        match self {
            Field::Int32(v) => Ok(*v),
            _ => Err(DbError::corruption("field is not Int32")),
        }
    }
}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Field::Int32(a), Field::Int32(b)) => a.partial_cmp(b),
            (Field::Float32(a), Field::Float32(b)) => a.partial_cmp(b),
            (Field::Char(a), Field::Char(b)) => a.partial_cmp(b),
            (Field::Null, Field::Null) => Some(std::cmp::Ordering::Equal),
            _ => None,
        }
    }
}

impl Eq for Field {}

impl Ord for Field {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.partial_cmp(other)
            .expect("comparing fields of different types")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int32_round_trips() {
        let f = Field::Int32(-42);
        let bytes = f.encode_value(ColumnType::Int32);
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Field::decode_value(&mut cursor, ColumnType::Int32);
        assert_eq!(decoded, f);
    }

    #[test]
    fn char_pads_and_trims_on_round_trip() {
        let f = Field::Char("hi".to_string());
        let bytes = f.encode_value(ColumnType::Char(8));
        assert_eq!(bytes.len(), 8);
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = Field::decode_value(&mut cursor, ColumnType::Char(8));
        assert_eq!(decoded, f);
    }
}
