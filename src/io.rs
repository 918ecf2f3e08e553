//! Binary codec traits used by the record layer and the page/catalog
//! metadata formats.
//!
//! Grounded directly in the teacher's `io.rs`: `Encodeable`/`Decodeable`
//! plus the `impl_serialization!` macro for the primitive numeric types.

use std::convert::TryInto;
use std::mem::size_of;

use bit_vec::BitVec;

pub trait Encodeable {
    fn encode(&self) -> Vec<u8>;
}

pub trait Decodeable: Sized {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self;
}

pub fn read_exact<R: std::io::Read>(reader: &mut R, bytes_count: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; bytes_count];
    reader
        .read_exact(&mut buffer)
        .unwrap_or_else(|_| panic!("io error, expect {} bytes", bytes_count));
    buffer
}

pub fn read_into<T: Decodeable, R: std::io::Read>(reader: &mut R) -> T {
    T::decode_from(reader)
}

/// An in-memory accumulator used to build a page's or record's serialized
/// bytes before it is written to disk.
pub struct SmallWriter {
    buf: Vec<u8>,
}

impl SmallWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write<T: Encodeable>(&mut self, obj: &T) {
        self.buf.extend_from_slice(obj.encode().as_slice());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.buf.clone()
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Pad (or reject, if it overflows) to exactly `size` bytes — used when
    /// a record must land in a fixed-size page slot.
    pub fn to_padded_bytes(&self, size: usize) -> Vec<u8> {
        let mut buf = self.buf.clone();
        if buf.len() > size {
            panic!(
                "buffer size is larger than the given size: {} > {}",
                buf.len(),
                size
            );
        }
        buf.resize(size, 0);
        buf
    }
}

impl Default for SmallWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// # Format
///
/// - 2 bytes: bytes size (little-endian)
/// - n bytes: bit vector payload
impl Encodeable for BitVec {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let payload = self.to_bytes();
        let len = payload.len() as u16;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&payload);
        buf
    }
}

impl Decodeable for BitVec {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let size = u16::from_le_bytes(read_exact(reader, 2).try_into().unwrap());
        let buf = read_exact(reader, size as usize);
        BitVec::from_bytes(&buf)
    }
}

/// # Format
///
/// - 1 byte (0 for false, 1 for true)
impl Encodeable for bool {
    fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl Decodeable for bool {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        u8::decode_from(reader) == 1
    }
}

/// # Format
///
/// - 2 bytes: byte length of the string (little-endian u16)
/// - n bytes: utf-8 payload
impl Encodeable for str {
    fn encode(&self) -> Vec<u8> {
        let bytes = self.as_bytes();
        let mut buf = Vec::with_capacity(2 + bytes.len());
        buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        buf.extend_from_slice(bytes);
        buf
    }
}

impl Encodeable for String {
    fn encode(&self) -> Vec<u8> {
        self.as_str().encode()
    }
}

impl Decodeable for String {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let len = u16::from_le_bytes(read_exact(reader, 2).try_into().unwrap());
        let bytes = read_exact(reader, len as usize);
        String::from_utf8(bytes).expect("non utf-8 string in codec")
    }
}

macro_rules! impl_serialization {
    (for $($t:ty),+) => {
        $(
            impl Encodeable for $t {
                fn encode(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }

            impl Decodeable for $t {
                fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
                    let bytes = read_exact(reader, size_of::<Self>());
                    Self::from_le_bytes(bytes.try_into().unwrap())
                }
            }
        )*
    }
}

impl_serialization!(for u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);
