//! Row tuple codec (spec §4.2).
//!
//! `encode`/`decode` must round-trip every legal value sequence, distinguish
//! Null from empty text/blob, and preserve numeric precision. The physical
//! format is a tag byte per value followed by its payload, with string/blob
//! lengths and vector dimensions carried as LEB128 varints (`util::varint`)
//! so small records stay small — mirroring the teacher's `UnpackedRecord`
//! role (a row's on-disk representation) without its raw-pointer layout.

use crate::util::varint::{get_varint, put_varint};
use crate::value::Value;

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_BLOB: u8 = 4;
const TAG_VECTOR: u8 = 5;

pub fn encode(values: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    put_varint(&mut out, values.len() as u64);
    for v in values {
        encode_one(v, &mut out);
    }
    out
}

fn encode_one(v: &Value, out: &mut Vec<u8>) {
    match v {
        Value::Null => out.push(TAG_NULL),
        Value::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_be_bytes());
        }
        Value::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_be_bytes());
        }
        Value::Text(s) => {
            out.push(TAG_TEXT);
            put_varint(out, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Blob(b) => {
            out.push(TAG_BLOB);
            put_varint(out, b.len() as u64);
            out.extend_from_slice(b);
        }
        Value::Vector(elems) => {
            out.push(TAG_VECTOR);
            put_varint(out, elems.len() as u64);
            for f in elems {
                out.extend_from_slice(&f.to_be_bytes());
            }
        }
    }
}

/// Decode a full record. Returns `None` on malformed input (truncated
/// payload, unknown tag) rather than panicking — corrupt storage is a
/// possibility the codec must tolerate gracefully.
pub fn decode(data: &[u8]) -> Option<Vec<Value>> {
    let (count, mut pos) = get_varint(data)?;
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (v, consumed) = decode_one(&data[pos..])?;
        values.push(v);
        pos += consumed;
    }
    Some(values)
}

fn decode_one(data: &[u8]) -> Option<(Value, usize)> {
    let tag = *data.first()?;
    let rest = &data[1..];
    match tag {
        TAG_NULL => Some((Value::Null, 1)),
        TAG_INT => {
            let bytes: [u8; 8] = rest.get(0..8)?.try_into().ok()?;
            Some((Value::Int(i64::from_be_bytes(bytes)), 9))
        }
        TAG_FLOAT => {
            let bytes: [u8; 8] = rest.get(0..8)?.try_into().ok()?;
            Some((Value::Float(f64::from_be_bytes(bytes)), 9))
        }
        TAG_TEXT => {
            let (len, n) = get_varint(rest)?;
            let bytes = rest.get(n..n + len as usize)?;
            let s = std::str::from_utf8(bytes).ok()?.to_string();
            Some((Value::Text(s), 1 + n + len as usize))
        }
        TAG_BLOB => {
            let (len, n) = get_varint(rest)?;
            let bytes = rest.get(n..n + len as usize)?.to_vec();
            Some((Value::Blob(bytes), 1 + n + len as usize))
        }
        TAG_VECTOR => {
            let (len, n) = get_varint(rest)?;
            let mut elems = Vec::with_capacity(len as usize);
            let mut off = n;
            for _ in 0..len {
                let bytes: [u8; 4] = rest.get(off..off + 4)?.try_into().ok()?;
                elems.push(f32::from_be_bytes(bytes));
                off += 4;
            }
            Some((Value::Vector(elems), 1 + off))
        }
        _ => None,
    }
}

/// RowID: a 64-bit monotonically increasing integer per table (spec §3),
/// encoded big-endian so its byte order matches its numeric order and it
/// can serve directly as the heap B-tree's key.
pub type RowId = i64;

pub fn encode_rowid(rowid: RowId) -> [u8; 8] {
    rowid.to_be_bytes()
}

pub fn decode_rowid(bytes: &[u8]) -> Option<RowId> {
    Some(RowId::from_be_bytes(bytes.get(0..8)?.try_into().ok()?))
}
