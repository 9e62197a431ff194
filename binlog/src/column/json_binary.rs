//! 源库JSON列的二进制格式解码。
//! 对外是一个纯函数collaborator：bytes -> 规范JSON文本，
//! 无IO无状态，解码失败时返回字面量"null"。

use std::io;

use serde::Serialize;
use serde_json::{Map, Number, Value};

use common::err::{RpError, RpResult};

const TYPE_SMALL_OBJECT: u8 = 0x00;
const TYPE_LARGE_OBJECT: u8 = 0x01;
const TYPE_SMALL_ARRAY: u8 = 0x02;
const TYPE_LARGE_ARRAY: u8 = 0x03;
const TYPE_LITERAL: u8 = 0x04;
const TYPE_INT16: u8 = 0x05;
const TYPE_UINT16: u8 = 0x06;
const TYPE_INT32: u8 = 0x07;
const TYPE_UINT32: u8 = 0x08;
const TYPE_INT64: u8 = 0x09;
const TYPE_UINT64: u8 = 0x0A;
const TYPE_DOUBLE: u8 = 0x0B;
const TYPE_STRING: u8 = 0x0C;
const TYPE_OPAQUE: u8 = 0x0F;

const LITERAL_NULL: u8 = 0x00;
const LITERAL_TRUE: u8 = 0x01;
const LITERAL_FALSE: u8 = 0x02;

/// collaborator入口
pub fn decode(data: &[u8]) -> String {
    match parse(data) {
        Ok(v) => to_canonical_text(&v),
        Err(_) => "null".to_string(),
    }
}

fn parse(data: &[u8]) -> RpResult<Value> {
    if data.is_empty() {
        return Ok(Value::Null);
    }
    parse_value(data[0], &data[1..])
}

fn err(msg: &str) -> RpError {
    RpError::DecodeErr(format!("json binary: {}", msg))
}

fn parse_value(value_type: u8, payload: &[u8]) -> RpResult<Value> {
    match value_type {
        TYPE_SMALL_OBJECT => parse_object(payload, false),
        TYPE_LARGE_OBJECT => parse_object(payload, true),
        TYPE_SMALL_ARRAY => parse_array(payload, false),
        TYPE_LARGE_ARRAY => parse_array(payload, true),
        TYPE_LITERAL => parse_literal(*payload.first().ok_or_else(|| err("empty literal"))?),
        TYPE_INT16 => Ok(Value::Number(Number::from(le_int(payload, 2)? as i16))),
        TYPE_UINT16 => Ok(Value::Number(Number::from(le_uint(payload, 2)? as u16))),
        TYPE_INT32 => Ok(Value::Number(Number::from(le_int(payload, 4)? as i32))),
        TYPE_UINT32 => Ok(Value::Number(Number::from(le_uint(payload, 4)? as u32))),
        TYPE_INT64 => Ok(Value::Number(Number::from(le_int(payload, 8)?))),
        TYPE_UINT64 => Ok(Value::Number(Number::from(le_uint(payload, 8)?))),
        TYPE_DOUBLE => {
            let bits = le_uint(payload, 8)?;
            let d = f64::from_bits(bits);
            Ok(Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null))
        }
        TYPE_STRING => {
            let (len, consumed) = read_var_len(payload)?;
            let bytes = payload
                .get(consumed..consumed + len)
                .ok_or_else(|| err("string out of bounds"))?;
            Ok(Value::String(String::from_utf8_lossy(bytes).to_string()))
        }
        TYPE_OPAQUE => parse_opaque(payload),
        other => Err(err(&format!("unknown type marker 0x{:02x}", other))),
    }
}

fn parse_literal(b: u8) -> RpResult<Value> {
    match b {
        LITERAL_NULL => Ok(Value::Null),
        LITERAL_TRUE => Ok(Value::Bool(true)),
        LITERAL_FALSE => Ok(Value::Bool(false)),
        other => Err(err(&format!("bad literal 0x{:02x}", other))),
    }
}

/// opaque值带内部类型码；decimal可还原，其余还原不了的记null
fn parse_opaque(payload: &[u8]) -> RpResult<Value> {
    use common::schema::column_type::SrcColumnType;

    let inner_type = *payload.first().ok_or_else(|| err("empty opaque"))?;
    let (len, consumed) = read_var_len(&payload[1..])?;
    let data = payload
        .get(1 + consumed..1 + consumed + len)
        .ok_or_else(|| err("opaque out of bounds"))?;

    if inner_type == SrcColumnType::NewDecimal as u8 && data.len() > 2 {
        let precision = data[0];
        let scale = data[1];
        let mut cursor = std::io::Cursor::new(&data[2..]);
        let s = crate::column::decimal::decode_decimal(&mut cursor, precision, scale)?;
        return Ok(Value::String(s));
    }
    Ok(Value::Null)
}

fn parse_object(payload: &[u8], large: bool) -> RpResult<Value> {
    let osz = if large { 4 } else { 2 };
    let count = le_uint(payload, osz)? as usize;
    let _size = le_uint(&payload[osz..], osz)? as usize;

    let key_entry_size = osz + 2;
    let value_entry_size = 1 + osz;
    let keys_start = 2 * osz;
    let values_start = keys_start + count * key_entry_size;

    let mut object = Map::new();
    for i in 0..count {
        let ke = keys_start + i * key_entry_size;
        let key_offset = le_uint(&payload[ke..], osz)? as usize;
        let key_len = le_uint(&payload[ke + osz..], 2)? as usize;
        let key_bytes = payload
            .get(key_offset..key_offset + key_len)
            .ok_or_else(|| err("key out of bounds"))?;
        let key = String::from_utf8_lossy(key_bytes).to_string();

        let ve = values_start + i * value_entry_size;
        let value = parse_entry(payload, ve, osz, large)?;
        object.insert(key, value);
    }
    Ok(Value::Object(object))
}

fn parse_array(payload: &[u8], large: bool) -> RpResult<Value> {
    let osz = if large { 4 } else { 2 };
    let count = le_uint(payload, osz)? as usize;
    let _size = le_uint(&payload[osz..], osz)? as usize;

    let value_entry_size = 1 + osz;
    let values_start = 2 * osz;

    let mut array = Vec::with_capacity(count);
    for i in 0..count {
        let ve = values_start + i * value_entry_size;
        array.push(parse_entry(payload, ve, osz, large)?);
    }
    Ok(Value::Array(array))
}

/// value entry：type字节 + inline值或容器内offset
fn parse_entry(payload: &[u8], entry_pos: usize, osz: usize, large: bool) -> RpResult<Value> {
    let value_type = *payload.get(entry_pos).ok_or_else(|| err("entry out of bounds"))?;
    let slot = &payload[entry_pos + 1..];

    let inline = match value_type {
        TYPE_LITERAL | TYPE_INT16 | TYPE_UINT16 => true,
        TYPE_INT32 | TYPE_UINT32 => large,
        _ => false,
    };

    if inline {
        return parse_value(value_type, &slot[..osz]);
    }

    let offset = le_uint(slot, osz)? as usize;
    let target = payload.get(offset..).ok_or_else(|| err("offset out of bounds"))?;
    parse_value(value_type, target)
}

/// 变长长度：每字节7位，高位为续位
fn read_var_len(data: &[u8]) -> RpResult<(usize, usize)> {
    let mut len = 0usize;
    for (i, &b) in data.iter().enumerate().take(5) {
        len |= ((b & 0x7F) as usize) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((len, i + 1));
        }
    }
    Err(err("bad varlen"))
}

fn le_uint(data: &[u8], len: usize) -> RpResult<u64> {
    if data.len() < len {
        return Err(err("truncated number"));
    }
    let mut v = 0u64;
    for i in 0..len {
        v |= (data[i] as u64) << (8 * i);
    }
    Ok(v)
}

fn le_int(data: &[u8], len: usize) -> RpResult<i64> {
    let raw = le_uint(data, len)?;
    let shift = 64 - 8 * len as u32;
    Ok(((raw << shift) as i64) >> shift)
}

/// 规范文本形式：", "与": "分隔（与collaborator约定一致）
pub fn to_canonical_text(value: &Value) -> String {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, CanonicalFormatter);
    match value.serialize(&mut ser) {
        Ok(()) => String::from_utf8_lossy(&out).to_string(),
        Err(_) => "null".to_string(),
    }
}

struct CanonicalFormatter;

impl serde_json::ser::Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !first {
            writer.write_all(b", ")?;
        }
        Ok(())
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !first {
            writer.write_all(b", ")?;
        }
        Ok(())
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(decode(&[TYPE_LITERAL, LITERAL_NULL]), "null");
        assert_eq!(decode(&[TYPE_LITERAL, LITERAL_TRUE]), "true");
        assert_eq!(decode(&[TYPE_INT16, 0xFF, 0xFF]), "-1");
        assert_eq!(decode(&[TYPE_UINT16, 0xFF, 0xFF]), "65535");
        assert_eq!(decode(&[TYPE_STRING, 2, b'h', b'i']), "\"hi\"");
    }

    #[test]
    fn test_empty_is_null() {
        assert_eq!(decode(&[]), "null");
    }

    #[test]
    fn test_garbage_is_null() {
        assert_eq!(decode(&[0x77, 1, 2, 3]), "null");
    }

    /// {"a": [1, 2], "b": "x"} 的手工编码
    fn sample_object() -> Vec<u8> {
        let mut doc = vec![TYPE_SMALL_OBJECT];
        let payload: Vec<u8> = vec![
            0x02, 0x00, // count
            0x20, 0x00, // size = 32
            0x12, 0x00, 0x01, 0x00, // key "a": offset 18, len 1
            0x13, 0x00, 0x01, 0x00, // key "b": offset 19, len 1
            TYPE_SMALL_ARRAY, 0x14, 0x00, // value a: offset 20
            TYPE_STRING, 0x1E, 0x00, // value b: offset 30
            b'a', b'b', // key data
            // array [1, 2] at 20
            0x02, 0x00, 0x0A, 0x00, TYPE_INT16, 0x01, 0x00, TYPE_INT16, 0x02, 0x00,
            // string "x" at 30
            0x01, b'x',
        ];
        doc.extend_from_slice(&payload);
        doc
    }

    #[test]
    fn test_object_canonical_form() {
        assert_eq!(decode(&sample_object()), "{\"a\": [1, 2], \"b\": \"x\"}");
    }

    #[test]
    fn test_canonical_separators() {
        let v: Value = serde_json::from_str(r#"{"a":null,"b":[1,{"c":true}]}"#).unwrap();
        assert_eq!(
            to_canonical_text(&v),
            "{\"a\": null, \"b\": [1, {\"c\": true}]}"
        );
    }
}
