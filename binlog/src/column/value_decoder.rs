use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::{RpError, RpResult};
use common::schema::column_type::SrcColumnType;
use common::schema::column_value::ColumnValue;

use crate::column::column_metadata::ColumnMeta;
use crate::column::decimal::decode_decimal;
use crate::column::json_binary;
use crate::utils::{read_bytes, read_uint_be, read_uint_le};

/// JSON二进制解码collaborator：纯函数，失败时返回字面量"null"
pub type JsonDecodeFn = fn(&[u8]) -> String;

/// 按TABLE_MAP metadata解码行事件中的单列值
pub struct ValueDecoder {
    json_decode: JsonDecodeFn,
}

impl Default for ValueDecoder {
    fn default() -> Self {
        Self {
            json_decode: json_binary::decode,
        }
    }
}

impl ValueDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json_decoder(json_decode: JsonDecodeFn) -> Self {
        Self { json_decode }
    }

    pub fn decode(&self, cursor: &mut Cursor<&[u8]>, meta: &ColumnMeta) -> RpResult<ColumnValue> {
        let v = match meta.col_type {
            SrcColumnType::Tiny => ColumnValue::SignedInt(cursor.read_i8()? as i64),
            SrcColumnType::Short => ColumnValue::SignedInt(cursor.read_i16::<LittleEndian>()? as i64),
            SrcColumnType::Int24 => {
                ColumnValue::SignedInt(cursor.read_i24::<LittleEndian>()? as i64)
            }
            SrcColumnType::Long => ColumnValue::SignedInt(cursor.read_i32::<LittleEndian>()? as i64),
            SrcColumnType::LongLong => ColumnValue::SignedInt(cursor.read_i64::<LittleEndian>()?),

            SrcColumnType::Float => ColumnValue::Float(cursor.read_f32::<LittleEndian>()?),
            SrcColumnType::Double => ColumnValue::Double(cursor.read_f64::<LittleEndian>()?),

            SrcColumnType::NewDecimal | SrcColumnType::Decimal => ColumnValue::Decimal(
                decode_decimal(cursor, meta.decimal_precision(), meta.decimal_scale())?,
            ),

            SrcColumnType::Year => ColumnValue::Year(1900 + cursor.read_u8()? as u16),

            SrcColumnType::Date => {
                let v = read_uint_le(cursor, 3)?;
                ColumnValue::Date {
                    year: (v >> 9) as u16,
                    month: ((v >> 5) & 0x0F) as u8,
                    day: (v & 0x1F) as u8,
                }
            }

            SrcColumnType::Time => {
                // 旧格式：十进制HHMMSS
                let v = read_uint_le(cursor, 3)? as i64;
                ColumnValue::Time {
                    negative: false,
                    hours: (v / 10_000) as u32,
                    minutes: ((v / 100) % 100) as u8,
                    seconds: (v % 100) as u8,
                    micros: 0,
                }
            }

            SrcColumnType::Time2 => Self::decode_time2(cursor, meta.meta as u8)?,

            SrcColumnType::DateTime => {
                // 旧格式：十进制YYYYMMDDHHMMSS
                let v = cursor.read_u64::<LittleEndian>()?;
                let date = v / 1_000_000;
                let time = v % 1_000_000;
                ColumnValue::DateTime {
                    year: (date / 10_000) as u16,
                    month: ((date / 100) % 100) as u8,
                    day: (date % 100) as u8,
                    hour: (time / 10_000) as u8,
                    minute: ((time / 100) % 100) as u8,
                    second: (time % 100) as u8,
                    micros: 0,
                }
            }

            SrcColumnType::DateTime2 => Self::decode_datetime2(cursor, meta.meta as u8)?,

            SrcColumnType::Timestamp => {
                let secs = cursor.read_u32::<LittleEndian>()? as i64;
                ColumnValue::Timestamp {
                    unix_micros: secs * 1_000_000,
                }
            }

            SrcColumnType::Timestamp2 => {
                let secs = read_uint_be(cursor, 4)? as i64;
                let micros = Self::read_fractional(cursor, meta.meta as u8)?;
                ColumnValue::Timestamp {
                    unix_micros: secs * 1_000_000 + micros as i64,
                }
            }

            SrcColumnType::VarChar | SrcColumnType::VarString | SrcColumnType::String => {
                let len = if meta.meta < 256 {
                    cursor.read_u8()? as usize
                } else {
                    cursor.read_u16::<LittleEndian>()? as usize
                };
                let bytes = read_bytes(cursor, len)?;
                ColumnValue::String(String::from_utf8_lossy(&bytes).to_string())
            }

            SrcColumnType::Enum => {
                let v = read_uint_le(cursor, meta.meta as usize)?;
                ColumnValue::Enum(v as u32)
            }

            SrcColumnType::Set => {
                let v = read_uint_le(cursor, meta.meta as usize)?;
                ColumnValue::Set(v)
            }

            SrcColumnType::Bit => {
                let bytes = (meta.meta as usize + 7) / 8;
                ColumnValue::Bit(read_uint_be(cursor, bytes)?)
            }

            SrcColumnType::TinyBlob
            | SrcColumnType::MediumBlob
            | SrcColumnType::LongBlob
            | SrcColumnType::Blob => {
                let len = read_uint_le(cursor, meta.meta as usize)? as usize;
                ColumnValue::Bytes(read_bytes(cursor, len)?)
            }

            SrcColumnType::Geometry => {
                let len = read_uint_le(cursor, meta.meta as usize)? as usize;
                ColumnValue::Bytes(read_bytes(cursor, len)?)
            }

            SrcColumnType::Json => {
                let len = read_uint_le(cursor, meta.meta as usize)? as usize;
                let blob = read_bytes(cursor, len)?;
                ColumnValue::Json((self.json_decode)(&blob))
            }

            SrcColumnType::Null => ColumnValue::Null,

            other => {
                return Err(RpError::DecodeErr(format!(
                    "undecodable column type: {:?}",
                    other
                )))
            }
        };
        Ok(v)
    }

    /// fsp -> 小数字节数(fsp+1)/2，值为fsp位十进制数
    fn read_fractional(cursor: &mut Cursor<&[u8]>, fsp: u8) -> RpResult<u32> {
        let bytes = (fsp as usize + 1) / 2;
        if bytes == 0 {
            return Ok(0);
        }
        let v = read_uint_be(cursor, bytes)? as u32;
        let digits = bytes * 2;
        Ok(v * 10u32.pow(6 - digits as u32))
    }

    /// DATETIME2：5字节大端紧凑编码 + fsp小数
    fn decode_datetime2(cursor: &mut Cursor<&[u8]>, fsp: u8) -> RpResult<ColumnValue> {
        let long = read_uint_be(cursor, 5)? as i64;
        let int_part = long - 0x80_0000_0000;

        let year_month = ((int_part >> 22) & 0x1_FFFF) as u32;
        let micros = Self::read_fractional(cursor, fsp)?;

        Ok(ColumnValue::DateTime {
            year: (year_month / 13) as u16,
            month: (year_month % 13) as u8,
            day: ((int_part >> 17) & 0x1F) as u8,
            hour: ((int_part >> 12) & 0x1F) as u8,
            minute: ((int_part >> 6) & 0x3F) as u8,
            second: (int_part & 0x3F) as u8,
            micros,
        })
    }

    /// TIME2：3字节大端 + fsp小数，带符号的整体二进制补码
    fn decode_time2(cursor: &mut Cursor<&[u8]>, fsp: u8) -> RpResult<ColumnValue> {
        let frac_bytes = (fsp as usize + 1) / 2;
        let total = read_uint_be(cursor, 3 + frac_bytes)? as i64;
        let offset = 0x80_0000i64 << (8 * frac_bytes);

        let signed = total - offset;
        let negative = signed < 0;
        let abs = signed.unsigned_abs();

        let frac_mask = (1u64 << (8 * frac_bytes)) - 1;
        let frac = (abs & frac_mask) as u32;
        let int_part = abs >> (8 * frac_bytes);

        let digits = frac_bytes * 2;
        let micros = if frac_bytes == 0 {
            0
        } else {
            frac * 10u32.pow(6 - digits as u32)
        };

        Ok(ColumnValue::Time {
            negative,
            hours: ((int_part >> 12) & 0x3FF) as u32,
            minutes: ((int_part >> 6) & 0x3F) as u8,
            seconds: (int_part & 0x3F) as u8,
            micros,
        })
    }
}
