use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::{RpError, RpResult};
use common::schema::column_type::SrcColumnType;

/// TABLE_MAP里单列的解码参数。
/// CHAR/ENUM/SET在wire上共用String类型字节，
/// 真实类型藏在metadata里，解析时还原。
#[derive(Debug, Clone, Copy)]
pub struct ColumnMeta {
    pub col_type: SrcColumnType,
    /// 语义随类型而变：长度、精度<<8|标度、fsp、总bit数
    pub meta: u16,
}

impl ColumnMeta {
    /// 按TABLE_MAP的类型数组解析metadata块
    pub fn parse_all(
        cursor: &mut Cursor<&[u8]>,
        column_types: &[u8],
    ) -> RpResult<Vec<ColumnMeta>> {
        let mut out = Vec::with_capacity(column_types.len());
        for &type_byte in column_types {
            let col_type = SrcColumnType::try_from(type_byte).map_err(|_| {
                RpError::DecodeErr(format!("unknown column type byte: 0x{:02x}", type_byte))
            })?;
            out.push(Self::parse_one(cursor, col_type)?);
        }
        Ok(out)
    }

    fn parse_one(cursor: &mut Cursor<&[u8]>, col_type: SrcColumnType) -> RpResult<ColumnMeta> {
        let meta = match col_type {
            SrcColumnType::Float
            | SrcColumnType::Double
            | SrcColumnType::TinyBlob
            | SrcColumnType::MediumBlob
            | SrcColumnType::LongBlob
            | SrcColumnType::Blob
            | SrcColumnType::Json
            | SrcColumnType::Geometry
            | SrcColumnType::Time2
            | SrcColumnType::DateTime2
            | SrcColumnType::Timestamp2 => cursor.read_u8()? as u16,

            SrcColumnType::VarChar | SrcColumnType::VarString => {
                cursor.read_u16::<LittleEndian>()?
            }

            SrcColumnType::NewDecimal => {
                let precision = cursor.read_u8()? as u16;
                let scale = cursor.read_u8()? as u16;
                (precision << 8) | scale
            }

            SrcColumnType::Bit => {
                let bits = cursor.read_u8()? as u16;
                let bytes = cursor.read_u8()? as u16;
                bytes * 8 + bits
            }

            SrcColumnType::String | SrcColumnType::Enum | SrcColumnType::Set => {
                // CHAR(n)/ENUM/SET的两字节metadata：
                // byte0为真实类型（长字段时高位混入长度），byte1为长度
                let m0 = cursor.read_u8()?;
                let m1 = cursor.read_u8()?;
                return Self::resolve_string_meta(m0, m1);
            }

            _ => 0,
        };

        Ok(ColumnMeta { col_type, meta })
    }

    fn resolve_string_meta(m0: u8, m1: u8) -> RpResult<ColumnMeta> {
        if m0 == SrcColumnType::Enum as u8 {
            return Ok(ColumnMeta {
                col_type: SrcColumnType::Enum,
                meta: m1 as u16,
            });
        }
        if m0 == SrcColumnType::Set as u8 {
            return Ok(ColumnMeta {
                col_type: SrcColumnType::Set,
                meta: m1 as u16,
            });
        }

        // CHAR(n)长度超过255时，长度高位折叠进m0
        let length = if m0 & 0x30 != 0x30 {
            (m1 as u16) | ((((m0 as u16) & 0x30) ^ 0x30) << 4)
        } else {
            m1 as u16
        };
        Ok(ColumnMeta {
            col_type: SrcColumnType::String,
            meta: length,
        })
    }

    pub fn decimal_precision(&self) -> u8 {
        (self.meta >> 8) as u8
    }

    pub fn decimal_scale(&self) -> u8 {
        (self.meta & 0xFF) as u8
    }
}
