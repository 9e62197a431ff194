use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::RpResult;

use crate::column::column_metadata::ColumnMeta;
use crate::utils::{read_bytes, read_len_enc_num, read_u48};

/// TABLE_MAP_EVENT：行事件之前的表结构声明，
/// 按table_id被后续行事件引用
#[derive(Debug, Clone)]
pub struct TableMapEvent {
    pub table_id: u64,
    pub database: String,
    pub table: String,
    pub column_metas: Vec<ColumnMeta>,
    /// 可空列位图（列下标，LSB在前）
    pub null_bitmap: Vec<u8>,
}

impl TableMapEvent {
    pub fn parse(body: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(body);

        let table_id = read_u48(&mut cursor)?;
        let _flags = cursor.read_u16::<LittleEndian>()?;

        let schema_len = cursor.read_u8()? as usize;
        let database = String::from_utf8_lossy(&read_bytes(&mut cursor, schema_len)?).to_string();
        cursor.read_u8()?;

        let table_len = cursor.read_u8()? as usize;
        let table = String::from_utf8_lossy(&read_bytes(&mut cursor, table_len)?).to_string();
        cursor.read_u8()?;

        let column_count = read_len_enc_num(&mut cursor)? as usize;
        let column_types = read_bytes(&mut cursor, column_count)?;

        let _metadata_len = read_len_enc_num(&mut cursor)?;
        let column_metas = ColumnMeta::parse_all(&mut cursor, &column_types)?;

        let null_bitmap = read_bytes(&mut cursor, (column_count + 7) / 8)?;

        Ok(Self {
            table_id,
            database,
            table,
            column_metas,
            null_bitmap,
        })
    }

    pub fn column_count(&self) -> usize {
        self.column_metas.len()
    }
}
