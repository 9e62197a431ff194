use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::RpResult;

/// QUERY_EVENT：statement格式语句，复制链路里只关心DDL
#[derive(Debug, Clone)]
pub struct QueryEvent {
    pub thread_id: u32,
    pub exec_time: u32,
    pub error_code: u16,
    /// 语句的默认库（USE的库）
    pub schema: String,
    pub query: String,
}

impl QueryEvent {
    pub fn parse(body: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(body);

        let thread_id = cursor.read_u32::<LittleEndian>()?;
        let exec_time = cursor.read_u32::<LittleEndian>()?;
        let schema_len = cursor.read_u8()? as usize;
        let error_code = cursor.read_u16::<LittleEndian>()?;
        let status_vars_len = cursor.read_u16::<LittleEndian>()? as i64;

        // status vars与本链路无关，跳过
        cursor.seek(SeekFrom::Current(status_vars_len))?;

        let mut schema_bytes = vec![0u8; schema_len];
        cursor.read_exact(&mut schema_bytes)?;
        let schema = String::from_utf8_lossy(&schema_bytes).to_string();

        // NUL分隔
        cursor.read_u8()?;

        let mut query_bytes = vec![];
        cursor.read_to_end(&mut query_bytes)?;
        let query = String::from_utf8_lossy(&query_bytes).to_string();

        Ok(Self {
            thread_id,
            exec_time,
            error_code,
            schema,
            query,
        })
    }

    /// BEGIN/COMMIT也走QUERY_EVENT，不是DDL
    pub fn is_transaction_marker(&self) -> bool {
        let q = self.query.trim();
        q.eq_ignore_ascii_case("BEGIN") || q.eq_ignore_ascii_case("COMMIT")
    }
}
