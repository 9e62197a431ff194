use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::RpResult;

/// FORMAT_DESCRIPTION_EVENT：流的第一个事件，声明格式版本
#[derive(Debug, Clone)]
pub struct FormatDescriptionEvent {
    pub binlog_version: u16,
    pub server_version: String,
    pub create_timestamp: u32,
    pub common_header_len: u8,
}

impl FormatDescriptionEvent {
    /// body不含公共头
    pub fn parse(body: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(body);

        let binlog_version = cursor.read_u16::<LittleEndian>()?;

        let mut version_bytes = [0u8; 50];
        cursor.read_exact(&mut version_bytes)?;
        let end = version_bytes.iter().position(|&b| b == 0).unwrap_or(50);
        let server_version = String::from_utf8_lossy(&version_bytes[..end]).to_string();

        let create_timestamp = cursor.read_u32::<LittleEndian>()?;
        let common_header_len = cursor.read_u8()?;

        Ok(Self {
            binlog_version,
            server_version,
            create_timestamp,
            common_header_len,
        })
    }
}
