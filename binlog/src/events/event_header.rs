use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::{RpError, RpResult};

use crate::b_type::LogEventType;
use crate::EVENT_HEADER_SIZE;

/// 事件公共头（v4格式，19字节）.
/// ```txt
/// timestamp: 4字节
/// event_type: 1字节
/// server_id: 4字节
/// event_size: 4字节
/// log_pos: 4字节, 事件结束位置
/// flags: 2字节
/// ```
#[derive(Debug, Clone)]
pub struct EventHeader {
    pub timestamp: u32,
    pub event_type: LogEventType,
    pub server_id: u32,
    pub event_size: u32,
    /// 本事件之后的binlog偏移
    pub log_pos: u32,
    pub flags: u16,
}

impl EventHeader {
    pub fn parse(raw: &[u8]) -> RpResult<Self> {
        if raw.len() < EVENT_HEADER_SIZE {
            return Err(RpError::MalformedEvent(format!(
                "event shorter than header: {} bytes",
                raw.len()
            )));
        }
        let mut cursor = Cursor::new(raw);

        let timestamp = cursor.read_u32::<LittleEndian>()?;
        let type_byte = cursor.read_u8()?;
        let event_type = LogEventType::try_from(type_byte)
            .map_err(|_| RpError::DecodeErr(format!("unknown event type: 0x{:02x}", type_byte)))?;
        let server_id = cursor.read_u32::<LittleEndian>()?;
        let event_size = cursor.read_u32::<LittleEndian>()?;
        let log_pos = cursor.read_u32::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;

        Ok(Self {
            timestamp,
            event_type,
            server_id,
            event_size,
            log_pos,
            flags,
        })
    }
}
