use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::RpResult;

/// ROTATE_EVENT：切换到下一个binlog文件。
/// dump开始时server会先发一个人造rotate指明当前文件。
#[derive(Debug, Clone)]
pub struct RotateEvent {
    pub position: u64,
    pub next_file_name: String,
}

impl RotateEvent {
    pub fn parse(body: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(body);

        let position = cursor.read_u64::<LittleEndian>()?;
        let mut name = vec![];
        cursor.read_to_end(&mut name)?;

        Ok(Self {
            position,
            next_file_name: String::from_utf8_lossy(&name).to_string(),
        })
    }
}
