use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::RpResult;

/// XID_EVENT：事务提交
#[derive(Debug, Clone)]
pub struct XidEvent {
    pub xid: u64,
}

impl XidEvent {
    pub fn parse(body: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(body);
        Ok(Self {
            xid: cursor.read_u64::<LittleEndian>()?,
        })
    }
}
