use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::RpResult;

/// EOF packet（protocol 41，总长<9）
#[derive(Debug)]
pub struct EndOfFilePacket {
    pub warnings: u16,
    pub status_flags: u16,
}

impl EndOfFilePacket {
    /// 判断是否为EOF（0xFE且packet足够短，区别于len-enc的0xFE）
    pub fn is_eof(packet: &[u8]) -> bool {
        !packet.is_empty() && packet[0] == 0xFE && packet.len() < 9
    }

    pub fn parse(packet: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(&packet[1..]);
        let warnings = cursor.read_u16::<LittleEndian>().unwrap_or(0);
        let status_flags = cursor.read_u16::<LittleEndian>().unwrap_or(0);
        Ok(Self {
            warnings,
            status_flags,
        })
    }
}
