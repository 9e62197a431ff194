use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::RpResult;

/// ERR packet（不含首字节0xFF）
#[derive(Debug)]
pub struct ErrorPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub message: String,
}

impl ErrorPacket {
    pub fn parse(packet: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(packet);

        let error_code = cursor.read_u16::<LittleEndian>()?;

        let mut rest = String::new();
        cursor.read_to_string(&mut rest)?;

        // protocol 41格式: '#' + 5字节sql state + message
        let (sql_state, message) = match rest.strip_prefix('#') {
            Some(tail) if tail.len() >= 5 => {
                let (state, msg) = tail.split_at(5);
                (state.to_string(), msg.to_string())
            }
            _ => (String::new(), rest),
        };

        Ok(Self {
            error_code,
            sql_state,
            message,
        })
    }
}
