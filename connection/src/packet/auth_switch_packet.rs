use std::io::{Cursor, Read};

use common::err::RpResult;

use crate::bytes::read_null_term_string;

/// AuthSwitchRequest（不含首字节0xFE）
#[derive(Debug)]
pub struct AuthSwitchPacket {
    pub auth_plugin_name: String,
    pub scramble: String,
}

impl AuthSwitchPacket {
    pub fn parse(packet: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(packet);

        let auth_plugin_name = read_null_term_string(&mut cursor)?;

        // 剩余部分为新的scramble，结尾可能带NUL
        let mut rest = vec![];
        cursor.read_to_end(&mut rest)?;
        while rest.last() == Some(&0) {
            rest.pop();
        }
        let scramble = String::from_utf8(rest)?;

        Ok(Self {
            auth_plugin_name,
            scramble,
        })
    }
}
