use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::{RpError, RpResult};

use crate::bytes::{read_fixed_string, read_null_term_string};

/// server的initial handshake（protocol version 10）
#[derive(Debug)]
pub struct HandshakePacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub capability_flags: u32,
    pub server_charset: u8,
    pub status_flags: u16,
    /// 20字节auth种子（part1+part2拼接）
    pub scramble: String,
    pub auth_plugin_name: String,
}

impl HandshakePacket {
    pub fn parse(packet: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(packet);

        let protocol_version = cursor.read_u8()?;
        if protocol_version != 10 {
            return Err(RpError::ProtocolErr(format!(
                "unsupported handshake protocol: {}",
                protocol_version
            )));
        }

        let server_version = read_null_term_string(&mut cursor)?;
        let connection_id = cursor.read_u32::<LittleEndian>()?;
        let scramble_part1 = read_fixed_string(&mut cursor, 8)?;

        // filler
        cursor.read_u8()?;
        let capability_low = cursor.read_u16::<LittleEndian>()? as u32;
        let server_charset = cursor.read_u8()?;
        let status_flags = cursor.read_u16::<LittleEndian>()?;
        let capability_high = cursor.read_u16::<LittleEndian>()? as u32;
        let capability_flags = capability_low | (capability_high << 16);

        let auth_data_len = cursor.read_u8()? as usize;
        let mut reserved = [0u8; 10];
        cursor.read_exact(&mut reserved)?;

        // part2带一个结尾NUL
        let part2_len = std::cmp::max(13, auth_data_len.saturating_sub(8));
        let mut part2 = vec![0u8; part2_len];
        cursor.read_exact(&mut part2)?;
        while part2.last() == Some(&0) {
            part2.pop();
        }
        let scramble_part2 = String::from_utf8(part2)?;

        let auth_plugin_name = read_null_term_string(&mut cursor)?;

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            capability_flags,
            server_charset,
            status_flags,
            scramble: format!("{}{}", scramble_part1, scramble_part2),
            auth_plugin_name,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut p = vec![10u8];
        p.extend_from_slice(b"8.0.36\0");
        p.extend_from_slice(&7u32.to_le_bytes());
        p.extend_from_slice(b"abcdefgh");
        p.push(0);
        p.extend_from_slice(&0xF7FFu16.to_le_bytes());
        p.push(45);
        p.extend_from_slice(&2u16.to_le_bytes());
        p.extend_from_slice(&0x0008u16.to_le_bytes());
        p.push(21);
        p.extend_from_slice(&[0u8; 10]);
        p.extend_from_slice(b"ijklmnopqrst\0");
        p.extend_from_slice(b"caching_sha2_password\0");
        p
    }

    #[test]
    fn test_parse() {
        let h = HandshakePacket::parse(&sample()).unwrap();
        assert_eq!(h.protocol_version, 10);
        assert_eq!(h.server_version, "8.0.36");
        assert_eq!(h.connection_id, 7);
        assert_eq!(h.scramble, "abcdefghijklmnopqrst");
        assert_eq!(h.scramble.len(), 20);
        assert_eq!(h.auth_plugin_name, "caching_sha2_password");
    }
}
