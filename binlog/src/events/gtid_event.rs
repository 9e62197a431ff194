use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::RpResult;

/// GTID_LOG_EVENT（MySQL）/ GTID_EVENT（MariaDB），
/// 统一成文本形式的事务id
#[derive(Debug, Clone)]
pub struct GtidEvent {
    /// 如 "3e11fa47-71ca-11e1-9e33-c80aa9429562:23"（MySQL）
    /// 或 "0-1-42"（MariaDB domain-server-seq）
    pub gtid: String,
}

impl GtidEvent {
    /// MySQL格式：flags u8 + sid 16字节 + gno i64
    pub fn parse(body: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(body);

        let _flags = cursor.read_u8()?;
        let mut sid = [0u8; 16];
        cursor.read_exact(&mut sid)?;
        let gno = cursor.read_i64::<LittleEndian>()?;

        Ok(Self {
            gtid: format!("{}:{}", format_uuid(&sid), gno),
        })
    }

    /// MariaDB格式：seq u64 + domain u32 + flags u8
    pub fn parse_maria(body: &[u8], server_id: u32) -> RpResult<Self> {
        let mut cursor = Cursor::new(body);

        let seq_no = cursor.read_u64::<LittleEndian>()?;
        let domain_id = cursor.read_u32::<LittleEndian>()?;

        Ok(Self {
            gtid: format!("{}-{}-{}", domain_id, server_id, seq_no),
        })
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        self.gtid.as_bytes().to_vec()
    }
}

fn format_uuid(sid: &[u8; 16]) -> String {
    let h = hex::encode(sid);
    format!(
        "{}-{}-{}-{}-{}",
        &h[0..8],
        &h[8..12],
        &h[12..16],
        &h[16..20],
        &h[20..32]
    )
}
