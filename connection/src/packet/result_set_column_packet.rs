use std::io::Cursor;

use common::err::{RpError, RpResult};

use crate::bytes::read_len_enc_str_allow_null;

/// 结果集的列定义（protocol 41），只留本系统用到的字段
#[derive(Debug)]
pub struct ResultSetColumnPacket {
    pub schema: String,
    pub table: String,
    pub name: String,
}

impl ResultSetColumnPacket {
    pub fn parse(packet: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(packet);

        let _catalog = Self::must(&mut cursor)?;
        let schema = Self::must(&mut cursor)?;
        let table = Self::must(&mut cursor)?;
        let _org_table = Self::must(&mut cursor)?;
        let name = Self::must(&mut cursor)?;

        Ok(Self {
            schema,
            table,
            name,
        })
    }

    fn must(cursor: &mut Cursor<&[u8]>) -> RpResult<String> {
        read_len_enc_str_allow_null(cursor)?
            .ok_or_else(|| RpError::ProtocolErr("unexpected NULL in column def".to_string()))
    }
}
