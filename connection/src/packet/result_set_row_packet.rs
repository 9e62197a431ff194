use std::io::Cursor;

use common::err::RpResult;

use crate::bytes::read_len_enc_str_allow_null;

/// 文本协议的结果行，NULL以None表示
#[derive(Debug)]
pub struct ResultSetRowPacket {
    pub cells: Vec<Option<String>>,
}

impl ResultSetRowPacket {
    pub fn parse(packet: &[u8]) -> RpResult<Self> {
        let mut cursor = Cursor::new(packet);

        let len = cursor.get_ref().len() as u64;
        let mut cells = Vec::new();

        while cursor.position() < len {
            cells.push(read_len_enc_str_allow_null(&mut cursor)?);
        }

        Ok(Self { cells })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        let mut p = vec![2u8];
        p.extend_from_slice(b"42");
        p.push(0xFB);
        p.push(1u8);
        p.push(b'x');
        let row = ResultSetRowPacket::parse(&p).unwrap();
        assert_eq!(
            row.cells,
            vec![Some("42".to_string()), None, Some("x".to_string())]
        );
    }
}
