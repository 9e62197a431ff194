use std::fmt;

use serde::{Deserialize, Serialize};

use crate::err::{RpError, RpResult};

/// 源binlog中的位点：(文件序号, 文件内偏移)。
/// 全系统的"位置"定义，全序。
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Coordinate {
    /// binlog文件的单调序号，如 mysql-bin.000005 -> 5
    pub file_index: u64,

    /// 文件内偏移
    pub offset: u64,
}

impl Coordinate {
    pub fn new(file_index: u64, offset: u64) -> Self {
        Coordinate { file_index, offset }
    }

    /// 从binlog文件名解析序号, 如 mysql-bin.000005
    pub fn from_file_name(file_name: &str, offset: u64) -> RpResult<Self> {
        let idx = file_name
            .rsplit('.')
            .next()
            .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            .ok_or_else(|| {
                RpError::ProtocolErr(format!("bad binlog file name: {}", file_name))
            })?;
        Ok(Coordinate {
            file_index: idx.parse::<u64>()?,
            offset,
        })
    }

    /// 初始位点（尚无checkpoint）
    pub fn is_zero(&self) -> bool {
        self.file_index == 0 && self.offset == 0
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_index, self.offset)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_order() {
        let a = Coordinate::new(4, 1024);
        let b = Coordinate::new(5, 4);
        let c = Coordinate::new(5, 900);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_from_file_name() {
        let c = Coordinate::from_file_name("mysql-bin.000005", 4).unwrap();
        assert_eq!(c.file_index, 5);
        assert_eq!(c.offset, 4);
        assert!(Coordinate::from_file_name("garbage", 0).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Coordinate::new(7, 120).to_string(), "7:120");
    }
}
