use serde::{Deserialize, Serialize};

/// 解码后的单列值。整数按有/无符号区分存放，
/// 有符号解释由表描述符在应用侧决定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    Null,

    SignedInt(i64),
    UnsignedInt(u64),

    Float(f32),
    Double(f64),
    /// 定点数以十进制字符串透传，精度不丢失
    Decimal(String),

    String(String),
    Bytes(Vec<u8>),

    Bit(u64),
    /// enum下标（1-based，0为空值）
    Enum(u32),
    /// set位图
    Set(u64),

    Year(u16),
    Date {
        year: u16,
        month: u8,
        day: u8,
    },
    Time {
        negative: bool,
        hours: u32,
        minutes: u8,
        seconds: u8,
        micros: u32,
    },
    /// 源库的naive datetime，时区语义由配置补充
    DateTime {
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        micros: u32,
    },
    /// UTC瞬时
    Timestamp {
        unix_micros: i64,
    },

    /// 已经过collaborator解码的规范JSON文本
    Json(String),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    /// 粗略的内存占用估算，用于flush的字节阈值
    pub fn weight(&self) -> usize {
        match self {
            ColumnValue::String(s) | ColumnValue::Decimal(s) | ColumnValue::Json(s) => {
                s.len() + 8
            }
            ColumnValue::Bytes(b) => b.len() + 8,
            _ => 16,
        }
    }
}
