use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// 源库列类型的wire编码（TABLE_MAP事件中的type byte）
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(u8)]
pub enum SrcColumnType {
    Decimal = 0,
    Tiny = 1,
    Short = 2,
    Long = 3,
    Float = 4,
    Double = 5,
    Null = 6,
    Timestamp = 7,
    LongLong = 8,
    Int24 = 9,
    Date = 10,
    Time = 11,
    DateTime = 12,
    Year = 13,
    NewDate = 14,
    VarChar = 15,
    Bit = 16,
    Timestamp2 = 17,
    DateTime2 = 18,
    Time2 = 19,
    /// MySQL 8.0.18+ 的不可见列占位，按unknown处理
    TypedArray = 20,
    Json = 245,
    NewDecimal = 246,
    Enum = 247,
    Set = 248,
    TinyBlob = 249,
    MediumBlob = 250,
    LongBlob = 251,
    Blob = 252,
    VarString = 253,
    String = 254,
    Geometry = 255,
}

impl SrcColumnType {
    /// TABLE_MAP中该类型的metadata字节数
    pub fn metadata_len(&self) -> usize {
        match self {
            SrcColumnType::Float
            | SrcColumnType::Double
            | SrcColumnType::Blob
            | SrcColumnType::TinyBlob
            | SrcColumnType::MediumBlob
            | SrcColumnType::LongBlob
            | SrcColumnType::Json
            | SrcColumnType::Geometry
            | SrcColumnType::Time2
            | SrcColumnType::DateTime2
            | SrcColumnType::Timestamp2 => 1,
            SrcColumnType::Bit
            | SrcColumnType::VarChar
            | SrcColumnType::VarString
            | SrcColumnType::NewDecimal
            | SrcColumnType::String
            | SrcColumnType::Enum
            | SrcColumnType::Set => 2,
            _ => 0,
        }
    }
}
