use serde::{Deserialize, Serialize};

use crate::model::coordinate::Coordinate;
use crate::schema::column_value::ColumnValue;

/// 规范化后的变更事件，spool中的存储单元。
/// 值数组与事件发生时刻的表描述符按位置对应。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub coordinate: Coordinate,

    /// 源库事务id（GTID原始字节），源库未开启时为空
    pub transaction_id: Option<Vec<u8>>,

    pub database: String,
    pub table: String,

    /// 事件头里的unix秒，用于滞后的墙钟口径
    pub timestamp: u32,

    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Insert { rows: Vec<RowImage> },
    Update { rows: Vec<UpdateImage> },
    Delete { rows: Vec<RowImage> },
    Ddl { statement: String },
}

/// 行的后像，列值按描述符顺序排列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowImage(pub Vec<ColumnValue>);

/// UPDATE携带主键前像 + 行后像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateImage {
    /// 主键列的前像
    pub key: Vec<ColumnValue>,
    /// 整行后像
    pub row: Vec<ColumnValue>,
}

impl ChangeEvent {
    pub fn is_ddl(&self) -> bool {
        matches!(self.kind, EventKind::Ddl { .. })
    }

    /// 事件中携带的行数，DDL记0
    pub fn row_count(&self) -> usize {
        match &self.kind {
            EventKind::Insert { rows } => rows.len(),
            EventKind::Update { rows } => rows.len(),
            EventKind::Delete { rows } => rows.len(),
            EventKind::Ddl { .. } => 0,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            EventKind::Insert { .. } => "INSERT",
            EventKind::Update { .. } => "UPDATE",
            EventKind::Delete { .. } => "DELETE",
            EventKind::Ddl { .. } => "DDL",
        }
    }
}
