pub mod event_header;
pub mod format_description_event;
pub mod gtid_event;
pub mod query_event;
pub mod rotate_event;
pub mod rows_event;
pub mod table_map_event;
pub mod xid_event;

use crate::b_type::LogEventType;

/// 解码后的单个binlog事件
#[derive(Debug)]
pub enum BinlogEvent {
    FormatDescription(format_description_event::FormatDescriptionEvent),
    Rotate(rotate_event::RotateEvent),
    TableMap(table_map_event::TableMapEvent),
    WriteRows(rows_event::RowsEvent),
    UpdateRows(rows_event::UpdateRowsEvent),
    DeleteRows(rows_event::RowsEvent),
    Query(query_event::QueryEvent),
    Gtid(gtid_event::GtidEvent),
    Xid(xid_event::XidEvent),
    /// 已识别但与复制无关的事件
    Ignored(LogEventType),
}
