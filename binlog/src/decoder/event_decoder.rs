use std::collections::HashMap;
use std::io::Cursor;

use tracing::debug;

use common::err::{RpError, RpResult};

use crate::b_type::LogEventType;
use crate::column::value_decoder::{JsonDecodeFn, ValueDecoder};
use crate::events::event_header::EventHeader;
use crate::events::format_description_event::FormatDescriptionEvent;
use crate::events::gtid_event::GtidEvent;
use crate::events::query_event::QueryEvent;
use crate::events::rotate_event::RotateEvent;
use crate::events::rows_event::{RowsEvent, UpdateRowsEvent};
use crate::events::table_map_event::TableMapEvent;
use crate::events::xid_event::XidEvent;
use crate::events::BinlogEvent;
use crate::utils::read_u48;
use crate::EVENT_HEADER_SIZE;

/// 原始事件体 -> 结构化事件。
/// 持有table_id -> TABLE_MAP的会话内映射，供行事件解码。
pub struct EventDecoder {
    table_maps: HashMap<u64, TableMapEvent>,
    value_decoder: ValueDecoder,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self {
            table_maps: HashMap::new(),
            value_decoder: ValueDecoder::new(),
        }
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注入自定义JSON collaborator
    pub fn with_json_decoder(json_decode: JsonDecodeFn) -> Self {
        Self {
            table_maps: HashMap::new(),
            value_decoder: ValueDecoder::with_json_decoder(json_decode),
        }
    }

    pub fn decode(&mut self, raw: &[u8]) -> RpResult<(EventHeader, BinlogEvent)> {
        let header = EventHeader::parse(raw)?;
        let body = &raw[EVENT_HEADER_SIZE..];

        let event = match header.event_type {
            LogEventType::FormatDescription => {
                BinlogEvent::FormatDescription(FormatDescriptionEvent::parse(body)?)
            }
            LogEventType::Rotate => BinlogEvent::Rotate(RotateEvent::parse(body)?),

            LogEventType::TableMap => {
                let map = TableMapEvent::parse(body)?;
                self.table_maps.insert(map.table_id, map.clone());
                BinlogEvent::TableMap(map)
            }

            LogEventType::WriteRows | LogEventType::WriteRowsV1 => {
                let map = self.table_map_for(body)?;
                BinlogEvent::WriteRows(RowsEvent::parse(
                    body,
                    header.event_type,
                    &map,
                    &self.value_decoder,
                )?)
            }
            LogEventType::DeleteRows | LogEventType::DeleteRowsV1 => {
                let map = self.table_map_for(body)?;
                BinlogEvent::DeleteRows(RowsEvent::parse(
                    body,
                    header.event_type,
                    &map,
                    &self.value_decoder,
                )?)
            }
            LogEventType::UpdateRows | LogEventType::UpdateRowsV1 => {
                let map = self.table_map_for(body)?;
                BinlogEvent::UpdateRows(UpdateRowsEvent::parse(
                    body,
                    header.event_type,
                    &map,
                    &self.value_decoder,
                )?)
            }

            LogEventType::Query => BinlogEvent::Query(QueryEvent::parse(body)?),
            LogEventType::Gtid => BinlogEvent::Gtid(GtidEvent::parse(body)?),
            LogEventType::MariaGtid => {
                BinlogEvent::Gtid(GtidEvent::parse_maria(body, header.server_id)?)
            }
            LogEventType::Xid => BinlogEvent::Xid(XidEvent::parse(body)?),

            other => {
                debug!("ignore event type {:?}", other);
                BinlogEvent::Ignored(other)
            }
        };

        Ok((header, event))
    }

    fn table_map_for(&self, body: &[u8]) -> RpResult<TableMapEvent> {
        let table_id = read_u48(&mut Cursor::new(body))?;
        self.table_maps
            .get(&table_id)
            .cloned()
            .ok_or_else(|| RpError::DecodeErr(format!("no TABLE_MAP for table id {}", table_id)))
    }
}
