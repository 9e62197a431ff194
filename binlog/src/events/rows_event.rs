use std::io::{Cursor, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use common::err::RpResult;
use common::schema::column_value::ColumnValue;

use crate::b_type::LogEventType;
use crate::column::value_decoder::ValueDecoder;
use crate::events::table_map_event::TableMapEvent;
use crate::utils::{read_bytes, read_len_enc_num, read_u48};

/// WRITE/DELETE行事件：每行一个完整列值数组，
/// 缺席列与NULL列都以Null占位，保持与描述符对位
#[derive(Debug)]
pub struct RowsEvent {
    pub table_id: u64,
    pub database: String,
    pub table: String,
    pub rows: Vec<Vec<ColumnValue>>,
}

/// UPDATE行事件：前像 + 后像
#[derive(Debug)]
pub struct UpdateRowsEvent {
    pub table_id: u64,
    pub database: String,
    pub table: String,
    pub rows: Vec<(Vec<ColumnValue>, Vec<ColumnValue>)>,
}

struct RowsHeader {
    table_id: u64,
    column_count: usize,
    present1: Vec<u8>,
    present2: Vec<u8>,
}

fn parse_header(
    cursor: &mut Cursor<&[u8]>,
    event_type: LogEventType,
    with_second_bitmap: bool,
) -> RpResult<RowsHeader> {
    let table_id = read_u48(cursor)?;
    let _flags = cursor.read_u16::<LittleEndian>()?;

    if event_type.is_rows_v2() {
        let extra_len = cursor.read_u16::<LittleEndian>()? as i64;
        cursor.seek(SeekFrom::Current(extra_len - 2))?;
    }

    let column_count = read_len_enc_num(cursor)? as usize;
    let bitmap_len = (column_count + 7) / 8;
    let present1 = read_bytes(cursor, bitmap_len)?;
    let present2 = if with_second_bitmap {
        read_bytes(cursor, bitmap_len)?
    } else {
        vec![]
    };

    Ok(RowsHeader {
        table_id,
        column_count,
        present1,
        present2,
    })
}

fn bit(bitmap: &[u8], i: usize) -> bool {
    bitmap[i / 8] & (1 << (i % 8)) != 0
}

/// 读一行：null位图只覆盖present列
fn parse_row(
    cursor: &mut Cursor<&[u8]>,
    table_map: &TableMapEvent,
    present: &[u8],
    column_count: usize,
    decoder: &ValueDecoder,
) -> RpResult<Vec<ColumnValue>> {
    let present_count = (0..column_count).filter(|&i| bit(present, i)).count();
    let null_bitmap = read_bytes(cursor, (present_count + 7) / 8)?;

    let mut row = Vec::with_capacity(column_count);
    let mut present_idx = 0usize;
    for i in 0..column_count {
        if !bit(present, i) {
            row.push(ColumnValue::Null);
            continue;
        }
        let is_null = bit(&null_bitmap, present_idx);
        present_idx += 1;
        if is_null {
            row.push(ColumnValue::Null);
        } else {
            row.push(decoder.decode(cursor, &table_map.column_metas[i])?);
        }
    }
    Ok(row)
}

impl RowsEvent {
    pub fn parse(
        body: &[u8],
        event_type: LogEventType,
        table_map: &TableMapEvent,
        decoder: &ValueDecoder,
    ) -> RpResult<Self> {
        let mut cursor = Cursor::new(body);
        let header = parse_header(&mut cursor, event_type, false)?;
        let len = body.len() as u64;

        let mut rows = vec![];
        while cursor.position() < len {
            rows.push(parse_row(
                &mut cursor,
                table_map,
                &header.present1,
                header.column_count,
                decoder,
            )?);
        }

        Ok(Self {
            table_id: header.table_id,
            database: table_map.database.clone(),
            table: table_map.table.clone(),
            rows,
        })
    }
}

impl UpdateRowsEvent {
    pub fn parse(
        body: &[u8],
        event_type: LogEventType,
        table_map: &TableMapEvent,
        decoder: &ValueDecoder,
    ) -> RpResult<Self> {
        let mut cursor = Cursor::new(body);
        let header = parse_header(&mut cursor, event_type, true)?;
        let len = body.len() as u64;

        let mut rows = vec![];
        while cursor.position() < len {
            let before = parse_row(
                &mut cursor,
                table_map,
                &header.present1,
                header.column_count,
                decoder,
            )?;
            let after = parse_row(
                &mut cursor,
                table_map,
                &header.present2,
                header.column_count,
                decoder,
            )?;
            rows.push((before, after));
        }

        Ok(Self {
            table_id: header.table_id,
            database: table_map.database.clone(),
            table: table_map.table.clone(),
            rows,
        })
    }
}

#[cfg(test)]
mod test {
    use crate::events::table_map_event::test::sample_body;

    use super::*;

    fn table_map() -> TableMapEvent {
        TableMapEvent::parse(&sample_body(100)).unwrap()
    }

    fn rows_v2_prefix(table_id: u64, bitmaps: &[&[u8]]) -> Vec<u8> {
        let mut body = vec![];
        body.extend_from_slice(&table_id.to_le_bytes()[..6]);
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&2u16.to_le_bytes()); // extra len（只有自身）
        body.push(2); // column count
        for b in bitmaps {
            body.extend_from_slice(b);
        }
        body
    }

    #[test]
    fn test_write_rows() {
        let mut body = rows_v2_prefix(100, &[&[0b11]]);
        // 行1: (1, "abc")
        body.push(0b00); // null bitmap
        body.extend_from_slice(&1i32.to_le_bytes());
        body.push(3);
        body.extend_from_slice(b"abc");
        // 行2: (2, NULL)
        body.push(0b10);
        body.extend_from_slice(&2i32.to_le_bytes());

        let e = RowsEvent::parse(
            &body,
            LogEventType::WriteRows,
            &table_map(),
            &ValueDecoder::new(),
        )
        .unwrap();
        assert_eq!(e.database, "shop");
        assert_eq!(e.table, "users");
        assert_eq!(e.rows.len(), 2);
        assert_eq!(
            e.rows[0],
            vec![
                ColumnValue::SignedInt(1),
                ColumnValue::String("abc".to_string())
            ]
        );
        assert_eq!(
            e.rows[1],
            vec![ColumnValue::SignedInt(2), ColumnValue::Null]
        );
    }

    #[test]
    fn test_update_rows() {
        let mut body = rows_v2_prefix(100, &[&[0b11], &[0b11]]);
        // before: (1, "a")，after: (1, "b")
        body.push(0b00);
        body.extend_from_slice(&1i32.to_le_bytes());
        body.push(1);
        body.extend_from_slice(b"a");
        body.push(0b00);
        body.extend_from_slice(&1i32.to_le_bytes());
        body.push(1);
        body.extend_from_slice(b"b");

        let e = UpdateRowsEvent::parse(
            &body,
            LogEventType::UpdateRows,
            &table_map(),
            &ValueDecoder::new(),
        )
        .unwrap();
        assert_eq!(e.rows.len(), 1);
        assert_eq!(e.rows[0].0[1], ColumnValue::String("a".to_string()));
        assert_eq!(e.rows[0].1[1], ColumnValue::String("b".to_string()));
    }

    #[test]
    fn test_v1_without_extra() {
        let mut body = vec![];
        body.extend_from_slice(&100u64.to_le_bytes()[..6]);
        body.extend_from_slice(&1u16.to_le_bytes());
        body.push(2);
        body.push(0b11);
        body.push(0b00);
        body.extend_from_slice(&7i32.to_le_bytes());
        body.push(2);
        body.extend_from_slice(b"xy");

        let e = RowsEvent::parse(
            &body,
            LogEventType::WriteRowsV1,
            &table_map(),
            &ValueDecoder::new(),
        )
        .unwrap();
        assert_eq!(e.rows.len(), 1);
        assert_eq!(e.rows[0][0], ColumnValue::SignedInt(7));
    }
}
