use chrono::{TimeZone, Utc};
use serde_json::{Map, Number, Value};

use common::schema::column_value::ColumnValue;
use common::schema::descriptor::{ColumnDescriptor, TableDescriptor};

use crate::{TOMBSTONE_COLUMN, VERSION_COLUMN};

/// 一行事件值 -> JSONEachRow对象（带版本列与墓碑列）。
/// 值数组与描述符按位置对位；ALTER瞬间的长度差以Null补齐。
pub fn render_row(
    descriptor: &TableDescriptor,
    values: &[ColumnValue],
    version: u64,
    is_deleted: bool,
) -> Value {
    let mut row = Map::with_capacity(descriptor.columns.len() + 2);
    for (i, column) in descriptor.columns.iter().enumerate() {
        let v = values.get(i).unwrap_or(&ColumnValue::Null);
        row.insert(column.name.clone(), render_value(column, v));
    }
    row.insert(VERSION_COLUMN.to_string(), Value::Number(Number::from(version)));
    row.insert(
        TOMBSTONE_COLUMN.to_string(),
        Value::Number(Number::from(if is_deleted { 1 } else { 0 })),
    );
    Value::Object(row)
}

pub fn render_value(column: &ColumnDescriptor, value: &ColumnValue) -> Value {
    match value {
        ColumnValue::Null => Value::Null,

        ColumnValue::SignedInt(i) => {
            if column.target_type == "Bool" {
                return Value::Bool(*i != 0);
            }
            if column.is_unsigned() {
                Value::Number(Number::from(reinterpret_unsigned(*i, &column.source_type)))
            } else {
                Value::Number(Number::from(*i))
            }
        }
        ColumnValue::UnsignedInt(u) => Value::Number(Number::from(*u)),

        ColumnValue::Float(f) => Number::from_f64(*f as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnValue::Double(d) => Number::from_f64(*d)
            .map(Value::Number)
            .unwrap_or(Value::Null),

        // Decimal以字符串透传，目标侧按列类型解析
        ColumnValue::Decimal(s) => Value::String(s.clone()),

        ColumnValue::String(s) => Value::String(s.clone()),
        ColumnValue::Bytes(b) => {
            if column.source_type.starts_with("geometry")
                || column.source_type.starts_with("point")
                || column.source_type.starts_with("linestring")
                || column.source_type.starts_with("polygon")
                || column.source_type.starts_with("multi")
                || column.source_type.starts_with("geomcollection")
            {
                Value::String(hex::encode(b))
            } else {
                Value::String(String::from_utf8_lossy(b).to_string())
            }
        }

        ColumnValue::Bit(b) => Value::Number(Number::from(*b)),

        ColumnValue::Enum(idx) => {
            let labels = enum_labels(&column.source_type);
            let label = if *idx == 0 {
                String::new()
            } else {
                labels
                    .get(*idx as usize - 1)
                    .cloned()
                    .unwrap_or_default()
            };
            // enum统一小写文本
            Value::String(label.to_lowercase())
        }

        ColumnValue::Set(bits) => {
            let labels = enum_labels(&column.source_type);
            let picked: Vec<String> = labels
                .iter()
                .enumerate()
                .filter(|(i, _)| bits & (1 << i) != 0)
                .map(|(_, l)| l.to_lowercase())
                .collect();
            Value::String(picked.join(","))
        }

        ColumnValue::Year(y) => Value::Number(Number::from(*y)),

        ColumnValue::Date { year, month, day } => {
            if *year == 0 || *month == 0 || *day == 0 {
                Value::String("1970-01-01".to_string())
            } else {
                Value::String(format!("{:04}-{:02}-{:02}", year, month, day))
            }
        }

        ColumnValue::Time {
            negative,
            hours,
            minutes,
            seconds,
            micros,
        } => {
            let sign = if *negative { "-" } else { "" };
            if *micros > 0 {
                Value::String(format!(
                    "{}{:02}:{:02}:{:02}.{:06}",
                    sign, hours, minutes, seconds, micros
                ))
            } else {
                Value::String(format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds))
            }
        }

        ColumnValue::DateTime {
            year,
            month,
            day,
            hour,
            minute,
            second,
            micros,
        } => {
            if *year == 0 || *month == 0 || *day == 0 {
                return Value::String("1970-01-01 00:00:00".to_string());
            }
            let base = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            if *micros > 0 {
                Value::String(format!("{}.{:06}", base, micros))
            } else {
                Value::String(base)
            }
        }

        ColumnValue::Timestamp { unix_micros } => {
            let secs = unix_micros.div_euclid(1_000_000);
            let micros = unix_micros.rem_euclid(1_000_000) as u32;
            match Utc.timestamp_opt(secs, micros * 1000).single() {
                Some(dt) => {
                    if micros > 0 {
                        Value::String(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
                    } else {
                        Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    }
                }
                None => Value::Null,
            }
        }

        ColumnValue::Json(s) => Value::String(s.clone()),
    }
}

/// 有符号解码值按描述符宽度还原为无符号
fn reinterpret_unsigned(i: i64, source_type: &str) -> u64 {
    if source_type.starts_with("tinyint") {
        (i as u8) as u64
    } else if source_type.starts_with("smallint") {
        (i as u16) as u64
    } else if source_type.starts_with("mediumint") {
        (i as u32 & 0x00FF_FFFF) as u64
    } else if source_type.starts_with("bigint") {
        i as u64
    } else {
        (i as u32) as u64
    }
}

/// "enum('a','b','it''s')" -> 标签列表（引号感知）
fn enum_labels(source_type: &str) -> Vec<String> {
    let Some(start) = source_type.find('(') else {
        return vec![];
    };
    let Some(end) = source_type.rfind(')') else {
        return vec![];
    };
    let body = &source_type[start + 1..end];

    let mut labels = vec![];
    let mut current = String::new();
    let mut in_quote = false;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if in_quote => {
                if chars.peek() == Some(&'\'') {
                    // 两个单引号是转义
                    current.push('\'');
                    chars.next();
                } else {
                    in_quote = false;
                    labels.push(current.clone());
                    current.clear();
                }
            }
            '\'' => in_quote = true,
            _ if in_quote => current.push(c),
            _ => {}
        }
    }
    labels
}

#[cfg(test)]
mod test {
    use super::*;

    fn column(source_type: &str, target_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: "c".to_string(),
            source_type: source_type.to_string(),
            target_type: target_type.to_string(),
            nullable: true,
        }
    }

    #[test]
    fn test_unsigned_reinterpret() {
        // int unsigned的0xFFFFFFFF在wire上解码为-1
        let c = column("int(10) unsigned", "UInt32");
        assert_eq!(
            render_value(&c, &ColumnValue::SignedInt(-1)),
            Value::Number(Number::from(4_294_967_295u64))
        );
        let c = column("tinyint(3) unsigned", "UInt8");
        assert_eq!(
            render_value(&c, &ColumnValue::SignedInt(-1)),
            Value::Number(Number::from(255u64))
        );
    }

    #[test]
    fn test_bool() {
        let c = column("tinyint(1)", "Bool");
        assert_eq!(render_value(&c, &ColumnValue::SignedInt(1)), Value::Bool(true));
        assert_eq!(render_value(&c, &ColumnValue::SignedInt(0)), Value::Bool(false));
    }

    #[test]
    fn test_enum_lowercase() {
        let c = column("enum('Red','GREEN','blue')", "String");
        assert_eq!(
            render_value(&c, &ColumnValue::Enum(2)),
            Value::String("green".to_string())
        );
        assert_eq!(
            render_value(&c, &ColumnValue::Enum(0)),
            Value::String("".to_string())
        );
    }

    #[test]
    fn test_set() {
        let c = column("set('a','b','c')", "String");
        assert_eq!(
            render_value(&c, &ColumnValue::Set(0b101)),
            Value::String("a,c".to_string())
        );
    }

    #[test]
    fn test_temporal_strings() {
        let c = column("date", "Date32");
        assert_eq!(
            render_value(
                &c,
                &ColumnValue::Date {
                    year: 2024,
                    month: 3,
                    day: 5
                }
            ),
            Value::String("2024-03-05".to_string())
        );
        // 零值日期回落epoch
        assert_eq!(
            render_value(
                &c,
                &ColumnValue::Date {
                    year: 0,
                    month: 0,
                    day: 0
                }
            ),
            Value::String("1970-01-01".to_string())
        );

        let c = column("timestamp(6)", "DateTime64(6, 'UTC')");
        assert_eq!(
            render_value(
                &c,
                &ColumnValue::Timestamp {
                    unix_micros: 1_700_000_000_500_000
                }
            ),
            Value::String("2023-11-14 22:13:20.500000".to_string())
        );
    }

    #[test]
    fn test_render_row() {
        let descriptor = TableDescriptor {
            database: "d".to_string(),
            table: "t".to_string(),
            columns: vec![
                column("int(11)", "Int32"),
                ColumnDescriptor {
                    name: "name".to_string(),
                    source_type: "varchar(50)".to_string(),
                    target_type: "String".to_string(),
                    nullable: true,
                },
            ],
            primary_key: vec!["c".to_string()],
            partition_by: None,
            indexes: vec![],
        };
        let row = render_row(
            &descriptor,
            &[
                ColumnValue::SignedInt(1),
                ColumnValue::String("a".to_string()),
            ],
            7,
            false,
        );
        assert_eq!(row["c"], Value::Number(Number::from(1)));
        assert_eq!(row["name"], Value::String("a".to_string()));
        assert_eq!(row["_version"], Value::Number(Number::from(7)));
        assert_eq!(row["_is_deleted"], Value::Number(Number::from(0)));
    }

    #[test]
    fn test_row_shorter_than_descriptor() {
        let mut second = column("int(11)", "Int32");
        second.name = "d".to_string();
        let descriptor = TableDescriptor {
            database: "d".to_string(),
            table: "t".to_string(),
            columns: vec![column("int(11)", "Int32"), second],
            primary_key: vec![],
            partition_by: None,
            indexes: vec![],
        };
        // ALTER瞬间值数组可能比描述符短，缺位补Null
        let row = render_row(&descriptor, &[ColumnValue::SignedInt(1)], 1, false);
        assert_eq!(row["c"], Value::Number(Number::from(1)));
        assert_eq!(row["d"], Value::Null);
    }
}
