use std::str::FromStr;

use tracing::warn;

use crate::translator::TranslatorConfig;

/// 源类型到目标类型的映射。
/// 覆盖优先级：表内列 > 源类型原文 > 内置表；未知类型回落String。
#[derive(Debug, Clone)]
pub struct TypeMapper {
    config: TranslatorConfig,
    /// 校验通过的时区名（非UTC时datetime列带上）
    timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappedType {
    pub target_type: String,
    /// 内置表没命中，按回落处理（上游warn）
    pub fallback: bool,
}

impl TypeMapper {
    pub fn new(config: TranslatorConfig) -> Self {
        let timezone = match config.source_timezone.as_str() {
            "" | "UTC" => None,
            tz => match chrono_tz::Tz::from_str(tz) {
                Ok(_) => Some(tz.to_string()),
                Err(_) => {
                    warn!("unknown source_timezone {:?}, fallback to UTC", tz);
                    None
                }
            },
        };
        Self { config, timezone }
    }

    /// table.column形式的列级覆盖优先，其次源类型覆盖，最后内置表
    pub fn map(&self, table: &str, column: &str, source_type: &str) -> MappedType {
        let normalized = source_type.trim().to_lowercase();

        if let Some(t) = self.config.types_mapping.get(&format!("{}.{}", table, column)) {
            return MappedType {
                target_type: t.clone(),
                fallback: false,
            };
        }
        if let Some(t) = self.config.types_mapping.get(&normalized) {
            return MappedType {
                target_type: t.clone(),
                fallback: false,
            };
        }

        self.builtin(&normalized)
    }

    fn builtin(&self, t: &str) -> MappedType {
        let unsigned = t.contains("unsigned");

        let mapped: Option<String> = if t.starts_with("tinyint(1)") || t == "bool" || t == "boolean"
        {
            Some("Bool".to_string())
        } else if t.starts_with("tinyint") {
            Some(if unsigned { "UInt8" } else { "Int8" }.to_string())
        } else if t.starts_with("smallint") {
            Some(if unsigned { "UInt16" } else { "Int16" }.to_string())
        } else if t.starts_with("mediumint") {
            Some(if unsigned { "UInt32" } else { "Int32" }.to_string())
        } else if t.starts_with("bigint") {
            Some(if unsigned { "UInt64" } else { "Int64" }.to_string())
        } else if t.starts_with("int") || t.starts_with("integer") {
            Some(if unsigned { "UInt32" } else { "Int32" }.to_string())
        } else if t.starts_with("decimal") || t.starts_with("numeric") {
            let (p, s) = parse_precision_scale(t).unwrap_or((10, 0));
            Some(format!("Decimal({}, {})", p, s))
        } else if t.starts_with("float") {
            Some("Float32".to_string())
        } else if t.starts_with("double") || t.starts_with("real") {
            Some("Float64".to_string())
        } else if t.starts_with("bit") {
            Some("UInt64".to_string())
        } else if t.starts_with("datetime") {
            let fsp = parse_fsp(t);
            Some(match &self.timezone {
                Some(tz) => format!("DateTime64({}, '{}')", fsp, tz),
                None => format!("DateTime64({})", fsp),
            })
        } else if t.starts_with("timestamp") {
            // timestamp是UTC瞬时
            Some(format!("DateTime64({}, 'UTC')", parse_fsp(t)))
        } else if t.starts_with("date") {
            Some("Date32".to_string())
        } else if t.starts_with("year") {
            Some("UInt16".to_string())
        } else if t.starts_with("time") {
            // 时分秒区间值，目标侧没有对应类型
            Some("String".to_string())
        } else if t.starts_with("char")
            || t.starts_with("varchar")
            || t.ends_with("text")
            || t.starts_with("binary")
            || t.starts_with("varbinary")
            || t.ends_with("blob")
        {
            Some("String".to_string())
        } else if t.starts_with("enum") || t.starts_with("set") {
            // enum按小写文本落地
            Some("String".to_string())
        } else if t == "json" {
            // 文本落地，读取侧约定parse-on-read
            Some("String".to_string())
        } else if t.starts_with("geometry")
            || t.starts_with("point")
            || t.starts_with("linestring")
            || t.starts_with("polygon")
            || t.starts_with("multipoint")
            || t.starts_with("multilinestring")
            || t.starts_with("multipolygon")
            || t.starts_with("geomcollection")
        {
            Some("String".to_string())
        } else {
            None
        };

        match mapped {
            Some(target_type) => MappedType {
                target_type,
                fallback: false,
            },
            None => MappedType {
                target_type: "String".to_string(),
                fallback: true,
            },
        }
    }
}

/// "decimal(10,2)" -> (10, 2)
fn parse_precision_scale(t: &str) -> Option<(u32, u32)> {
    let args = t.split('(').nth(1)?.split(')').next()?;
    let mut parts = args.split(',').map(|s| s.trim());
    let p = parts.next()?.parse().ok()?;
    let s = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    Some((p, s))
}

/// "datetime(3)" -> 3, 无参数时0
fn parse_fsp(t: &str) -> u32 {
    t.split('(')
        .nth(1)
        .and_then(|s| s.split(')').next())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}
