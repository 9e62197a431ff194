//! 类型链路：binlog解码值 -> 目标行的语义保持（S5与不变量7）

use binlog::column::json_binary;
use clickhouse::translator::{DdlTranslator, TranslatorConfig};
use clickhouse::value_format::{render_row, render_value};
use common::schema::column_value::ColumnValue;
use common::schema::descriptor::DescriptorMap;
use serde_json::Value;

/// S5：JSON列走collaborator解码成规范文本后按String落地
#[test]
fn test_json_column_canonical_text() {
    // {"a": [1, 2], "b": "x"} 的二进制编码
    let mut doc = vec![0x00u8];
    doc.extend_from_slice(&[
        0x02, 0x00, 0x20, 0x00, 0x12, 0x00, 0x01, 0x00, 0x13, 0x00, 0x01, 0x00, 0x02, 0x14,
        0x00, 0x0C, 0x1E, 0x00, b'a', b'b', 0x02, 0x00, 0x0A, 0x00, 0x05, 0x01, 0x00, 0x05,
        0x02, 0x00, 0x01, b'x',
    ]);
    let text = json_binary::decode(&doc);
    assert_eq!(text, "{\"a\": [1, 2], \"b\": \"x\"}");

    let translator = DdlTranslator::new(TranslatorConfig::default());
    let mut m = DescriptorMap::new();
    translator
        .translate(
            "CREATE TABLE j (id INT PRIMARY KEY, doc JSON)",
            "d",
            "d",
            &mut m,
        )
        .unwrap();
    let descriptor = m.get("d", "j").unwrap();
    assert_eq!(descriptor.columns[1].target_type, "String");

    let row = render_row(
        descriptor,
        &[ColumnValue::SignedInt(1), ColumnValue::Json(text.clone())],
        1,
        false,
    );
    assert_eq!(row["doc"], Value::String(text));
}

/// 不变量7：受支持类型在翻译与取值两端保持语义
#[test]
fn test_type_semantics_roundtrip() {
    let translator = DdlTranslator::new(TranslatorConfig::default());
    let mut m = DescriptorMap::new();
    translator
        .translate(
            "CREATE TABLE all_types (\
                id BIGINT UNSIGNED NOT NULL PRIMARY KEY, \
                price DECIMAL(12,4) NOT NULL, \
                ratio DOUBLE, \
                body LONGTEXT, \
                born DATE, \
                seen TIMESTAMP(6), \
                mood ENUM('Happy','Sad'))",
            "d",
            "d",
            &mut m,
        )
        .unwrap();
    let d = m.get("d", "all_types").unwrap();

    let types: Vec<&str> = d.columns.iter().map(|c| c.target_type.as_str()).collect();
    assert_eq!(
        types,
        vec![
            "UInt64",
            "Decimal(12, 4)",
            "Float64",
            "String",
            "Date32",
            "DateTime64(6, 'UTC')",
            "String"
        ]
    );

    // 无符号大整数不回绕
    assert_eq!(
        render_value(&d.columns[0], &ColumnValue::SignedInt(-1)),
        Value::Number(serde_json::Number::from(u64::MAX))
    );
    // 定点数字符串精度原样
    assert_eq!(
        render_value(&d.columns[1], &ColumnValue::Decimal("12345678.9999".to_string())),
        Value::String("12345678.9999".to_string())
    );
    // 文本身份
    assert_eq!(
        render_value(&d.columns[3], &ColumnValue::String("héllo".to_string())),
        Value::String("héllo".to_string())
    );
    // 带时区timestamp按UTC瞬时落地
    assert_eq!(
        render_value(
            &d.columns[5],
            &ColumnValue::Timestamp {
                unix_micros: 1_700_000_000_000_000
            }
        ),
        Value::String("2023-11-14 22:13:20".to_string())
    );
    // enum小写文本
    assert_eq!(
        render_value(&d.columns[6], &ColumnValue::Enum(1)),
        Value::String("happy".to_string())
    );
}

/// 覆盖优先级（配置 > 内置），与spec的translator属性一致
#[test]
fn test_override_precedence_end_to_end() {
    let mut config = TranslatorConfig::default();
    config
        .types_mapping
        .insert("char(36)".to_string(), "UUID".to_string());
    config
        .types_mapping
        .insert("tokens.token".to_string(), "String".to_string());

    let translator = DdlTranslator::new(config);
    let mut m = DescriptorMap::new();
    translator
        .translate(
            "CREATE TABLE tokens (id INT PRIMARY KEY, token CHAR(36), owner CHAR(36))",
            "d",
            "d",
            &mut m,
        )
        .unwrap();
    let d = m.get("d", "tokens").unwrap();

    // 列级覆盖 > 类型覆盖 > 内置
    assert_eq!(d.columns[1].target_type, "String");
    assert_eq!(d.columns[2].target_type, "UUID");
}
