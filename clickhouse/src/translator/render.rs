use common::schema::descriptor::{ColumnDescriptor, TableDescriptor};

use crate::{TOMBSTONE_COLUMN, VERSION_COLUMN};

/// 整数主键的默认分区因子，控制分区总数
const DEFAULT_PARTITION_DIV: u64 = 4_294_967_296;

/// 单列的目标DDL片段，可空非主键列包Nullable
pub fn column_ddl(column: &ColumnDescriptor, is_primary: bool) -> String {
    let t = if column.nullable && !is_primary {
        format!("Nullable({})", column.target_type)
    } else {
        column.target_type.clone()
    };
    format!("`{}` {}", column.name, t)
}

/// 整数主键默认intDiv分区；其他主键不分区，除非配置覆盖
pub fn default_partition_by(descriptor: &TableDescriptor) -> Option<String> {
    if descriptor.primary_key.len() != 1 {
        return None;
    }
    let pk = descriptor.primary_key[0].clone();
    let idx = descriptor.column_index(&pk)?;
    let source_type = &descriptor.columns[idx].source_type;
    let is_int = ["tinyint", "smallint", "mediumint", "int", "bigint"]
        .iter()
        .any(|p| source_type.starts_with(p))
        && !source_type.starts_with("tinyint(1)");
    if is_int {
        Some(format!("intDiv(`{}`, {})", pk, DEFAULT_PARTITION_DIV))
    } else {
        None
    }
}

/// 渲染镜像表的CREATE TABLE：
/// ReplacingMergeTree(_version, _is_deleted)按主键合并去重
pub fn create_table(target_database: &str, descriptor: &TableDescriptor) -> String {
    let pk_set: Vec<usize> = descriptor.primary_key_indexes();

    let mut parts: Vec<String> = descriptor
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("    {}", column_ddl(c, pk_set.contains(&i))))
        .collect();
    parts.push(format!("    `{}` UInt64", VERSION_COLUMN));
    parts.push(format!("    `{}` UInt8", TOMBSTONE_COLUMN));
    for index in &descriptor.indexes {
        parts.push(format!("    {}", index));
    }

    let order_by = if descriptor.primary_key.is_empty() {
        "tuple()".to_string()
    } else {
        format!(
            "({})",
            descriptor
                .primary_key
                .iter()
                .map(|c| format!("`{}`", c))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS `{}`.`{}`\n(\n{}\n)\nENGINE = ReplacingMergeTree({}, {})\nORDER BY {}",
        target_database,
        descriptor.table,
        parts.join(",\n"),
        VERSION_COLUMN,
        TOMBSTONE_COLUMN,
        order_by
    );

    let partition_by = descriptor
        .partition_by
        .clone()
        .or_else(|| default_partition_by(descriptor));
    if let Some(p) = partition_by {
        sql.push_str(&format!("\nPARTITION BY {}", p));
    }

    sql
}
