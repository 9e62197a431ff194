pub mod ddl;
pub mod render;
pub mod type_map;

pub use ddl::{DdlOutcome, DdlTranslator};
pub use type_map::TypeMapper;

use std::collections::HashMap;

use common::config::Config;

/// translator需要的配置切片，config加载后只读
#[derive(Debug, Clone, Default)]
pub struct TranslatorConfig {
    /// 源类型原文或"table.column" -> 目标类型
    pub types_mapping: HashMap<String, String>,
    /// (databases, tables, partition_by)
    pub partition_bys: Vec<(common::config::Patterns, common::config::Patterns, String)>,
    /// (databases, tables, index DDL片段)
    pub indexes: Vec<(common::config::Patterns, common::config::Patterns, String)>,
    pub source_timezone: String,
}

impl TranslatorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            types_mapping: config.types_mapping.clone(),
            partition_bys: config
                .partition_bys
                .iter()
                .map(|p| (p.databases.clone(), p.tables.clone(), p.partition_by.clone()))
                .collect(),
            indexes: config
                .indexes
                .iter()
                .map(|i| (i.databases.clone(), i.tables.clone(), i.index.clone()))
                .collect(),
            source_timezone: config.source_timezone.clone(),
        }
    }

    pub fn partition_by_for(&self, database: &str, table: &str) -> Option<String> {
        self.partition_bys
            .iter()
            .find(|(dbs, tbls, _)| dbs.matched(database) && tbls.matched(table))
            .map(|(_, _, expr)| expr.clone())
    }

    pub fn indexes_for(&self, database: &str, table: &str) -> Vec<String> {
        self.indexes
            .iter()
            .filter(|(dbs, tbls, _)| dbs.matched(database) && tbls.matched(table))
            .map(|(_, _, idx)| idx.clone())
            .collect()
    }
}
