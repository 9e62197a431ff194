use crate::config::{Config, Patterns};

/// 库表过滤谓词。include为空时全量放行，exclude优先。
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    databases: Patterns,
    tables: Patterns,
    exclude_databases: Patterns,
    exclude_tables: Patterns,
}

impl NameFilter {
    pub fn new(
        databases: Patterns,
        tables: Patterns,
        exclude_databases: Patterns,
        exclude_tables: Patterns,
    ) -> Self {
        NameFilter {
            databases,
            tables,
            exclude_databases,
            exclude_tables,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        NameFilter::new(
            config.databases.clone(),
            config.tables.clone(),
            config.exclude_databases.clone(),
            config.exclude_tables.clone(),
        )
    }

    pub fn database_matched(&self, database: &str) -> bool {
        if self.exclude_databases.matched_nonempty(database) {
            return false;
        }
        self.databases.matched(database)
    }

    pub fn table_matched(&self, database: &str, table: &str) -> bool {
        if !self.database_matched(database) {
            return false;
        }
        if self.exclude_tables.matched_nonempty(table) {
            return false;
        }
        self.tables.matched(table)
    }

    /// 配置中明确列出的库名（非glob）
    pub fn literal_databases(&self) -> Vec<String> {
        self.databases.literal_names()
    }
}
