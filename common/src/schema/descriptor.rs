use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 一张源表的镜像schema。
/// CREATE时建立，ALTER时变更，DROP时销毁；
/// 行事件的值数组按本描述符的列顺序对位。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub database: String,
    pub table: String,

    /// 列定义，顺序即事件值数组的顺序
    pub columns: Vec<ColumnDescriptor>,

    /// 主键列名，按定义顺序
    pub primary_key: Vec<String>,

    /// 分区表达式（目标端），None为不分区
    pub partition_by: Option<String>,

    /// 建表时附加的二级索引DDL片段
    pub indexes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,

    /// 源类型原文（小写），如 "int(11) unsigned"
    pub source_type: String,

    /// 翻译后的目标类型，如 "Int32"
    pub target_type: String,

    pub nullable: bool,
}

impl ColumnDescriptor {
    pub fn is_unsigned(&self) -> bool {
        self.source_type.contains("unsigned")
    }
}

impl TableDescriptor {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// 主键列在列数组中的下标
    pub fn primary_key_indexes(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|pk| self.column_index(pk))
            .collect()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }
}

/// 进程内的schema镜像：(库, 表) -> 描述符的扁平映射。
/// 描述符之间只按下标引用列，互不指涉。
#[derive(Debug, Clone, Default)]
pub struct DescriptorMap {
    inner: HashMap<(String, String), TableDescriptor>,
}

impl DescriptorMap {
    pub fn new() -> Self {
        DescriptorMap::default()
    }

    pub fn get(&self, database: &str, table: &str) -> Option<&TableDescriptor> {
        self.inner.get(&(database.to_string(), table.to_string()))
    }

    pub fn insert(&mut self, descriptor: TableDescriptor) {
        self.inner.insert(
            (descriptor.database.clone(), descriptor.table.clone()),
            descriptor,
        );
    }

    pub fn remove(&mut self, database: &str, table: &str) -> Option<TableDescriptor> {
        self.inner.remove(&(database.to_string(), table.to_string()))
    }

    /// 表重命名：插入新key、删除旧key，一次状态变迁完成
    pub fn rename(&mut self, database: &str, old_table: &str, new_table: &str) -> bool {
        match self.remove(database, old_table) {
            Some(mut d) => {
                d.table = new_table.to_string();
                self.insert(d);
                true
            }
            None => false,
        }
    }

    pub fn tables_of(&self, database: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .keys()
            .filter(|(db, _)| db == database)
            .map(|(_, t)| t.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// 持久化用的全量导出，按(库,表)排序保证稳定
    pub fn all(&self) -> Vec<TableDescriptor> {
        let mut v: Vec<TableDescriptor> = self.inner.values().cloned().collect();
        v.sort_by(|a, b| (&a.database, &a.table).cmp(&(&b.database, &b.table)));
        v
    }

    pub fn from_vec(descriptors: Vec<TableDescriptor>) -> Self {
        let mut m = DescriptorMap::new();
        for d in descriptors {
            m.insert(d);
        }
        m
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn users() -> TableDescriptor {
        TableDescriptor {
            database: "shop".to_string(),
            table: "users".to_string(),
            columns: vec![
                ColumnDescriptor {
                    name: "id".to_string(),
                    source_type: "int(11) unsigned".to_string(),
                    target_type: "UInt32".to_string(),
                    nullable: false,
                },
                ColumnDescriptor {
                    name: "name".to_string(),
                    source_type: "varchar(50)".to_string(),
                    target_type: "String".to_string(),
                    nullable: true,
                },
            ],
            primary_key: vec!["id".to_string()],
            partition_by: None,
            indexes: vec![],
        }
    }

    #[test]
    fn test_indexes() {
        let d = users();
        assert_eq!(d.column_index("name"), Some(1));
        assert_eq!(d.primary_key_indexes(), vec![0]);
        assert!(d.columns[0].is_unsigned());
        assert!(!d.columns[1].is_unsigned());
    }

    #[test]
    fn test_map_rename() {
        let mut m = DescriptorMap::new();
        m.insert(users());
        assert!(m.get("shop", "users").is_some());

        assert!(m.rename("shop", "users", "customers"));
        assert!(m.get("shop", "users").is_none());
        assert_eq!(m.get("shop", "customers").unwrap().table, "customers");
        assert_eq!(m.tables_of("shop"), vec!["customers".to_string()]);
    }
}
