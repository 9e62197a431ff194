//! 测试替身：内存版目标库与快照源。
//! MockTarget在读取侧模拟merge-on-primary-key语义。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use clickhouse::target::TargetStore;
use common::err::{RpError, RpResult};
use replicator::snapshot::{SnapshotSource, SourceFactory};

type Tables = BTreeMap<String, Vec<Value>>;

#[derive(Debug, Default)]
pub struct MockTarget {
    /// 库 -> 表 -> 已插入的原始行（含_version/_is_deleted）
    pub databases: Mutex<BTreeMap<String, Tables>>,
    /// 收到的全部语句
    pub statements: Mutex<Vec<String>>,
    /// 设置后所有写入报瞬时错，翻转用
    pub fail_writes: Mutex<bool>,
}

impl MockTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(MockTarget::default())
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases.lock().unwrap().keys().cloned().collect()
    }

    pub fn table_names(&self, database: &str) -> Vec<String> {
        self.databases
            .lock()
            .unwrap()
            .get(database)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn raw_rows(&self, database: &str, table: &str) -> Vec<Value> {
        self.databases
            .lock()
            .unwrap()
            .get(database)
            .and_then(|t| t.get(table))
            .cloned()
            .unwrap_or_default()
    }

    /// merge-final读取：同主键取最高版本，墓碑行整键剔除
    pub fn final_rows(&self, database: &str, table: &str, key: &str) -> Vec<Value> {
        let mut latest: BTreeMap<String, (u64, Value)> = BTreeMap::new();
        for row in self.raw_rows(database, table) {
            let k = row.get(key).map(|v| v.to_string()).unwrap_or_default();
            let version = row
                .get("_version")
                .and_then(|v| v.as_u64())
                .unwrap_or_default();
            match latest.get(&k) {
                Some((have, _)) if *have > version => {}
                _ => {
                    latest.insert(k, (version, row));
                }
            }
        }
        latest
            .into_values()
            .filter(|(_, row)| row.get("_is_deleted").and_then(|v| v.as_u64()) != Some(1))
            .map(|(_, row)| row)
            .collect()
    }

    /// 语句里反引号包住的名字
    fn quoted_names(sql: &str) -> Vec<String> {
        let mut names = vec![];
        let mut rest = sql;
        while let Some(start) = rest.find('`') {
            let tail = &rest[start + 1..];
            let Some(end) = tail.find('`') else { break };
            names.push(tail[..end].to_string());
            rest = &tail[end + 1..];
        }
        names
    }
}

#[async_trait]
impl TargetStore for MockTarget {
    async fn execute(&self, sql: &str) -> RpResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(RpError::TargetErr("mock target unavailable".to_string()));
        }
        self.statements.lock().unwrap().push(sql.to_string());

        let names = Self::quoted_names(sql);
        let head: Vec<String> = sql
            .split_whitespace()
            .take(2)
            .map(|t| t.to_lowercase())
            .collect();
        let mut dbs = self.databases.lock().unwrap();

        match (head.first().map(|s| s.as_str()), head.get(1).map(|s| s.as_str())) {
            (Some("create"), Some("database")) => {
                let db = names
                    .first()
                    .ok_or_else(|| RpError::TargetErr("bad create database".to_string()))?;
                dbs.entry(db.clone()).or_default();
            }
            (Some("drop"), Some("database")) => {
                if let Some(db) = names.first() {
                    dbs.remove(db);
                }
            }
            (Some("rename"), Some("database")) => {
                let (from, to) = (
                    names
                        .first()
                        .ok_or_else(|| RpError::TargetErr("bad rename".to_string()))?,
                    names
                        .get(1)
                        .ok_or_else(|| RpError::TargetErr("bad rename".to_string()))?,
                );
                let tables = dbs
                    .remove(from)
                    .ok_or_else(|| RpError::TargetErr(format!("no database {}", from)))?;
                dbs.insert(to.clone(), tables);
            }
            (Some("create"), Some("table")) => {
                let (db, table) = (
                    names
                        .first()
                        .ok_or_else(|| RpError::TargetErr("bad create table".to_string()))?,
                    names
                        .get(1)
                        .ok_or_else(|| RpError::TargetErr("bad create table".to_string()))?,
                );
                let tables = dbs
                    .get_mut(db)
                    .ok_or_else(|| RpError::TargetErr(format!("no database {}", db)))?;
                tables.entry(table.clone()).or_default();
            }
            (Some("drop"), Some("table")) => {
                if let (Some(db), Some(table)) = (names.first(), names.get(1)) {
                    if let Some(tables) = dbs.get_mut(db) {
                        tables.remove(table);
                    }
                }
            }
            (Some("truncate"), _) => {
                if let (Some(db), Some(table)) = (names.first(), names.get(1)) {
                    if let Some(rows) = dbs.get_mut(db).and_then(|t| t.get_mut(table)) {
                        rows.clear();
                    }
                }
            }
            (Some("rename"), Some("table")) => {
                // RENAME TABLE `db`.`a` TO `db`.`b`
                if names.len() >= 4 {
                    let (db, old, new) = (&names[0], &names[1], &names[3]);
                    if let Some(tables) = dbs.get_mut(db) {
                        if let Some(rows) = tables.remove(old) {
                            tables.insert(new.clone(), rows);
                        }
                    }
                }
            }
            // ALTER/OPTIMIZE等只记录
            _ => {}
        }
        Ok(())
    }

    async fn insert_rows(
        &self,
        database: &str,
        table: &str,
        rows: Vec<Value>,
    ) -> RpResult<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(RpError::TargetErr("mock target unavailable".to_string()));
        }
        let mut dbs = self.databases.lock().unwrap();
        let stored = dbs
            .get_mut(database)
            .and_then(|t| t.get_mut(table))
            .ok_or_else(|| {
                RpError::TargetErr(format!("table {}.{} missing", database, table))
            })?;
        stored.extend(rows);
        Ok(())
    }

    async fn query_scalar(&self, sql: &str) -> RpResult<Option<String>> {
        // database_exists探测
        if sql.contains("system.databases") {
            let names = self.database_names();
            let wanted = sql.split('\'').nth(1).unwrap_or_default();
            let found = names.iter().any(|n| n == wanted);
            return Ok(Some(if found { "1" } else { "0" }.to_string()));
        }
        Ok(None)
    }

    async fn list_databases(&self) -> RpResult<Vec<String>> {
        Ok(self.database_names())
    }
}

/// 内存快照源：固定表、固定行
pub struct MockSource {
    /// (表名, SHOW CREATE产物, 文本协议行)
    pub tables: Vec<(String, String, Vec<Vec<Option<String>>>)>,
}

impl MockSource {
    pub fn factory(tables: Vec<(String, String, Vec<Vec<Option<String>>>)>) -> SourceFactory {
        let tables = Arc::new(tables);
        Arc::new(move || {
            Ok(Box::new(MockSource {
                tables: tables.as_ref().clone(),
            }) as Box<dyn SnapshotSource>)
        })
    }
}

impl SnapshotSource for MockSource {
    fn list_tables(&mut self, _database: &str) -> RpResult<Vec<String>> {
        Ok(self.tables.iter().map(|(n, _, _)| n.clone()).collect())
    }

    fn show_create(&mut self, _database: &str, table: &str) -> RpResult<String> {
        self.tables
            .iter()
            .find(|(n, _, _)| n == table)
            .map(|(_, sql, _)| sql.clone())
            .ok_or_else(|| RpError::String(format!("unknown table {}", table)))
    }

    fn min_max_key(
        &mut self,
        _database: &str,
        table: &str,
        _pk: &str,
    ) -> RpResult<Option<(i64, i64)>> {
        let rows = &self
            .tables
            .iter()
            .find(|(n, _, _)| n == table)
            .ok_or_else(|| RpError::String(format!("unknown table {}", table)))?
            .2;
        let keys: Vec<i64> = rows
            .iter()
            .filter_map(|r| r.first().cloned().flatten())
            .filter_map(|s| s.parse().ok())
            .collect();
        Ok(keys
            .iter()
            .min()
            .copied()
            .zip(keys.iter().max().copied()))
    }

    fn fetch_page(
        &mut self,
        _database: &str,
        table: &str,
        _pk_columns: &[String],
        after: Option<&[String]>,
        upper: Option<i64>,
        limit: usize,
    ) -> RpResult<Vec<Vec<Option<String>>>> {
        let rows = &self
            .tables
            .iter()
            .find(|(n, _, _)| n == table)
            .ok_or_else(|| RpError::String(format!("unknown table {}", table)))?
            .2;

        // 主键在第一列的约定对mock足够
        let after_key: Option<i64> = after
            .and_then(|a| a.first().cloned())
            .and_then(|s| s.parse().ok());

        let mut page: Vec<(i64, Vec<Option<String>>)> = rows
            .iter()
            .filter_map(|r| {
                let k: i64 = r.first().cloned().flatten()?.parse().ok()?;
                Some((k, r.clone()))
            })
            .filter(|(k, _)| after_key.map(|a| *k > a).unwrap_or(true))
            .filter(|(k, _)| upper.map(|u| *k <= u).unwrap_or(true))
            .collect();
        page.sort_by_key(|(k, _)| *k);
        page.truncate(limit);
        Ok(page.into_iter().map(|(_, r)| r).collect())
    }
}
