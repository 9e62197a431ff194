use async_trait::async_trait;

use common::err::RpResult;

/// 目标库的最小操作面。applier与snapshotter只依赖这个trait，
/// 生产实现是HTTP client，测试用内存mock。
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// 执行一条语句，无结果
    async fn execute(&self, sql: &str) -> RpResult<()>;

    /// 单表批量写入。rows为JSON对象（JSONEachRow一行一个）
    async fn insert_rows(
        &self,
        database: &str,
        table: &str,
        rows: Vec<serde_json::Value>,
    ) -> RpResult<()>;

    /// 标量查询（首行首列）
    async fn query_scalar(&self, sql: &str) -> RpResult<Option<String>>;

    async fn database_exists(&self, database: &str) -> RpResult<bool> {
        let v = self
            .query_scalar(&format!(
                "SELECT count() FROM system.databases WHERE name = '{}'",
                escape(database)
            ))
            .await?;
        Ok(v.as_deref() == Some("1"))
    }

    async fn list_databases(&self) -> RpResult<Vec<String>>;

    async fn create_database(&self, database: &str) -> RpResult<()> {
        self.execute(&format!("CREATE DATABASE IF NOT EXISTS `{}`", database))
            .await
    }

    async fn drop_database(&self, database: &str) -> RpResult<()> {
        self.execute(&format!("DROP DATABASE IF EXISTS `{}`", database))
            .await
    }

    /// swap的原子步骤
    async fn rename_database(&self, from: &str, to: &str) -> RpResult<()> {
        self.execute(&format!("RENAME DATABASE `{}` TO `{}`", from, to))
            .await
    }

    async fn optimize_table(&self, database: &str, table: &str) -> RpResult<()> {
        self.execute(&format!("OPTIMIZE TABLE `{}`.`{}` FINAL", database, table))
            .await
    }
}

pub fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}
