use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use common::config::TargetConfig;
use common::err::{RpError, RpResult};

use crate::target::TargetStore;

/// SQL-over-HTTP的ClickHouse client
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
}

impl HttpClient {
    pub fn new(config: &TargetConfig) -> RpResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connection_timeout))
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| RpError::TargetErr(format!("http client build err: {}", e)))?;

        Ok(Self {
            http,
            base_url: format!("http://{}:{}/", config.host, config.port),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    /// POST一条语句；query放URL参数，body留给INSERT数据
    async fn post(&self, query: &str, body: Vec<u8>) -> RpResult<String> {
        let resp = self
            .http
            .post(&self.base_url)
            .query(&[("query", query)])
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(body)
            .send()
            .await
            .map_err(|e| RpError::TargetErr(format!("target request err: {}", e)))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RpError::TargetErr(format!("target response err: {}", e)))?;

        if !status.is_success() {
            return Err(RpError::TargetErr(format!(
                "target {}: {}",
                status,
                text.trim()
            )));
        }
        Ok(text)
    }

    pub async fn ping(&self) -> RpResult<()> {
        self.query_scalar("SELECT 1").await.map(|_| ())
    }
}

#[async_trait]
impl TargetStore for HttpClient {
    #[instrument(skip(self))]
    async fn execute(&self, sql: &str) -> RpResult<()> {
        debug!("target execute: {}", sql);
        self.post(sql, vec![]).await.map(|_| ())
    }

    async fn insert_rows(
        &self,
        database: &str,
        table: &str,
        rows: Vec<serde_json::Value>,
    ) -> RpResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let query = format!(
            "INSERT INTO `{}`.`{}` FORMAT JSONEachRow",
            database, table
        );
        let mut body = Vec::new();
        for row in &rows {
            serde_json::to_writer(&mut body, row)
                .map_err(|e| RpError::TargetErr(format!("row encode err: {}", e)))?;
            body.push(b'\n');
        }
        self.post(&query, body).await.map(|_| ())
    }

    async fn query_scalar(&self, sql: &str) -> RpResult<Option<String>> {
        let text = self
            .post(&format!("{} FORMAT TabSeparated", sql), vec![])
            .await?;
        Ok(text
            .lines()
            .next()
            .map(|l| l.split('\t').next().unwrap_or("").to_string()))
    }

    async fn list_databases(&self) -> RpResult<Vec<String>> {
        let text = self
            .post("SELECT name FROM system.databases FORMAT TabSeparated", vec![])
            .await?;
        Ok(text
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect())
    }
}
