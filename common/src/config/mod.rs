mod pattern;

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::err::{RpError, RpResult};

pub use pattern::Patterns;

/// 复制任务的全量配置，来源于单个YAML文件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub target: TargetConfig,

    /// spool文件根目录，启动时做写入预检
    pub data_dir: String,

    /// 单个spool文件的事件数上限
    pub records_per_file: u64,

    /// 已消费spool文件的最短保留时间（秒）
    pub binlog_retention_period: u64,

    pub databases: Patterns,
    pub tables: Patterns,
    /// 排除项优先于包含项
    pub exclude_databases: Patterns,
    pub exclude_tables: Patterns,

    /// 源库名 -> 目标库名 重映射
    pub target_databases: HashMap<String, String>,

    /// 初始快照的分片并行度
    pub initial_replication_threads: usize,

    /// 两次compaction之间的间隔（秒）
    pub optimize_interval: u64,

    /// applier定期重启的间隔（秒）
    pub auto_restart_interval: u64,

    /// 异常退出后重启退避的上限（秒）
    pub restart_backoff_cap: u64,

    /// D_old_* 库的保留宽限期（秒）
    pub old_database_grace_period: u64,

    /// 建表时附加的二级索引
    pub indexes: Vec<IndexSpec>,

    /// 按表覆盖分区表达式
    pub partition_bys: Vec<PartitionBySpec>,

    /// 按源类型覆盖目标类型，如 char(36) -> UUID
    pub types_mapping: HashMap<String, String>,

    /// 设置后DELETE事件被丢弃，写入直达live库
    pub ignore_deletes: bool,

    /// 源库naive datetime使用的时区
    pub source_timezone: String,

    pub batch: BatchConfig,

    pub http_host: String,
    pub http_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,

    /// 源库读超时（秒）
    pub read_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,

    /// 建连超时（秒）
    pub connection_timeout: u64,
    /// 单个请求超时（秒）
    pub request_timeout: u64,
}

/// flush触发阈值，三者任一满足即触发
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_records: usize,
    pub max_bytes: usize,
    pub max_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSpec {
    #[serde(default)]
    pub databases: Patterns,
    #[serde(default)]
    pub tables: Patterns,
    pub index: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionBySpec {
    #[serde(default)]
    pub databases: Patterns,
    #[serde(default)]
    pub tables: Patterns,
    pub partition_by: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source: SourceConfig::default(),
            target: TargetConfig::default(),
            data_dir: "/var/lib/mysql-ch-sync".to_string(),
            records_per_file: 100_000,
            binlog_retention_period: 43_200,
            databases: Patterns::default(),
            tables: Patterns::default(),
            exclude_databases: Patterns::default(),
            exclude_tables: Patterns::default(),
            target_databases: HashMap::new(),
            initial_replication_threads: 1,
            optimize_interval: 86_400,
            auto_restart_interval: 3_600,
            restart_backoff_cap: 60,
            old_database_grace_period: 604_800,
            indexes: vec![],
            partition_bys: vec![],
            types_mapping: HashMap::new(),
            ignore_deletes: false,
            source_timezone: "UTC".to_string(),
            batch: BatchConfig::default(),
            http_host: "127.0.0.1".to_string(),
            http_port: 9128,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: "".to_string(),
            read_timeout: 60,
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            host: "127.0.0.1".to_string(),
            port: 8123,
            user: "default".to_string(),
            password: "".to_string(),
            connection_timeout: 10,
            request_timeout: 60,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            max_records: 10_000,
            max_bytes: 16 * 1024 * 1024,
            max_interval_ms: 1_000,
        }
    }
}

impl Config {
    /// 查某个源库对应的目标库名，未重映射时同名
    pub fn target_database(&self, database: &str) -> String {
        self.target_databases
            .get(database)
            .cloned()
            .unwrap_or_else(|| database.to_string())
    }

    /// 查某表的分区表达式覆盖
    pub fn partition_by_for(&self, database: &str, table: &str) -> Option<String> {
        self.partition_bys
            .iter()
            .find(|p| p.databases.matched(database) && p.tables.matched(table))
            .map(|p| p.partition_by.clone())
    }

    /// 查某表需要附加的二级索引
    pub fn indexes_for(&self, database: &str, table: &str) -> Vec<String> {
        self.indexes
            .iter()
            .filter(|i| i.databases.matched(database) && i.tables.matched(table))
            .map(|i| i.index.clone())
            .collect()
    }

    /// data_dir 写入预检：目录可建、文件可写
    pub fn preflight_data_dir(&self) -> RpResult<()> {
        let dir = PathBuf::from(&self.data_dir);
        std::fs::create_dir_all(&dir)?;
        let probe = dir.join(".write_test");
        std::fs::write(&probe, b"ok")?;
        std::fs::remove_file(&probe)?;
        Ok(())
    }
}

/// 读取指定路径下的配制文件信息
pub fn read_config<P: AsRef<Path>>(path: P) -> RpResult<Config> {
    let mut file = File::open(path.as_ref())?;
    let mut s = String::new();
    file.read_to_string(&mut s)?;

    serde_yaml::from_str(s.as_str()).map_err(|e| RpError::ConfigErr(e.to_string()))
}
