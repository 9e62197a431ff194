use getset::{Getters, Setters};

/// 文件名前缀: spool-{version}-{file_id}.log
pub const SPOOL_FILE_PRE: &str = "spool";

/// 存储格式版本
pub const VERSION: u32 = 1;

/// entry头大小: file_index(8) + offset(8) + payload_len(8) + checksum(4)
pub const ENTRY_HEADER_SIZE: usize = 28;

/// ingest checkpoint sidecar文件名
pub const INGEST_STATE_FILE: &str = "state";

/// consumer checkpoint sidecar前缀: state.{database}
pub const CONSUMER_STATE_PRE: &str = "state.";

#[derive(Debug, Clone, Getters, Setters)]
pub struct SpoolConfig {
    // spool文件根目录
    #[getset(get = "pub", set = "pub")]
    spool_dir: String,

    // 单文件事件数上限
    #[getset(get = "pub", set = "pub")]
    records_per_file: u64,

    // 已消费文件的最短保留时间（秒）
    #[getset(get = "pub", set = "pub")]
    retention_period: u64,
}

impl SpoolConfig {
    pub fn new(spool_dir: String, records_per_file: u64, retention_period: u64) -> Self {
        Self {
            spool_dir,
            records_per_file,
            retention_period,
        }
    }
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            spool_dir: "/tmp/mysql-ch-sync/spool".to_string(),
            records_per_file: 100_000,
            retention_period: 43_200,
        }
    }
}
