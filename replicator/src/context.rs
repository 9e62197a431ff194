use std::sync::Arc;

use dashmap::DashMap;

use common::config::Config;
use common::err::RpResult;
use common::filter::NameFilter;
use spool::floor::FloorRegistry;
use spool::spool_config::SpoolConfig;

/// 进程级根上下文：配置与跨任务共享的句柄，
/// 启动时构造一次、显式传递，不放模块级状态。
pub struct Context {
    pub config: Config,
    pub filter: NameFilter,
    pub floors: FloorRegistry,
    /// ingestor见过的源库名，supervisor据此发现新applier
    pub seen_databases: DashMap<String, ()>,
}

impl Context {
    pub fn new(config: Config) -> RpResult<Arc<Self>> {
        config.preflight_data_dir()?;
        let filter = NameFilter::from_config(&config);
        Ok(Arc::new(Self {
            config,
            filter,
            floors: FloorRegistry::new(),
            seen_databases: DashMap::new(),
        }))
    }

    pub fn spool_config(&self) -> SpoolConfig {
        SpoolConfig::new(
            self.config.data_dir.clone(),
            self.config.records_per_file,
            self.config.binlog_retention_period,
        )
    }

    /// 该源库在目标端的live库名
    pub fn final_database(&self, database: &str) -> String {
        self.config.target_database(database)
    }

    /// staging库名
    pub fn staging_database(&self, database: &str) -> String {
        format!("{}_tmp", self.final_database(database))
    }

    /// 某次swap挤出来的旧库名
    pub fn old_database(&self, database: &str, ts: u64) -> String {
        format!("{}_old_{}", self.final_database(database), ts)
    }
}
