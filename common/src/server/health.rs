use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::coordinate::Coordinate;

/// 健康面整体快照，HTTP面直接序列化输出
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub ingestor: ComponentHealth,
    /// 源库名 -> applier健康
    pub appliers: BTreeMap<String, ApplierHealth>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// running / faulted / stopped ...
    pub state: String,
    pub coordinate: Coordinate,
    /// 最近处理事件的unix秒
    pub last_event_timestamp: u32,
    pub restarts: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplierHealth {
    pub state: String,
    /// 持久化的consumer位点
    pub coordinate: Coordinate,
    pub last_event_timestamp: u32,
    pub restarts: u64,
    pub paused: bool,
    /// ingest与consumer位点的字节距离（同文件内精确，跨文件为估算）
    pub lag_bytes: u64,
    /// 墙钟口径的滞后（秒），按事件时间戳
    pub lag_seconds: u64,
}

impl HealthSnapshot {
    /// 按ingest位点刷新每个applier的滞后
    pub fn refresh_lag(&mut self, now_secs: u64) {
        let ingest = self.ingestor.coordinate;
        for a in self.appliers.values_mut() {
            a.lag_bytes = lag_bytes(ingest, a.coordinate);
            a.lag_seconds = if a.last_event_timestamp == 0 {
                0
            } else {
                now_secs.saturating_sub(a.last_event_timestamp as u64)
            };
        }
    }
}

/// 同文件内取offset差；跨文件时offset不可比，按每文件1GiB粗估
fn lag_bytes(ingest: Coordinate, consumer: Coordinate) -> u64 {
    if ingest <= consumer {
        return 0;
    }
    if ingest.file_index == consumer.file_index {
        ingest.offset.saturating_sub(consumer.offset)
    } else {
        let files = ingest.file_index.saturating_sub(consumer.file_index);
        files.saturating_mul(1 << 30) + ingest.offset
    }
}
