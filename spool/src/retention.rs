use std::time::SystemTime;

use tracing::{info, warn};

use common::err::RpResult;
use common::model::coordinate::Coordinate;

use crate::checkpoint::ConsumerCheckpoint;
use crate::entry::scan_file;
use crate::floor::FloorRegistry;
use crate::spool_config::SpoolConfig;
use crate::spool_file::SpoolFile;

/// spool保留策略（删除端）。
/// 仅删除满足全部条件的文件：
///   1. 文件内全部事件 <= 最小consumer checkpoint
///   2. 文件修改时间早于retention window
///   3. 不在任何reader的floor之内
///   4. 不是当前活跃（最后一个）文件
pub struct RetentionSweeper {
    config: SpoolConfig,
    floors: FloorRegistry,
}

impl RetentionSweeper {
    pub fn new(config: SpoolConfig, floors: FloorRegistry) -> Self {
        Self { config, floors }
    }

    /// 跑一轮清理，返回删掉的file_id
    pub fn sweep(&self) -> RpResult<Vec<u64>> {
        let consumers = ConsumerCheckpoint::load_all(self.config.spool_dir())?;
        if consumers.is_empty() {
            // 无消费者时删除等价于丢数据
            return Ok(vec![]);
        }
        let min_ckpt: Coordinate = consumers
            .iter()
            .map(|(_, s)| s.coordinate)
            .min()
            .unwrap_or_default();

        let ids = SpoolFile::list_file_ids(self.config.spool_dir())?;
        let Some(&active) = ids.last() else {
            return Ok(vec![]);
        };
        let min_floor = self.floors.min_floor();

        let mut deleted = vec![];
        for id in ids {
            if id >= active {
                break;
            }
            if let Some(floor) = min_floor {
                if id >= floor {
                    break;
                }
            }

            let path = SpoolFile::path_of(self.config.spool_dir(), id);
            let age_ok = match path.metadata().and_then(|m| m.modified()) {
                Ok(modified) => {
                    let age = SystemTime::now()
                        .duration_since(modified)
                        .map(|d| d.as_secs())
                        .unwrap_or(0);
                    age >= *self.config.retention_period()
                }
                Err(e) => {
                    warn!("spool file {} mtime unreadable: {}", path.display(), e);
                    false
                }
            };
            if !age_ok {
                // 后续文件更年轻，无需再看
                break;
            }

            let scan = scan_file(&path)?;
            let consumed = match scan.last {
                Some(last) => last <= min_ckpt,
                // 空文件视作已消费
                None => true,
            };
            if !consumed {
                break;
            }

            warn!("===删除spool文件: {:?}", path);
            std::fs::remove_file(&path)?;
            deleted.push(id);
        }

        if !deleted.is_empty() {
            info!("retention swept {} spool file(s)", deleted.len());
        }
        Ok(deleted)
    }
}
