use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use common::err::{RpError, RpResult};
use common::model::coordinate::Coordinate;
use common::time_util;

use crate::spool_config::{CONSUMER_STATE_PRE, INGEST_STATE_FILE};

/// applier的生命周期阶段，与consumer checkpoint一并持久化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    Staging,
    Swapping,
    Live,
    Faulted,
}

/// ingest checkpoint：最后一次落盘事件的位点
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IngestState {
    pub coordinate: Coordinate,
    pub updated_at: u64,
}

/// 单个applier的持久状态：位点 + 阶段 + 当前目标库名 + schema镜像。
/// 重启后描述符从这里恢复，不靠重新快照。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerState {
    pub coordinate: Coordinate,
    pub phase: Phase,
    /// 当前写入的目标库（live名或staging名）
    pub target_database: String,
    #[serde(default)]
    pub descriptors: Vec<common::schema::descriptor::TableDescriptor>,
    pub updated_at: u64,
}

impl ConsumerState {
    pub fn new(target_database: String) -> Self {
        ConsumerState {
            coordinate: Coordinate::default(),
            phase: Phase::Initializing,
            target_database,
            descriptors: vec![],
            updated_at: time_util::now_secs(),
        }
    }
}

/// sidecar文件只整体重写，临时文件 + rename + fsync保证原子
fn store_json<T: Serialize>(path: &Path, value: &T) -> RpResult<()> {
    // 不能用with_extension：state.{db}会被折叠成同一个state.tmp
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state");
    let tmp = path.with_file_name(format!("{}.tmp", file_name));
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| RpError::SpoolErr(format!("state serialize err: {}", e)))?;
    fs::write(&tmp, &body)?;
    let f = File::open(&tmp)?;
    f.sync_all()?;
    fs::rename(&tmp, path)?;
    if let Some(dir) = path.parent() {
        // rename自身也需要落盘
        File::open(dir)?.sync_all()?;
    }
    Ok(())
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> RpResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let body = fs::read(path)?;
    let value = serde_json::from_slice(&body).map_err(|e| {
        RpError::StateCorrupted(format!("{}: {}", path.display(), e))
    })?;
    Ok(Some(value))
}

/// ingest checkpoint文件（spool目录下的`state`）
#[derive(Debug)]
pub struct IngestCheckpoint {
    path: PathBuf,
}

impl IngestCheckpoint {
    pub fn new(spool_dir: &str) -> Self {
        IngestCheckpoint {
            path: PathBuf::from(spool_dir).join(INGEST_STATE_FILE),
        }
    }

    pub fn load(&self) -> RpResult<Option<IngestState>> {
        load_json(&self.path)
    }

    pub fn store(&self, coordinate: Coordinate) -> RpResult<()> {
        store_json(
            &self.path,
            &IngestState {
                coordinate,
                updated_at: time_util::now_secs(),
            },
        )
    }
}

/// consumer checkpoint文件（spool目录下的`state.{database}`）
#[derive(Debug)]
pub struct ConsumerCheckpoint {
    database: String,
    path: PathBuf,
}

impl ConsumerCheckpoint {
    pub fn new(spool_dir: &str, database: &str) -> Self {
        ConsumerCheckpoint {
            database: database.to_string(),
            path: PathBuf::from(spool_dir).join(format!("{}{}", CONSUMER_STATE_PRE, database)),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn load(&self) -> RpResult<Option<ConsumerState>> {
        load_json(&self.path)
    }

    /// 位点只进不退
    pub fn store(&self, state: &ConsumerState) -> RpResult<()> {
        if let Some(prev) = self.load()? {
            if state.coordinate < prev.coordinate {
                return Err(RpError::Bug(format!(
                    "consumer checkpoint of {} moved backwards: {} -> {}",
                    self.database, prev.coordinate, state.coordinate
                )));
            }
        }
        store_json(&self.path, state)
    }

    /// 枚举spool目录下全部consumer状态
    pub fn load_all(spool_dir: &str) -> RpResult<Vec<(String, ConsumerState)>> {
        let mut out = vec![];
        let dir = PathBuf::from(spool_dir);
        if !dir.exists() {
            return Ok(out);
        }
        for f in dir.read_dir()? {
            let f = f?;
            let name = f.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(db) = name.strip_prefix(CONSUMER_STATE_PRE) else {
                continue;
            };
            if db.is_empty() || name.ends_with(".tmp") {
                continue;
            }
            if let Some(state) = load_json::<ConsumerState>(&f.path())? {
                out.push((db.to_string(), state));
            }
        }
        Ok(out)
    }
}
