//! 跨场景共享的事件与环境构造器

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use common::config::{Config, Patterns};
use common::err::{RpError, RpResult};
use common::model::coordinate::Coordinate;
use common::model::event::{ChangeEvent, EventKind, RowImage, UpdateImage};
use common::schema::column_value::ColumnValue;
use common::server::ControlHandle;
use replicator::applier::Applier;
use replicator::context::Context;
use replicator::snapshot::SourceFactory;
use spool::checkpoint::{ConsumerCheckpoint, ConsumerState, Phase};
use spool::writer::SpoolWriter;

use crate::mock::MockTarget;

pub fn scratch_context(name: &str, tweak: impl FnOnce(&mut Config)) -> Arc<Context> {
    let dir = std::env::temp_dir().join(name);
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();

    let mut config = Config::default();
    config.data_dir = dir.to_str().unwrap().to_string();
    config.databases = Patterns::One("d".to_string());
    config.batch.max_interval_ms = 50;
    config.records_per_file = 1_000;
    tweak(&mut config);

    Context::new(config).unwrap()
}

pub fn cleanup(context: &Arc<Context>) {
    std::fs::remove_dir_all(&context.config.data_dir).ok();
}

pub fn ddl(offset: u64, db: &str, statement: &str) -> ChangeEvent {
    ChangeEvent {
        coordinate: Coordinate::new(1, offset),
        transaction_id: None,
        database: db.to_string(),
        table: String::new(),
        timestamp: 1_700_000_000,
        kind: EventKind::Ddl {
            statement: statement.to_string(),
        },
    }
}

pub fn insert(offset: u64, db: &str, table: &str, rows: Vec<Vec<ColumnValue>>) -> ChangeEvent {
    ChangeEvent {
        coordinate: Coordinate::new(1, offset),
        transaction_id: None,
        database: db.to_string(),
        table: table.to_string(),
        timestamp: 1_700_000_000,
        kind: EventKind::Insert {
            rows: rows.into_iter().map(RowImage).collect(),
        },
    }
}

pub fn update(
    offset: u64,
    db: &str,
    table: &str,
    before: Vec<ColumnValue>,
    after: Vec<ColumnValue>,
) -> ChangeEvent {
    ChangeEvent {
        coordinate: Coordinate::new(1, offset),
        transaction_id: None,
        database: db.to_string(),
        table: table.to_string(),
        timestamp: 1_700_000_000,
        kind: EventKind::Update {
            rows: vec![UpdateImage {
                key: before,
                row: after,
            }],
        },
    }
}

pub fn delete(offset: u64, db: &str, table: &str, rows: Vec<Vec<ColumnValue>>) -> ChangeEvent {
    ChangeEvent {
        coordinate: Coordinate::new(1, offset),
        transaction_id: None,
        database: db.to_string(),
        table: table.to_string(),
        timestamp: 1_700_000_000,
        kind: EventKind::Delete {
            rows: rows.into_iter().map(RowImage).collect(),
        },
    }
}

pub fn write_events(context: &Arc<Context>, events: Vec<ChangeEvent>) {
    let mut writer = SpoolWriter::open(context.spool_config()).unwrap();
    for e in events {
        writer.append(e).unwrap();
    }
    writer.flush().unwrap();
}

/// 预置一份LIVE状态，跳过快照路径
pub fn seed_live_state(context: &Arc<Context>, db: &str) {
    let ckpt = ConsumerCheckpoint::new(&context.config.data_dir, db);
    let mut state = ConsumerState::new(context.final_database(db));
    state.phase = Phase::Live;
    ckpt.store(&state).unwrap();
}

/// 清掉consumer状态（模拟全量replay）
pub fn reset_consumer_state(context: &Arc<Context>, db: &str) {
    let path = std::path::PathBuf::from(&context.config.data_dir).join(format!("state.{}", db));
    std::fs::remove_file(path).ok();
}

pub fn no_snapshot_factory() -> SourceFactory {
    Arc::new(|| Err(RpError::Bug("snapshot not expected in this test".to_string())))
}

/// 跑applier直到谓词满足（或超时），然后取消并返回applier结果
pub async fn run_applier_until(
    context: Arc<Context>,
    db: &str,
    target: Arc<MockTarget>,
    factory: SourceFactory,
    predicate: impl Fn(&MockTarget) -> bool,
) -> RpResult<()> {
    let (handle, _control_rx) = ControlHandle::new();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (_control_tx, control_rx) = mpsc::channel(8);

    let applier = Applier::new(context, db.to_string(), target.clone(), handle, factory);
    let mut join = tokio::spawn(applier.run(cancel_rx, control_rx));

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if join.is_finished() {
            break;
        }
        if predicate(&target) {
            // 再给一个flush间隔把checkpoint推完
            tokio::time::sleep(Duration::from_millis(200)).await;
            break;
        }
        if Instant::now() > deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let _ = cancel_tx.send(true);
    (&mut join)
        .await
        .map_err(|e| RpError::String(format!("applier task err: {}", e)))?
}

/// 跑applier固定时长后取消（用于"什么都不该发生"的断言）
pub async fn run_applier_for(
    context: Arc<Context>,
    db: &str,
    target: Arc<MockTarget>,
    factory: SourceFactory,
    millis: u64,
) -> RpResult<()> {
    let (handle, _control_rx) = ControlHandle::new();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (_control_tx, control_rx) = mpsc::channel(8);

    let applier = Applier::new(context, db.to_string(), target, handle, factory);
    let mut join = tokio::spawn(applier.run(cancel_rx, control_rx));

    tokio::time::sleep(Duration::from_millis(millis)).await;
    let _ = cancel_tx.send(true);
    (&mut join)
        .await
        .map_err(|e| RpError::String(format!("applier task err: {}", e)))?
}
