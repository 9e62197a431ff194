pub mod buffer;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{info, instrument, warn};

use clickhouse::target::TargetStore;
use clickhouse::translator::{DdlOutcome, DdlTranslator, TranslatorConfig};
use clickhouse::value_format::render_row;
use common::err::{RpError, RpResult};
use common::filter::NameFilter;
use common::model::coordinate::Coordinate;
use common::model::event::{ChangeEvent, EventKind};
use common::schema::column_value::ColumnValue;
use common::schema::descriptor::DescriptorMap;
use common::server::{ControlCommand, ControlHandle};
use common::time_util;
use spool::checkpoint::{ConsumerCheckpoint, ConsumerState, IngestCheckpoint, Phase};
use spool::reader::SpoolReader;

use crate::applier::buffer::{split_runs, version_of, BatchBuffer, RowOp};
use crate::context::Context;
use crate::snapshot::{SourceFactory, Snapshotter};

/// tail轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// 目标端写入的退避重试
const TARGET_RETRY_CAP: u32 = 5;
/// 一次醒来最多拉多少事件再让出
const DRAIN_BATCH: usize = 512;

/// 单源库的applier（C3）：消费spool、维护schema镜像、
/// 批量写目标端、flush成功后推进consumer checkpoint。
pub struct Applier<T: TargetStore + 'static> {
    context: Arc<Context>,
    /// 源库名
    database: String,
    final_database: String,
    target: Arc<T>,
    translator: DdlTranslator,
    descriptors: DescriptorMap,
    checkpoint: ConsumerCheckpoint,
    state: ConsumerState,
    buffer: BatchBuffer,
    handle: ControlHandle,
    source_factory: SourceFactory,
    paused: bool,
    last_optimize: Instant,
}

impl<T: TargetStore + 'static> Applier<T> {
    pub fn new(
        context: Arc<Context>,
        database: String,
        target: Arc<T>,
        handle: ControlHandle,
        source_factory: SourceFactory,
    ) -> Self {
        let final_database = context.final_database(&database);
        let translator = DdlTranslator::new(TranslatorConfig::from_config(&context.config));
        let checkpoint = ConsumerCheckpoint::new(&context.config.data_dir, &database);
        let state = ConsumerState::new(final_database.clone());
        Self {
            context,
            database,
            final_database,
            target,
            translator,
            descriptors: DescriptorMap::new(),
            checkpoint,
            state,
            buffer: BatchBuffer::new(),
            handle,
            source_factory,
            paused: false,
            last_optimize: Instant::now(),
        }
    }

    #[instrument(skip_all, fields(database = %self.database))]
    pub async fn run(
        mut self,
        cancel: watch::Receiver<bool>,
        mut control: mpsc::Receiver<ControlCommand>,
    ) -> RpResult<()> {
        if let Err(e) = self.startup().await {
            return Err(self.fault(e));
        }

        let mut reader = SpoolReader::open(
            self.context.spool_config(),
            self.context.floors.clone(),
            &self.database,
            self.state.coordinate,
            Some(self.reader_filter()),
        )?;
        info!(
            "applier {} up, phase {:?}, from {}",
            self.database, self.state.phase, self.state.coordinate
        );

        loop {
            if *cancel.borrow() {
                // 未flush的缓冲直接丢弃，事件仍在spool里
                info!("applier {} cancelled", self.database);
                return Ok(());
            }
            while let Ok(command) = control.try_recv() {
                if let Err(e) = self.handle_command(command).await {
                    return Err(self.fault(e));
                }
            }
            if self.paused {
                tokio::time::sleep(POLL_INTERVAL).await;
                continue;
            }

            let mut progressed = false;
            for _ in 0..DRAIN_BATCH {
                match reader.try_next()? {
                    Some(event) => {
                        progressed = true;
                        if let Err(e) = self.handle_event(event).await {
                            return Err(self.fault(e));
                        }
                        if self.buffer.should_flush(&self.context.config.batch) {
                            if let Err(e) = self.flush().await {
                                return Err(self.fault(e));
                            }
                        }
                    }
                    None => break,
                }
            }

            if !progressed {
                // 到尾了
                if self.buffer.age_exceeded(&self.context.config.batch) {
                    if let Err(e) = self.flush().await {
                        return Err(self.fault(e));
                    }
                }
                if self.state.phase == Phase::Staging && self.buffer.is_empty() {
                    if let Err(e) = self.swap().await {
                        return Err(self.fault(e));
                    }
                }
                if let Err(e) = self.housekeeping().await {
                    return Err(self.fault(e));
                }
                self.publish_health();
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }

    /// 恢复持久状态；首次见到该库时走快照或直写
    async fn startup(&mut self) -> RpResult<()> {
        match self.checkpoint.load()? {
            Some(state) => {
                self.descriptors = DescriptorMap::from_vec(state.descriptors.clone());
                self.state = state;
                // 重启后目标库必须在位，建库幂等
                self.execute_with_retry(&format!(
                    "CREATE DATABASE IF NOT EXISTS `{}`",
                    self.state.target_database
                ))
                .await?;
                match self.state.phase {
                    Phase::Swapping => {
                        // 崩在swap中间，幂等地补完
                        self.swap().await?;
                    }
                    Phase::Faulted => {
                        // 从描述符重建目标schema，而不是重新快照
                        self.remirror_schema().await?;
                    }
                    _ => {}
                }
            }
            None => {
                self.bootstrap_snapshot().await?;
            }
        }
        Ok(())
    }

    /// C4：staging库 + 并行分片拷贝，完成后从C₀开始tail。
    /// ignore_deletes下没有staging，快照直接进live库，后续也不swap。
    async fn bootstrap_snapshot(&mut self) -> RpResult<()> {
        let resume = IngestCheckpoint::new(&self.context.config.data_dir)
            .load()?
            .map(|s| s.coordinate)
            .unwrap_or_default();

        let ignore_deletes = self.context.config.ignore_deletes;
        let staging = if ignore_deletes {
            self.final_database.clone()
        } else {
            self.context.staging_database(&self.database)
        };

        let snapshotter = Snapshotter::new(
            self.context.clone(),
            self.database.clone(),
            staging.clone(),
            self.target.clone(),
        );
        let factory = self.source_factory.clone();
        let rt = tokio::runtime::Handle::current();
        let descriptors =
            tokio::task::spawn_blocking(move || snapshotter.run(factory, rt))
                .await
                .map_err(|e| RpError::String(format!("snapshot task err: {}", e)))??;

        self.descriptors = descriptors;
        self.state = ConsumerState::new(staging);
        self.state.phase = if ignore_deletes {
            Phase::Live
        } else {
            Phase::Staging
        };
        self.state.coordinate = resume;
        self.persist_state()?;
        info!(
            "snapshot of {} done, tail from {}",
            self.database, self.state.coordinate
        );
        Ok(())
    }

    /// FAULTED重启路径：按描述符重建目标表（存在则跳过）
    async fn remirror_schema(&mut self) -> RpResult<()> {
        for descriptor in self.descriptors.all() {
            let sql = clickhouse::translator::render::create_table(
                &self.state.target_database,
                &descriptor,
            );
            self.execute_with_retry(&sql).await?;
        }
        self.state.phase = if self.state.target_database == self.final_database {
            Phase::Live
        } else {
            Phase::Staging
        };
        self.persist_state()?;
        Ok(())
    }

    fn reader_filter(&self) -> NameFilter {
        NameFilter::new(
            common::config::Patterns::One(self.database.clone()),
            self.context.config.tables.clone(),
            common::config::Patterns::default(),
            self.context.config.exclude_tables.clone(),
        )
    }

    async fn handle_command(&mut self, command: ControlCommand) -> RpResult<()> {
        match command {
            ControlCommand::Pause => {
                info!("applier {} paused", self.database);
                self.paused = true;
            }
            ControlCommand::Resume => {
                info!("applier {} resumed", self.database);
                self.paused = false;
            }
            ControlCommand::Flush => self.flush().await?,
            ControlCommand::Optimize => self.optimize_tables().await?,
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: ChangeEvent) -> RpResult<()> {
        let coordinate = event.coordinate;
        let timestamp = event.timestamp;

        match &event.kind {
            EventKind::Ddl { statement } => {
                // DDL独占一个批次边界：先清空行缓冲
                self.flush().await?;
                self.apply_ddl(statement, coordinate, timestamp).await?;
            }
            EventKind::Insert { rows } => {
                let version = version_of(coordinate);
                for row in rows {
                    self.push_row(&event.table, row.0.clone(), version, false, coordinate, timestamp);
                }
            }
            EventKind::Update { rows } => {
                let version = version_of(coordinate);
                for update in rows {
                    self.push_update(
                        &event.table,
                        &update.key,
                        update.row.clone(),
                        version,
                        coordinate,
                        timestamp,
                    );
                }
            }
            EventKind::Delete { rows } => {
                if self.context.config.ignore_deletes {
                    self.buffer.mark(coordinate, timestamp);
                } else {
                    let version = version_of(coordinate);
                    for row in rows {
                        self.push_row(&event.table, row.0.clone(), version, true, coordinate, timestamp);
                    }
                }
            }
        }
        Ok(())
    }

    fn push_row(
        &mut self,
        table: &str,
        values: Vec<ColumnValue>,
        version: u64,
        delete: bool,
        coordinate: Coordinate,
        timestamp: u32,
    ) {
        if self.descriptors.get(&self.database, table).is_none() {
            warn!(
                "no descriptor for {}.{}, row dropped at {}",
                self.database, table, coordinate
            );
            self.buffer.mark(coordinate, timestamp);
            return;
        }
        self.buffer.push(
            table,
            RowOp {
                delete,
                values,
                version,
            },
            coordinate,
            timestamp,
        );
    }

    /// UPDATE：主键变了要先给旧键落墓碑，再upsert后像
    fn push_update(
        &mut self,
        table: &str,
        before: &[ColumnValue],
        after: Vec<ColumnValue>,
        version: u64,
        coordinate: Coordinate,
        timestamp: u32,
    ) {
        let Some(descriptor) = self.descriptors.get(&self.database, table) else {
            warn!(
                "no descriptor for {}.{}, row dropped at {}",
                self.database, table, coordinate
            );
            self.buffer.mark(coordinate, timestamp);
            return;
        };
        let pk_indexes = descriptor.primary_key_indexes();
        let column_count = descriptor.columns.len();

        let key_changed = pk_indexes
            .iter()
            .any(|&i| before.get(i) != after.get(i));
        if key_changed && !self.context.config.ignore_deletes {
            let mut old_key_row = vec![ColumnValue::Null; column_count];
            for &i in &pk_indexes {
                if let Some(v) = before.get(i) {
                    old_key_row[i] = v.clone();
                }
            }
            self.buffer.push(
                table,
                RowOp {
                    delete: true,
                    values: old_key_row,
                    version,
                },
                coordinate,
                timestamp,
            );
        }

        self.buffer.push(
            table,
            RowOp {
                delete: false,
                values: after,
                version,
            },
            coordinate,
            timestamp,
        );
    }

    /// 批量flush：按表分组、连续同类段各一次bulk写；
    /// 全部成功后一次性推进checkpoint——要么整批可见且已记账，要么全不
    async fn flush(&mut self) -> RpResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let timestamp = self.buffer.last_timestamp();
        let (tables, last) = self.buffer.take();

        for (table, batch) in &tables {
            let Some(descriptor) = self.descriptors.get(&self.database, table).cloned() else {
                warn!("descriptor vanished for {}.{}", self.database, table);
                continue;
            };
            for run in split_runs(&batch.ops) {
                let rows: Vec<serde_json::Value> = run
                    .iter()
                    .map(|op| render_row(&descriptor, &op.values, op.version, op.delete))
                    .collect();
                self.insert_with_retry(&descriptor.table, rows).await?;
            }
        }

        if let Some(last) = last {
            self.state.coordinate = last;
            self.persist_state()?;
            self.handle.update(|h| {
                let entry = h.appliers.entry(self.database.clone()).or_default();
                entry.coordinate = last;
                entry.last_event_timestamp = timestamp;
            });
        }
        Ok(())
    }

    async fn apply_ddl(
        &mut self,
        statement: &str,
        coordinate: Coordinate,
        timestamp: u32,
    ) -> RpResult<()> {
        let outcome = self.translator.translate(
            statement,
            &self.database,
            &self.state.target_database,
            &mut self.descriptors,
        )?;

        match outcome {
            DdlOutcome::Statements(statements) => {
                for sql in &statements {
                    self.execute_with_retry(sql).await?;
                }
            }
            DdlOutcome::CreateDatabase(name) => {
                if name == self.database {
                    self.target
                        .create_database(&self.state.target_database)
                        .await?;
                }
            }
            DdlOutcome::DropDatabase(name) => {
                if name == self.database {
                    warn!("source dropped database {}, dropping target", name);
                    self.target
                        .drop_database(&self.state.target_database)
                        .await?;
                    self.descriptors = DescriptorMap::new();
                }
            }
            DdlOutcome::Skipped(reason) => {
                warn!("ddl skipped for {}: {} ({})", self.database, reason, statement);
            }
            DdlOutcome::Unsupported(reason) => {
                return Err(RpError::UnsupportedDdl(format!(
                    "{}: {}",
                    reason, statement
                )));
            }
        }

        self.state.coordinate = coordinate;
        self.persist_state()?;
        self.handle.update(|h| {
            let entry = h.appliers.entry(self.database.clone()).or_default();
            entry.coordinate = coordinate;
            entry.last_event_timestamp = timestamp;
        });
        Ok(())
    }

    /// swap：先持久化SWAPPING再动目标端，崩了能幂等续做
    async fn swap(&mut self) -> RpResult<()> {
        if self.state.target_database == self.final_database {
            self.state.phase = Phase::Live;
            self.persist_state()?;
            return Ok(());
        }

        self.state.phase = Phase::Swapping;
        self.persist_state()?;

        let staging = self.state.target_database.clone();
        if self.target.database_exists(&staging).await? {
            if self.target.database_exists(&self.final_database).await? {
                let old = self
                    .context
                    .old_database(&self.database, time_util::now_secs());
                info!("swap: {} -> {}", self.final_database, old);
                self.target
                    .rename_database(&self.final_database, &old)
                    .await?;
            }
            info!("swap: {} -> {}", staging, self.final_database);
            self.target
                .rename_database(&staging, &self.final_database)
                .await?;
        }

        self.state.phase = Phase::Live;
        self.state.target_database = self.final_database.clone();
        self.persist_state()?;
        Ok(())
    }

    /// 周期性OPTIMIZE与过期D_old_*清理
    async fn housekeeping(&mut self) -> RpResult<()> {
        if self.last_optimize.elapsed().as_secs() < self.context.config.optimize_interval {
            return Ok(());
        }
        self.last_optimize = Instant::now();
        self.optimize_tables().await?;
        self.prune_old_databases().await?;
        Ok(())
    }

    async fn optimize_tables(&mut self) -> RpResult<()> {
        for table in self.descriptors.tables_of(&self.database) {
            self.target
                .optimize_table(&self.state.target_database, &table)
                .await?;
        }
        Ok(())
    }

    async fn prune_old_databases(&mut self) -> RpResult<()> {
        let prefix = format!("{}_old_", self.final_database);
        let grace = self.context.config.old_database_grace_period;
        let now = time_util::now_secs();

        for name in self.target.list_databases().await? {
            let Some(ts) = name.strip_prefix(&prefix) else {
                continue;
            };
            let Ok(ts) = ts.parse::<u64>() else { continue };
            if now.saturating_sub(ts) >= grace {
                info!("drop expired old database {}", name);
                self.target.drop_database(&name).await?;
            }
        }
        Ok(())
    }

    async fn insert_with_retry(
        &self,
        table: &str,
        rows: Vec<serde_json::Value>,
    ) -> RpResult<()> {
        let mut attempt = 0u32;
        loop {
            match self
                .target
                .insert_rows(&self.state.target_database, table, rows.clone())
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < TARGET_RETRY_CAP => {
                    attempt += 1;
                    let wait = Duration::from_secs(1 << attempt.min(5));
                    warn!(
                        "target write {}.{} failed (attempt {}): {}, retry in {:?}",
                        self.state.target_database, table, attempt, e, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute_with_retry(&self, sql: &str) -> RpResult<()> {
        let mut attempt = 0u32;
        loop {
            match self.target.execute(sql).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < TARGET_RETRY_CAP => {
                    attempt += 1;
                    let wait = Duration::from_secs(1 << attempt.min(5));
                    warn!("target ddl failed (attempt {}): {}, retry in {:?}", attempt, e, wait);
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn persist_state(&mut self) -> RpResult<()> {
        self.state.descriptors = self.descriptors.all();
        self.state.updated_at = time_util::now_secs();
        self.checkpoint.store(&self.state)
    }

    fn publish_health(&self) {
        let state = match self.state.phase {
            Phase::Initializing => "initializing",
            Phase::Staging => "staging",
            Phase::Swapping => "swapping",
            Phase::Live => "live",
            Phase::Faulted => "faulted",
        };
        let coordinate = self.state.coordinate;
        let paused = self.paused;
        self.handle.update(|h| {
            let entry = h.appliers.entry(self.database.clone()).or_default();
            entry.state = state.to_string();
            entry.coordinate = coordinate;
            entry.paused = paused;
        });
    }

    /// 不可恢复错误：标记FAULTED并持久化，supervisor决定重启
    fn fault(&mut self, err: RpError) -> RpError {
        warn!("applier {} faulted: {}", self.database, err);
        self.state.phase = Phase::Faulted;
        if let Err(persist_err) = self.persist_state() {
            warn!("persist faulted state err: {}", persist_err);
        }
        self.publish_health();
        err
    }
}
