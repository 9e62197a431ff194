use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use clickhouse::client::HttpClient;
use common::err::RpResult;
use common::server::{ControlCommand, ControlHandle, ControlRequest};
use common::time_util;
use spool::checkpoint::{ConsumerCheckpoint, IngestCheckpoint};
use spool::retention::RetentionSweeper;

use crate::applier::Applier;
use crate::context::Context;
use crate::ingestor::Ingestor;
use crate::snapshot::{mysql_source_factory, SourceFactory};

/// retention扫描间隔
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// 健康与发现tick
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// C5：任务生命周期的所有者。一个ingestor + 每源库一个applier，
/// 异常退出按退避重启，到龄干净重启；对外暴露健康与控制面。
pub struct Supervisor {
    context: Arc<Context>,
    target: Arc<HttpClient>,
    handle: ControlHandle,
    source_factory: SourceFactory,
    /// 源库名 -> 该applier的控制通道
    controls: DashMap<String, mpsc::Sender<ControlCommand>>,
}

impl Supervisor {
    pub fn new(context: Arc<Context>, target: Arc<HttpClient>, handle: ControlHandle) -> Arc<Self> {
        let source_factory = mysql_source_factory(&context);
        Arc::new(Self {
            context,
            target,
            handle,
            source_factory,
            controls: DashMap::new(),
        })
    }

    pub async fn run_all(
        self: Arc<Self>,
        mut control_rx: mpsc::Receiver<ControlRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) -> RpResult<()> {
        let ingest_cancel = Arc::new(AtomicBool::new(false));
        {
            let s = self.clone();
            let cancel = ingest_cancel.clone();
            tokio::spawn(async move { s.supervise_ingestor(cancel).await });
        }
        {
            let s = self.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let sweeper = RetentionSweeper::new(s.context.spool_config(), s.context.floors.clone());
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                            if let Err(e) = tokio::task::block_in_place(|| sweeper.sweep()) {
                                warn!("retention sweep err: {}", e);
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            });
        }

        for database in self.discover_databases()? {
            self.clone().spawn_applier(database, shutdown.clone());
        }

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("supervisor shutting down");
                        ingest_cancel.store(true, Ordering::Relaxed);
                        break;
                    }
                }
                Some(request) = control_rx.recv() => {
                    self.dispatch(request).await;
                }
                _ = tick.tick() => {
                    self.refresh_health();
                    for database in self.discover_databases()? {
                        if !self.controls.contains_key(&database) {
                            info!("new database discovered: {}", database);
                            self.clone().spawn_applier(database, shutdown.clone());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// 启动时已知的库：配置里的字面名 + 已有state文件 + ingestor见过的
    fn discover_databases(&self) -> RpResult<Vec<String>> {
        let mut names = self.context.filter.literal_databases();
        for (db, _) in ConsumerCheckpoint::load_all(&self.context.config.data_dir)? {
            if !names.contains(&db) {
                names.push(db);
            }
        }
        for entry in self.context.seen_databases.iter() {
            if !names.contains(entry.key()) {
                names.push(entry.key().clone());
            }
        }
        names.retain(|db| self.context.filter.database_matched(db));
        Ok(names)
    }

    async fn dispatch(&self, request: ControlRequest) {
        // 先clone出sender，别把DashMap guard带过await
        let tx = self.controls.get(&request.database).map(|r| r.value().clone());
        match tx {
            Some(tx) => {
                if tx.send(request.command).await.is_err() {
                    warn!("applier {} control channel closed", request.database);
                }
            }
            None => warn!("control for unknown applier {}", request.database),
        }
    }

    fn refresh_health(&self) {
        let ingest = IngestCheckpoint::new(&self.context.config.data_dir)
            .load()
            .ok()
            .flatten();
        let now = time_util::now_secs();
        self.handle.update(|h| {
            if let Some(state) = ingest {
                h.ingestor.coordinate = state.coordinate;
            }
            h.refresh_lag(now);
        });
    }

    async fn supervise_ingestor(self: Arc<Self>, cancel: Arc<AtomicBool>) {
        let mut restarts = 0u64;
        loop {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            let ingestor = Ingestor::new(self.context.clone(), self.handle.clone());
            let c = cancel.clone();
            let result = tokio::task::spawn_blocking(move || ingestor.run(c)).await;

            match result {
                Ok(Ok(())) => return,
                Ok(Err(e)) => error!("ingestor exited: {}", e),
                Err(e) => error!("ingestor task err: {}", e),
            }
            restarts += 1;
            self.handle.update(|h| h.ingestor.restarts = restarts);
            let backoff = self.backoff(restarts);
            warn!("restart ingestor in {:?}", backoff);
            tokio::time::sleep(backoff).await;
        }
    }

    fn spawn_applier(self: Arc<Self>, database: String, shutdown: watch::Receiver<bool>) {
        tokio::spawn(async move {
            self.supervise_applier(database, shutdown).await;
        });
    }

    async fn supervise_applier(&self, database: String, shutdown: watch::Receiver<bool>) {
        let mut restarts = 0u64;
        loop {
            if *shutdown.borrow() {
                return;
            }

            let (control_tx, control_rx) = mpsc::channel(8);
            self.controls.insert(database.clone(), control_tx);
            let (cancel_tx, cancel_rx) = watch::channel(false);

            let applier = Applier::new(
                self.context.clone(),
                database.clone(),
                self.target.clone(),
                self.handle.clone(),
                self.source_factory.clone(),
            );

            let run = applier.run(cancel_rx, control_rx);
            tokio::pin!(run);
            let age = tokio::time::sleep(Duration::from_secs(
                self.context.config.auto_restart_interval,
            ));
            tokio::pin!(age);
            let mut shutdown_watch = shutdown.clone();

            tokio::select! {
                result = &mut run => {
                    match result {
                        Ok(()) => return,
                        Err(e) => {
                            restarts += 1;
                            error!("applier {} exited: {}", database, e);
                            self.handle.update(|h| {
                                h.appliers.entry(database.clone()).or_default().restarts = restarts;
                            });
                            let backoff = self.backoff(restarts);
                            warn!("restart applier {} in {:?}", database, backoff);
                            tokio::time::sleep(backoff).await;
                        }
                    }
                }
                _ = &mut age => {
                    // 到龄干净重启，回收内存
                    info!("applier {} reached auto_restart_interval, clean restart", database);
                    let _ = cancel_tx.send(true);
                    let _ = (&mut run).await;
                }
                _ = shutdown_watch.changed() => {
                    let _ = cancel_tx.send(true);
                    let _ = (&mut run).await;
                    return;
                }
            }
        }
    }

    fn backoff(&self, restarts: u64) -> Duration {
        let cap = self.context.config.restart_backoff_cap.max(1);
        Duration::from_secs((1u64 << restarts.min(6)).min(cap))
    }
}
