use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::info;

use clickhouse::client::HttpClient;
use common::config::read_config;
use common::err::{RpError, RpResult};
use common::log::tracing_factory::TracingFactory;
use common::server::{ControlHandle, Server};
use spool::checkpoint::{ConsumerCheckpoint, ConsumerState, IngestCheckpoint, Phase};
use web::ControlServer;

use replicator::applier::Applier;
use replicator::context::Context;
use replicator::ingestor::Ingestor;
use replicator::snapshot::{mysql_source_factory, Snapshotter};
use replicator::supervisor::Supervisor;

#[derive(Debug, Parser)]
#[command(name = "replicator", about = "MySQL to ClickHouse replication", version)]
struct Cli {
    /// 配置文件路径
    #[arg(long, short, default_value = "config.yaml")]
    config: String,

    /// debug日志
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// ingestor + 全部applier + 控制面
    RunAll,
    /// 只跑binlog ingest与spool
    BinlogReplicator,
    /// 只跑单个源库的applier
    DbReplicator {
        /// 源库名
        #[arg(long)]
        db: String,

        /// 只做初始快照，完成即退出
        #[arg(long)]
        initial_only: bool,
    },
}

#[tokio::main]
async fn main() -> RpResult<()> {
    let cli = Cli::parse();
    TracingFactory::init_log(cli.debug);

    let config = read_config(&cli.config)?;
    let context = Context::new(config)?;

    match cli.command {
        Command::RunAll => run_all(context).await,
        Command::BinlogReplicator => run_ingestor(context).await,
        Command::DbReplicator { db, initial_only } => {
            if initial_only {
                run_initial_only(context, db).await
            } else {
                run_applier(context, db).await
            }
        }
    }
}

async fn run_all(context: Arc<Context>) -> RpResult<()> {
    let target = Arc::new(HttpClient::new(&context.config.target)?);
    target.ping().await?;

    let (handle, control_rx) = ControlHandle::new();
    let mut control_server = ControlServer::new(
        handle.clone(),
        context.config.http_host.clone(),
        context.config.http_port,
    );
    control_server.start().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c, shutting down");
        let _ = shutdown_tx.send(true);
    });

    let supervisor = Supervisor::new(context, target, handle);
    supervisor.run_all(control_rx, shutdown_rx).await?;

    control_server.shutdown(true).await?;
    Ok(())
}

async fn run_ingestor(context: Arc<Context>) -> RpResult<()> {
    let (handle, _control_rx) = ControlHandle::new();
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl-c, stopping ingestor");
            cancel.store(true, Ordering::Relaxed);
        });
    }

    let ingestor = Ingestor::new(context, handle);
    tokio::task::spawn_blocking(move || ingestor.run(cancel))
        .await
        .map_err(|e| RpError::String(format!("ingestor task err: {}", e)))?
}

async fn run_applier(context: Arc<Context>, database: String) -> RpResult<()> {
    let target = Arc::new(HttpClient::new(&context.config.target)?);
    target.ping().await?;

    let (handle, _control_rx) = ControlHandle::new();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c, stopping applier");
        let _ = cancel_tx.send(true);
    });

    let (_control_tx, control_rx) = mpsc::channel(8);
    let applier = Applier::new(
        context.clone(),
        database,
        target,
        handle,
        mysql_source_factory(&context),
    );
    applier.run(cancel_rx, control_rx).await
}

/// 快照单独跑完就退：staging库建好、数据拷完、状态落盘，
/// 后续db_replicator从这份状态继续tail + swap
async fn run_initial_only(context: Arc<Context>, database: String) -> RpResult<()> {
    let checkpoint = ConsumerCheckpoint::new(&context.config.data_dir, &database);
    if checkpoint.load()?.is_some() {
        return Err(RpError::ConfigErr(format!(
            "state for {} already exists; refusing to re-snapshot (remove state.{} to force)",
            database, database
        )));
    }

    let target = Arc::new(HttpClient::new(&context.config.target)?);
    target.ping().await?;

    let resume = IngestCheckpoint::new(&context.config.data_dir)
        .load()?
        .map(|s| s.coordinate)
        .unwrap_or_default();

    let staging = if context.config.ignore_deletes {
        context.final_database(&database)
    } else {
        context.staging_database(&database)
    };

    let snapshotter = Snapshotter::new(
        context.clone(),
        database.clone(),
        staging.clone(),
        target,
    );
    let factory = mysql_source_factory(&context);
    let rt = tokio::runtime::Handle::current();
    let descriptors = tokio::task::spawn_blocking(move || snapshotter.run(factory, rt))
        .await
        .map_err(|e| RpError::String(format!("snapshot task err: {}", e)))??;

    let mut state = ConsumerState::new(staging);
    state.phase = if context.config.ignore_deletes {
        Phase::Live
    } else {
        Phase::Staging
    };
    state.coordinate = resume;
    state.descriptors = descriptors.all();
    checkpoint.store(&state)?;

    info!("initial snapshot of {} complete, resume point {}", database, resume);
    Ok(())
}
