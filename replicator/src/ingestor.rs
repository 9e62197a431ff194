use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use binlog::decoder::event_decoder::EventDecoder;
use binlog::events::BinlogEvent;
use common::err::{RpError, RpResult};
use common::model::coordinate::Coordinate;
use common::model::event::{ChangeEvent, EventKind, RowImage, UpdateImage};
use common::server::ControlHandle;
use connection::conn::connection::Connection;
use connection::conn::connection_options::ConnectionOptions;
use spool::writer::SpoolWriter;

use crate::context::Context;

/// 多少事件或多久没刷就落盘并推进ingest checkpoint
const FLUSH_EVERY_EVENTS: usize = 500;
const FLUSH_EVERY: Duration = Duration::from_millis(200);

/// 重连退避上限
const RECONNECT_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// C1：以replica身份拉binlog流，规范化成变更事件写入spool。
/// 同步阻塞实现，由supervisor放进blocking线程跑。
pub struct Ingestor {
    context: Arc<Context>,
    handle: ControlHandle,
    server_id: u32,
}

impl Ingestor {
    pub fn new(context: Arc<Context>, handle: ControlHandle) -> Self {
        // 与源端其他replica错开即可
        let server_id = 1_000 + rand::random::<u32>() % 1_000_000;
        Self {
            context,
            handle,
            server_id,
        }
    }

    /// 断线重连循环；致命错误向上抛给supervisor
    #[instrument(skip_all)]
    pub fn run(&self, cancel: Arc<AtomicBool>) -> RpResult<()> {
        let mut backoff = Duration::from_secs(1);
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Ok(());
            }
            match self.run_stream(&cancel) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() || matches!(e, RpError::IoError(_)) => {
                    warn!("source stream broken: {}, reconnect in {:?}", e, backoff);
                    self.handle
                        .update(|h| h.ingestor.state = "reconnecting".to_string());
                    let deadline = Instant::now() + backoff;
                    while Instant::now() < deadline && !cancel.load(Ordering::Relaxed) {
                        std::thread::sleep(Duration::from_millis(100));
                    }
                    backoff = (backoff * 2).min(RECONNECT_BACKOFF_CAP);
                }
                Err(e) => {
                    self.handle
                        .update(|h| h.ingestor.state = "faulted".to_string());
                    return Err(e);
                }
            }
        }
    }

    fn run_stream(&self, cancel: &AtomicBool) -> RpResult<()> {
        let mut writer = SpoolWriter::open(self.context.spool_config())?;

        let source = &self.context.config.source;
        let options = ConnectionOptions::new(
            source.host.clone(),
            source.port,
            source.user.clone(),
            source.password.clone(),
        )
        .with_read_timeout(Duration::from_secs(source.read_timeout));
        let mut conn = Connection::new(options);
        conn.connect()?;

        // 从spool实际末尾续传；没有就取checkpoint，再没有取源端当前tail
        let resume = writer.last_appended().or(writer.durable_coordinate());
        let (file_name, mut current) = self.resolve_start(&mut conn, resume)?;
        info!(
            "binlog dump from {} at {} (server_id {})",
            file_name, current, self.server_id
        );
        self.handle.update(|h| {
            h.ingestor.state = "running".to_string();
            h.ingestor.coordinate = current;
        });

        let mut stream = conn.binlog_dump(self.server_id, &file_name, current.offset)?;
        let mut decoder = EventDecoder::new();

        let mut transaction_id: Option<String> = None;
        let mut last_ddl: Option<(Option<String>, String)> = None;
        let mut pending = 0usize;
        let mut last_flush = Instant::now();

        loop {
            if cancel.load(Ordering::Relaxed) {
                // 退出前把当前事件写完并fsync
                writer.flush()?;
                return Ok(());
            }

            let raw = stream.read_event()?;
            let (header, event) = match decoder.decode(&raw) {
                Ok(x) => x,
                Err(RpError::DecodeErr(msg)) => {
                    // 帧完整、体解不开：告警后跳过
                    warn!("undecodable event at {}: {}", current, msg);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let coordinate = Coordinate::new(current.file_index, header.log_pos as u64);

            match event {
                BinlogEvent::Rotate(rotate) => {
                    current = Coordinate::from_file_name(&rotate.next_file_name, rotate.position)?;
                    continue;
                }
                BinlogEvent::FormatDescription(_) | BinlogEvent::TableMap(_) => {}
                BinlogEvent::Gtid(gtid) => {
                    transaction_id = Some(gtid.gtid);
                }
                BinlogEvent::Xid(_) => {
                    transaction_id = None;
                }
                BinlogEvent::Ignored(_) => {}

                BinlogEvent::WriteRows(rows) => {
                    if self.context.filter.table_matched(&rows.database, &rows.table) {
                        self.context.seen_databases.insert(rows.database.clone(), ());
                        let kind = EventKind::Insert {
                            rows: rows.rows.into_iter().map(RowImage).collect(),
                        };
                        self.append(
                            &mut writer,
                            coordinate,
                            &transaction_id,
                            rows.database,
                            rows.table,
                            header.timestamp,
                            kind,
                        )?;
                        pending += 1;
                    }
                }
                BinlogEvent::DeleteRows(rows) => {
                    if self.context.filter.table_matched(&rows.database, &rows.table) {
                        self.context.seen_databases.insert(rows.database.clone(), ());
                        let kind = EventKind::Delete {
                            rows: rows.rows.into_iter().map(RowImage).collect(),
                        };
                        self.append(
                            &mut writer,
                            coordinate,
                            &transaction_id,
                            rows.database,
                            rows.table,
                            header.timestamp,
                            kind,
                        )?;
                        pending += 1;
                    }
                }
                BinlogEvent::UpdateRows(rows) => {
                    if self.context.filter.table_matched(&rows.database, &rows.table) {
                        self.context.seen_databases.insert(rows.database.clone(), ());
                        let kind = EventKind::Update {
                            rows: rows
                                .rows
                                .into_iter()
                                .map(|(before, after)| UpdateImage {
                                    key: before,
                                    row: after,
                                })
                                .collect(),
                        };
                        self.append(
                            &mut writer,
                            coordinate,
                            &transaction_id,
                            rows.database,
                            rows.table,
                            header.timestamp,
                            kind,
                        )?;
                        pending += 1;
                    }
                }

                BinlogEvent::Query(query) => {
                    if query.is_transaction_marker() {
                        transaction_id = None;
                    } else if let Some((database, statement)) = classify_query(&query) {
                        if self.context.filter.database_matched(&database) {
                            // 同一事务里跨库DDL没有原子性保证
                            if let Some((prev_tx, prev_db)) = &last_ddl {
                                if prev_tx.is_some()
                                    && *prev_tx == transaction_id
                                    && *prev_db != database
                                {
                                    warn!(
                                        "cross-database ddl within one transaction ({} then {}), no atomicity",
                                        prev_db, database
                                    );
                                }
                            }
                            last_ddl = Some((transaction_id.clone(), database.clone()));
                            self.context.seen_databases.insert(database.clone(), ());
                            self.append(
                                &mut writer,
                                coordinate,
                                &transaction_id,
                                database,
                                String::new(),
                                header.timestamp,
                                EventKind::Ddl { statement },
                            )?;
                            pending += 1;
                        }
                    }
                }
            }

            if coordinate.offset != 0 {
                current = coordinate;
            }

            if pending >= FLUSH_EVERY_EVENTS || (pending > 0 && last_flush.elapsed() >= FLUSH_EVERY)
            {
                writer.flush()?;
                pending = 0;
                last_flush = Instant::now();
                let durable = writer.durable_coordinate().unwrap_or(current);
                let timestamp = header.timestamp;
                self.handle.update(|h| {
                    h.ingestor.coordinate = durable;
                    h.ingestor.last_event_timestamp = timestamp;
                });
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn append(
        &self,
        writer: &mut SpoolWriter,
        coordinate: Coordinate,
        transaction_id: &Option<String>,
        database: String,
        table: String,
        timestamp: u32,
        kind: EventKind,
    ) -> RpResult<()> {
        writer.append(ChangeEvent {
            coordinate,
            transaction_id: transaction_id.as_ref().map(|t| t.as_bytes().to_vec()),
            database,
            table,
            timestamp,
            kind,
        })
    }

    /// checkpoint对应的binlog文件还在就从那续，不在（已purge）落到当前tail
    fn resolve_start(
        &self,
        conn: &mut Connection,
        resume: Option<Coordinate>,
    ) -> RpResult<(String, Coordinate)> {
        if let Some(c) = resume.filter(|c| !c.is_zero()) {
            let logs = conn.query("SHOW BINARY LOGS")?;
            for row in &logs.rows {
                let Some(name) = row.first().cloned().flatten() else {
                    continue;
                };
                if let Ok(parsed) = Coordinate::from_file_name(&name, 0) {
                    if parsed.file_index == c.file_index {
                        return Ok((name, c));
                    }
                }
            }
            warn!("checkpointed binlog {} purged at source, fall to current tail", c);
        }

        let status = conn.query("SHOW MASTER STATUS")?;
        let row = status
            .rows
            .first()
            .ok_or_else(|| RpError::ProtocolErr("empty SHOW MASTER STATUS".to_string()))?;
        let file = row
            .first()
            .cloned()
            .flatten()
            .ok_or_else(|| RpError::ProtocolErr("no binlog file in master status".to_string()))?;
        let position = row
            .get(1)
            .cloned()
            .flatten()
            .unwrap_or_else(|| "4".to_string())
            .parse::<u64>()?;
        Ok((file.clone(), Coordinate::from_file_name(&file, position)?))
    }
}

/// Query事件分流：statement格式的行变更丢弃（告警），
/// 其余按DDL透传；库级DDL从语句里取库名
fn classify_query(query: &binlog::events::query_event::QueryEvent) -> Option<(String, String)> {
    let statement = query.query.trim().to_string();
    let head: Vec<String> = statement
        .split_whitespace()
        .take(2)
        .map(|t| t.to_lowercase())
        .collect();

    match head.first().map(|s| s.as_str()) {
        Some("insert") | Some("update") | Some("delete") | Some("replace") => {
            warn!(
                "statement-format row change discarded (binlog_format != ROW?): {:.120}",
                statement
            );
            None
        }
        Some("create") | Some("drop") if head.get(1).map(|s| s.as_str()) == Some("database") => {
            let name = statement
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .trim_matches('`')
                .trim_end_matches(';')
                .trim_matches('`')
                .to_string();
            Some((name, statement))
        }
        Some(_) => {
            if query.schema.is_empty() {
                None
            } else {
                Some((query.schema.clone(), statement))
            }
        }
        None => None,
    }
}
