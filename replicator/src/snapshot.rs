use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Number, Value};
use tracing::{info, warn};

use clickhouse::target::TargetStore;
use clickhouse::translator::{render, DdlTranslator, TranslatorConfig};
use clickhouse::{TOMBSTONE_COLUMN, VERSION_COLUMN};
use common::err::{RpError, RpResult};
use common::schema::descriptor::{ColumnDescriptor, DescriptorMap, TableDescriptor};
use connection::conn::connection::Connection;
use connection::conn::connection_options::ConnectionOptions;

use crate::context::Context;

/// 单分片一页的行数
const PAGE_SIZE: usize = 2_000;
/// 分片失败后从checkpoint重试的次数上限
const SHARD_RETRY_CAP: u32 = 5;

/// 快照读取端的最小操作面（文本协议行）。
/// 生产实现包一个源库连接，测试用内存mock。
pub trait SnapshotSource: Send {
    fn list_tables(&mut self, database: &str) -> RpResult<Vec<String>>;

    fn show_create(&mut self, database: &str, table: &str) -> RpResult<String>;

    /// 单列整型主键的值域，空表为None
    fn min_max_key(&mut self, database: &str, table: &str, pk: &str) -> RpResult<Option<(i64, i64)>>;

    /// 按主键区间取一页，严格按主键升序
    fn fetch_page(
        &mut self,
        database: &str,
        table: &str,
        pk_columns: &[String],
        after: Option<&[String]>,
        upper: Option<i64>,
        limit: usize,
    ) -> RpResult<Vec<Vec<Option<String>>>>;
}

pub type SourceFactory = Arc<dyn Fn() -> RpResult<Box<dyn SnapshotSource>> + Send + Sync>;

/// 分片进度（最后拷贝的主键），中断后续传
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct ShardState {
    last_key: Option<Vec<String>>,
    done: bool,
}

/// C4：整库初始快照。staging库建表后按主键区间分片并行拷贝，
/// 与live事件的重叠由目标端按主键+版本合并解决。
pub struct Snapshotter<T: TargetStore + 'static> {
    context: Arc<Context>,
    database: String,
    staging_database: String,
    target: Arc<T>,
    translator: DdlTranslator,
}

impl<T: TargetStore + 'static> Snapshotter<T> {
    pub fn new(
        context: Arc<Context>,
        database: String,
        staging_database: String,
        target: Arc<T>,
    ) -> Self {
        let translator = DdlTranslator::new(TranslatorConfig::from_config(&context.config));
        Self {
            context,
            database,
            staging_database,
            target,
            translator,
        }
    }

    /// 阻塞运行（调用方放进spawn_blocking），返回种子描述符
    pub fn run(self, factory: SourceFactory, rt: tokio::runtime::Handle) -> RpResult<DescriptorMap> {
        rt.block_on(self.target.create_database(&self.staging_database))?;

        let mut source = (factory.as_ref())()?;
        let tables: Vec<String> = source
            .list_tables(&self.database)?
            .into_iter()
            .filter(|t| self.context.filter.table_matched(&self.database, t))
            .collect();
        info!(
            "snapshot {} -> {}: {} table(s)",
            self.database,
            self.staging_database,
            tables.len()
        );

        let mut descriptors = DescriptorMap::new();
        for table in &tables {
            let create_sql = source.show_create(&self.database, table)?;
            let descriptor = self
                .translator
                .descriptor_for_create(&self.database, &create_sql)?;
            rt.block_on(
                self.target
                    .execute(&render::create_table(&self.staging_database, &descriptor)),
            )?;
            descriptors.insert(descriptor);
        }

        for table in &tables {
            let descriptor = descriptors
                .get(&self.database, table)
                .cloned()
                .ok_or_else(|| RpError::Bug(format!("descriptor missing for {}", table)))?;
            if !descriptor.has_primary_key() {
                warn!(
                    "table {}.{} has no primary key, snapshot skipped",
                    self.database, table
                );
                continue;
            }
            self.copy_table(&descriptor, &mut source, &factory, &rt)?;
        }

        // 全部分片完成，进度文件不再需要
        std::fs::remove_dir_all(self.shard_dir()).ok();
        Ok(descriptors)
    }

    fn copy_table(
        &self,
        descriptor: &TableDescriptor,
        source: &mut Box<dyn SnapshotSource>,
        factory: &SourceFactory,
        rt: &tokio::runtime::Handle,
    ) -> RpResult<()> {
        let shards = self.plan_shards(descriptor, source)?;
        info!(
            "snapshot table {}.{}: {} shard(s)",
            self.database, descriptor.table, shards.len()
        );
        if shards.is_empty() {
            // 空表
            return Ok(());
        }

        if shards.len() == 1 {
            return self.run_shard(descriptor, 0, shards[0], source.as_mut(), rt);
        }

        std::thread::scope(|scope| {
            let mut joins = vec![];
            for (i, bounds) in shards.iter().enumerate() {
                let descriptor = descriptor.clone();
                let bounds = *bounds;
                joins.push(scope.spawn(move || -> RpResult<()> {
                    let mut shard_source = (factory.as_ref())()?;
                    self.run_shard(&descriptor, i, bounds, shard_source.as_mut(), rt)
                }));
            }
            for j in joins {
                j.join()
                    .map_err(|_| RpError::String("snapshot shard panicked".to_string()))??;
            }
            Ok(())
        })
    }

    /// 单列整型主键且并行度>1时按值域均分；其余整表一个分片
    fn plan_shards(
        &self,
        descriptor: &TableDescriptor,
        source: &mut Box<dyn SnapshotSource>,
    ) -> RpResult<Vec<(Option<i64>, Option<i64>)>> {
        let threads = self.context.config.initial_replication_threads.max(1);
        if threads == 1 || descriptor.primary_key.len() != 1 {
            return Ok(vec![(None, None)]);
        }
        let pk = &descriptor.primary_key[0];
        let idx = descriptor
            .column_index(pk)
            .ok_or_else(|| RpError::Bug(format!("pk {} not in descriptor", pk)))?;
        let is_int = descriptor.columns[idx].source_type.starts_with("int")
            || descriptor.columns[idx].source_type.starts_with("bigint")
            || descriptor.columns[idx].source_type.starts_with("smallint")
            || descriptor.columns[idx].source_type.starts_with("mediumint")
            || descriptor.columns[idx].source_type.starts_with("tinyint");
        if !is_int {
            return Ok(vec![(None, None)]);
        }

        let Some((min, max)) = source.min_max_key(&self.database, &descriptor.table, pk)? else {
            // 空表
            return Ok(vec![]);
        };
        let span = (max - min + 1).max(1);
        let width = (span + threads as i64 - 1) / threads as i64;

        let mut shards = vec![];
        for i in 0..threads as i64 {
            let lower = min + i * width - 1;
            let upper = (min + (i + 1) * width - 1).min(max);
            if lower >= max {
                break;
            }
            shards.push((Some(lower), Some(upper)));
        }
        Ok(shards)
    }

    fn run_shard(
        &self,
        descriptor: &TableDescriptor,
        shard: usize,
        bounds: (Option<i64>, Option<i64>),
        source: &mut dyn SnapshotSource,
        rt: &tokio::runtime::Handle,
    ) -> RpResult<()> {
        let mut attempt = 0u32;
        loop {
            match self.run_shard_once(descriptor, shard, bounds, source, rt) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < SHARD_RETRY_CAP => {
                    attempt += 1;
                    warn!(
                        "shard {} of {}.{} failed: {}, resume from checkpoint ({}/{})",
                        shard, self.database, descriptor.table, e, attempt, SHARD_RETRY_CAP
                    );
                    std::thread::sleep(Duration::from_secs(1 << attempt.min(5)));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn run_shard_once(
        &self,
        descriptor: &TableDescriptor,
        shard: usize,
        bounds: (Option<i64>, Option<i64>),
        source: &mut dyn SnapshotSource,
        rt: &tokio::runtime::Handle,
    ) -> RpResult<()> {
        let (lower, upper) = bounds;
        let mut state = self.load_shard_state(&descriptor.table, shard)?;
        if state.done {
            return Ok(());
        }
        if state.last_key.is_none() {
            state.last_key = lower.map(|l| vec![l.to_string()]);
        }

        let pk_columns = descriptor.primary_key.clone();
        let pk_indexes = descriptor.primary_key_indexes();

        loop {
            let after: Option<Vec<String>> = state.last_key.clone();
            let page = source.fetch_page(
                &self.database,
                &descriptor.table,
                &pk_columns,
                after.as_deref(),
                upper,
                PAGE_SIZE,
            )?;
            if page.is_empty() {
                break;
            }

            let rows: Vec<Value> = page.iter().map(|r| snapshot_row(descriptor, r)).collect();
            let count = page.len();

            // 页内最后一行的主键做续传点
            let last = &page[count - 1];
            let key: Vec<String> = pk_indexes
                .iter()
                .map(|&i| last.get(i).cloned().flatten().unwrap_or_default())
                .collect();

            rt.block_on(
                self.target
                    .insert_rows(&self.staging_database, &descriptor.table, rows),
            )?;

            state.last_key = Some(key);
            self.store_shard_state(&descriptor.table, shard, &state)?;

            if count < PAGE_SIZE {
                break;
            }
        }

        state.done = true;
        self.store_shard_state(&descriptor.table, shard, &state)
    }

    fn shard_dir(&self) -> PathBuf {
        PathBuf::from(&self.context.config.data_dir)
            .join("snapshot")
            .join(&self.database)
    }

    fn shard_path(&self, table: &str, shard: usize) -> PathBuf {
        self.shard_dir().join(format!("{}.{}.json", table, shard))
    }

    fn load_shard_state(&self, table: &str, shard: usize) -> RpResult<ShardState> {
        let path = self.shard_path(table, shard);
        if !path.exists() {
            return Ok(ShardState::default());
        }
        let body = std::fs::read(&path)?;
        serde_json::from_slice(&body)
            .map_err(|e| RpError::StateCorrupted(format!("{}: {}", path.display(), e)))
    }

    fn store_shard_state(&self, table: &str, shard: usize, state: &ShardState) -> RpResult<()> {
        let path = self.shard_path(table, shard);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let body = serde_json::to_vec(state)
            .map_err(|e| RpError::String(format!("shard state encode err: {}", e)))?;
        std::fs::write(&path, body)?;
        Ok(())
    }
}

/// 文本协议的一行 -> JSONEachRow对象，版本0（任何live事件都更新它）
pub fn snapshot_row(descriptor: &TableDescriptor, cells: &[Option<String>]) -> Value {
    let mut row = Map::with_capacity(descriptor.columns.len() + 2);
    for (i, column) in descriptor.columns.iter().enumerate() {
        let cell = cells.get(i).cloned().flatten();
        row.insert(column.name.clone(), text_cell(column, cell));
    }
    row.insert(VERSION_COLUMN.to_string(), Value::Number(Number::from(0)));
    row.insert(TOMBSTONE_COLUMN.to_string(), Value::Number(Number::from(0)));
    Value::Object(row)
}

fn text_cell(column: &ColumnDescriptor, cell: Option<String>) -> Value {
    let Some(s) = cell else {
        return Value::Null;
    };
    let t = column.source_type.as_str();

    if t.starts_with("tinyint(1)") {
        return Value::Bool(s != "0");
    }
    if t.starts_with("tinyint")
        || t.starts_with("smallint")
        || t.starts_with("mediumint")
        || t.starts_with("int")
        || t.starts_with("integer")
        || t.starts_with("bigint")
        || t.starts_with("year")
    {
        if column.is_unsigned() {
            if let Ok(v) = s.parse::<u64>() {
                return Value::Number(Number::from(v));
            }
        } else if let Ok(v) = s.parse::<i64>() {
            return Value::Number(Number::from(v));
        }
        return Value::String(s);
    }
    if t.starts_with("float") || t.starts_with("double") || t.starts_with("real") {
        if let Ok(v) = s.parse::<f64>() {
            if let Some(n) = Number::from_f64(v) {
                return Value::Number(n);
            }
        }
        return Value::String(s);
    }
    if t.starts_with("enum") || t.starts_with("set") {
        return Value::String(s.to_lowercase());
    }
    // decimal、日期时间、文本、json都按字符串透传
    Value::String(s)
}

/// 源库连接包装成SnapshotSource
pub struct MysqlSnapshotSource {
    conn: Connection,
}

impl MysqlSnapshotSource {
    pub fn connect(options: ConnectionOptions) -> RpResult<Self> {
        let mut conn = Connection::new(options);
        conn.connect()?;
        Ok(Self { conn })
    }
}

pub fn mysql_source_factory(context: &Arc<Context>) -> SourceFactory {
    let source = context.config.source.clone();
    Arc::new(move || {
        let options = ConnectionOptions::new(
            source.host.clone(),
            source.port,
            source.user.clone(),
            source.password.clone(),
        )
        .with_read_timeout(Duration::from_secs(source.read_timeout));
        Ok(Box::new(MysqlSnapshotSource::connect(options)?) as Box<dyn SnapshotSource>)
    })
}

impl SnapshotSource for MysqlSnapshotSource {
    fn list_tables(&mut self, database: &str) -> RpResult<Vec<String>> {
        let result = self.conn.query(&format!(
            "SHOW FULL TABLES FROM `{}` WHERE Table_type = 'BASE TABLE'",
            database
        ))?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|r| r.into_iter().next().flatten())
            .collect())
    }

    fn show_create(&mut self, database: &str, table: &str) -> RpResult<String> {
        let result = self
            .conn
            .query(&format!("SHOW CREATE TABLE `{}`.`{}`", database, table))?;
        result
            .rows
            .first()
            .and_then(|r| r.get(1).cloned().flatten())
            .ok_or_else(|| RpError::ProtocolErr(format!("empty SHOW CREATE for {}", table)))
    }

    fn min_max_key(&mut self, database: &str, table: &str, pk: &str) -> RpResult<Option<(i64, i64)>> {
        let result = self.conn.query(&format!(
            "SELECT MIN(`{}`), MAX(`{}`) FROM `{}`.`{}`",
            pk, pk, database, table
        ))?;
        let Some(row) = result.rows.first() else {
            return Ok(None);
        };
        match (row.first().cloned().flatten(), row.get(1).cloned().flatten()) {
            (Some(min), Some(max)) => Ok(Some((
                min.parse::<i64>()?,
                max.parse::<i64>()?,
            ))),
            _ => Ok(None),
        }
    }

    fn fetch_page(
        &mut self,
        database: &str,
        table: &str,
        pk_columns: &[String],
        after: Option<&[String]>,
        upper: Option<i64>,
        limit: usize,
    ) -> RpResult<Vec<Vec<Option<String>>>> {
        let mut predicates = vec![];
        if let Some(after) = after {
            predicates.push(page_predicate(pk_columns, after));
        }
        if let Some(upper) = upper {
            predicates.push(format!("`{}` <= {}", pk_columns[0], upper));
        }
        let where_clause = if predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", predicates.join(" AND "))
        };
        let order = pk_columns
            .iter()
            .map(|c| format!("`{}`", c))
            .collect::<Vec<_>>()
            .join(", ");

        let result = self.conn.query(&format!(
            "SELECT * FROM `{}`.`{}`{} ORDER BY {} LIMIT {}",
            database, table, where_clause, order, limit
        ))?;
        Ok(result.rows)
    }
}

/// 主键分页谓词；复合主键用行构造器比较
fn page_predicate(pk_columns: &[String], after: &[String]) -> String {
    let cols = pk_columns
        .iter()
        .map(|c| format!("`{}`", c))
        .collect::<Vec<_>>()
        .join(", ");
    let vals = after
        .iter()
        .map(|v| format!("'{}'", v.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect::<Vec<_>>()
        .join(", ");
    if pk_columns.len() == 1 {
        format!("{} > {}", cols, vals)
    } else {
        format!("({}) > ({})", cols, vals)
    }
}
