use sqlparser::ast::{
    AlterTableOperation, ColumnDef, ColumnOption, ColumnOptionDef, MySQLColumnPosition,
    ObjectName, Statement, TableConstraint,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use common::err::{RpError, RpResult};
use common::schema::descriptor::{ColumnDescriptor, DescriptorMap, TableDescriptor};

use crate::translator::render;
use crate::translator::type_map::TypeMapper;
use crate::translator::TranslatorConfig;

/// 一条源DDL翻译后的去向
#[derive(Debug, PartialEq)]
pub enum DdlOutcome {
    /// 目标侧需顺序执行的语句；描述符已同步变更
    Statements(Vec<String>),
    /// 库级操作，由applier的阶段机处理
    CreateDatabase(String),
    DropDatabase(String),
    /// 不支持但无害，跳过并告警
    Skipped(String),
    /// 明确不支持（主键变更），上游按致命处理
    Unsupported(String),
}

/// 源DDL -> 目标DDL + 描述符变更。
/// 结构解析交给sqlparser（MySQL方言），类型映射走TypeMapper，
/// sqlparser覆盖不到的语法（RENAME TABLE、索引增删）手工解析。
pub struct DdlTranslator {
    config: TranslatorConfig,
    type_mapper: TypeMapper,
}

impl DdlTranslator {
    pub fn new(config: TranslatorConfig) -> Self {
        let type_mapper = TypeMapper::new(config.clone());
        Self {
            config,
            type_mapper,
        }
    }

    pub fn translate(
        &self,
        sql: &str,
        default_database: &str,
        target_database: &str,
        descriptors: &mut DescriptorMap,
    ) -> RpResult<DdlOutcome> {
        let sql = sql.trim().trim_end_matches(';').trim();
        let head = head_tokens(sql, 3);

        match head.as_slice() {
            [a, b, ..] if a == "create" && b == "database" => {
                return Ok(DdlOutcome::CreateDatabase(last_word_unquoted(sql)));
            }
            [a, b, ..] if a == "drop" && b == "database" => {
                return Ok(DdlOutcome::DropDatabase(last_word_unquoted(sql)));
            }
            [a, b, ..] if a == "rename" && b == "table" => {
                return self.rename_table(sql, default_database, target_database, descriptors);
            }
            [a, ..] if a == "truncate" => {
                let name = last_word_unquoted(sql);
                return Ok(DdlOutcome::Statements(vec![format!(
                    "TRUNCATE TABLE `{}`.`{}`",
                    target_database, name
                )]));
            }
            [a, b, ..] if a == "drop" && b == "table" => {
                return self.drop_table(sql, default_database, descriptors, target_database);
            }
            [a, b, ..] if a == "alter" && b == "table" => {
                let lower = sql.to_lowercase();
                if lower.contains("primary key") {
                    return Ok(DdlOutcome::Unsupported("primary key change".to_string()));
                }
                if lower.contains("character set") || lower.contains("charset") {
                    return Ok(DdlOutcome::Skipped("character set change".to_string()));
                }
                if let Some(outcome) =
                    self.try_index_ddl(sql, default_database, target_database, descriptors)?
                {
                    return Ok(outcome);
                }
                return self.alter_table(sql, default_database, target_database, descriptors);
            }
            [a, ..] if a == "create" => {
                return self.create_table(sql, default_database, target_database, descriptors);
            }
            _ => {}
        }

        Ok(DdlOutcome::Skipped(format!(
            "not a table ddl: {}",
            head.join(" ")
        )))
    }

    /// snapshot路径：SHOW CREATE TABLE产物 -> 描述符（不产出语句）
    pub fn descriptor_for_create(&self, database: &str, sql: &str) -> RpResult<TableDescriptor> {
        let statement = parse_single(sql)?;
        match statement {
            Statement::CreateTable {
                name,
                columns,
                constraints,
                ..
            } => self.build_descriptor(database, &name, &columns, &constraints),
            _ => Err(RpError::TranslateErr(format!(
                "not a CREATE TABLE: {}",
                sql
            ))),
        }
    }

    fn create_table(
        &self,
        sql: &str,
        default_database: &str,
        target_database: &str,
        descriptors: &mut DescriptorMap,
    ) -> RpResult<DdlOutcome> {
        let statement = parse_single(sql)?;
        let Statement::CreateTable {
            name,
            columns,
            constraints,
            like,
            ..
        } = statement
        else {
            return Ok(DdlOutcome::Skipped("unparsed create".to_string()));
        };

        // CREATE TABLE LIKE：复制源描述符
        if let Some(like_name) = like {
            let (_, src_table) = split_object_name(&like_name);
            let Some(src) = descriptors.get(default_database, &src_table) else {
                return Err(RpError::TranslateErr(format!(
                    "CREATE TABLE LIKE unknown table {}",
                    src_table
                )));
            };
            let (_, new_table) = split_object_name(&name);
            let mut descriptor = src.clone();
            descriptor.table = new_table;
            let stmt = render::create_table(target_database, &descriptor);
            descriptors.insert(descriptor);
            return Ok(DdlOutcome::Statements(vec![stmt]));
        }

        let descriptor = self.build_descriptor(default_database, &name, &columns, &constraints)?;
        let stmt = render::create_table(target_database, &descriptor);
        descriptors.insert(descriptor);
        Ok(DdlOutcome::Statements(vec![stmt]))
    }

    fn build_descriptor(
        &self,
        database: &str,
        name: &ObjectName,
        columns: &[ColumnDef],
        constraints: &[TableConstraint],
    ) -> RpResult<TableDescriptor> {
        let (_, table) = split_object_name(name);

        let mut primary_key: Vec<String> = vec![];
        for c in constraints {
            if let TableConstraint::PrimaryKey { columns: pk, .. } = c {
                primary_key = pk.iter().map(|i| i.value.clone()).collect();
            }
        }

        let mut cols = Vec::with_capacity(columns.len());
        for def in columns {
            let col = self.column_descriptor(&table, def)?;
            if primary_key.is_empty() && is_inline_primary(&def.options) {
                primary_key.push(col.name.clone());
            }
            cols.push(col);
        }

        Ok(TableDescriptor {
            database: database.to_string(),
            table: table.clone(),
            columns: cols,
            primary_key,
            partition_by: self.config.partition_by_for(database, &table),
            indexes: self.config.indexes_for(database, &table),
        })
    }

    fn column_descriptor(&self, table: &str, def: &ColumnDef) -> RpResult<ColumnDescriptor> {
        let source_type = def.data_type.to_string().to_lowercase();
        let mapped = self.type_mapper.map(table, &def.name.value, &source_type);
        if mapped.fallback {
            warn!(
                "unknown source type {:?} for {}.{}, fallback to {}",
                source_type, table, def.name.value, mapped.target_type
            );
        }
        Ok(ColumnDescriptor {
            name: def.name.value.clone(),
            source_type,
            target_type: mapped.target_type,
            nullable: nullable_of(&def.options),
        })
    }

    fn drop_table(
        &self,
        sql: &str,
        default_database: &str,
        descriptors: &mut DescriptorMap,
        target_database: &str,
    ) -> RpResult<DdlOutcome> {
        let statement = parse_single(sql)?;
        let Statement::Drop { names, .. } = statement else {
            return Ok(DdlOutcome::Skipped("unparsed drop".to_string()));
        };

        let mut statements = vec![];
        for name in names {
            let (_, table) = split_object_name(&name);
            descriptors.remove(default_database, &table);
            statements.push(format!(
                "DROP TABLE IF EXISTS `{}`.`{}`",
                target_database, table
            ));
        }
        Ok(DdlOutcome::Statements(statements))
    }

    /// RENAME TABLE a TO b [, c TO d]，sqlparser旧版不认，手工解析
    fn rename_table(
        &self,
        sql: &str,
        default_database: &str,
        target_database: &str,
        descriptors: &mut DescriptorMap,
    ) -> RpResult<DdlOutcome> {
        let body = &sql["rename table".len()..];
        let mut statements = vec![];
        for pair in body.split(',') {
            let lower = pair.to_lowercase();
            let Some(to_pos) = lower.find(" to ") else {
                return Err(RpError::TranslateErr(format!("bad RENAME TABLE: {}", sql)));
            };
            let old = unquote(pair[..to_pos].trim());
            let new = unquote(pair[to_pos + 4..].trim());
            let old = strip_db_prefix(&old);
            let new = strip_db_prefix(&new);

            // 两步原子状态变迁：插新键、删旧键
            descriptors.rename(default_database, &old, &new);
            statements.push(format!(
                "RENAME TABLE `{}`.`{}` TO `{}`.`{}`",
                target_database, old, target_database, new
            ));
        }
        Ok(DdlOutcome::Statements(statements))
    }

    /// ADD/DROP INDEX类单操作ALTER，手工解析
    fn try_index_ddl(
        &self,
        sql: &str,
        default_database: &str,
        target_database: &str,
        descriptors: &mut DescriptorMap,
    ) -> RpResult<Option<DdlOutcome>> {
        let lower = sql.to_lowercase();
        let table = alter_table_name(sql)?;

        if let Some(pos) = find_any(&lower, &["add index ", "add key "]) {
            let tail = &sql[pos.1..];
            let Some(paren) = tail.find('(') else {
                return Ok(Some(DdlOutcome::Skipped("index without columns".to_string())));
            };
            let index_name = unquote(tail[..paren].trim());
            let columns = &tail[paren..];
            let fragment = format!(
                "INDEX `{}` {} TYPE minmax GRANULARITY 1",
                index_name,
                columns.trim()
            );
            if let Some(d) = descriptors.get(default_database, &table) {
                let mut d = d.clone();
                d.indexes.push(fragment.clone());
                descriptors.insert(d);
            }
            return Ok(Some(DdlOutcome::Statements(vec![format!(
                "ALTER TABLE `{}`.`{}` ADD {}",
                target_database, table, fragment
            )])));
        }

        if let Some(pos) = find_any(&lower, &["drop index ", "drop key "]) {
            let index_name = unquote(sql[pos.1..].trim());
            if let Some(d) = descriptors.get(default_database, &table) {
                let mut d = d.clone();
                d.indexes
                    .retain(|i| !i.contains(&format!("`{}`", index_name)));
                descriptors.insert(d);
            }
            return Ok(Some(DdlOutcome::Statements(vec![format!(
                "ALTER TABLE `{}`.`{}` DROP INDEX `{}`",
                target_database, table, index_name
            )])));
        }

        if lower.contains("add unique") || lower.contains("add constraint") {
            return Ok(Some(DdlOutcome::Skipped(
                "unique/constraint not materialized at target".to_string(),
            )));
        }

        Ok(None)
    }

    fn alter_table(
        &self,
        sql: &str,
        default_database: &str,
        target_database: &str,
        descriptors: &mut DescriptorMap,
    ) -> RpResult<DdlOutcome> {
        let statement = parse_single(sql)?;
        let Statement::AlterTable {
            name, operations, ..
        } = statement
        else {
            return Ok(DdlOutcome::Skipped("unparsed alter".to_string()));
        };
        let (_, table) = split_object_name(&name);

        let Some(descriptor) = descriptors.get(default_database, &table) else {
            return Err(RpError::TranslateErr(format!(
                "alter on unknown table {}.{}",
                default_database, table
            )));
        };
        let mut descriptor = descriptor.clone();

        let mut statements = vec![];
        for op in operations {
            match op {
                AlterTableOperation::AddColumn {
                    column_def,
                    column_position,
                    ..
                } => {
                    let col = self.column_descriptor(&table, &column_def)?;
                    let clause = position_clause(&column_position);
                    statements.push(format!(
                        "ALTER TABLE `{}`.`{}` ADD COLUMN {}{}",
                        target_database,
                        table,
                        render::column_ddl(&col, false),
                        clause
                    ));
                    insert_at(&mut descriptor.columns, col, &column_position);
                }

                AlterTableOperation::DropColumn { column_name, .. } => {
                    descriptor.columns.retain(|c| c.name != column_name.value);
                    statements.push(format!(
                        "ALTER TABLE `{}`.`{}` DROP COLUMN `{}`",
                        target_database, table, column_name.value
                    ));
                }

                AlterTableOperation::ModifyColumn {
                    col_name,
                    data_type,
                    options,
                    ..
                } => {
                    let def = ColumnDef {
                        name: col_name.clone(),
                        data_type,
                        collation: None,
                        options: options
                            .into_iter()
                            .map(|option| ColumnOptionDef { name: None, option })
                            .collect(),
                    };
                    let col = self.column_descriptor(&table, &def)?;
                    let is_pk = descriptor.primary_key.contains(&col.name);
                    statements.push(format!(
                        "ALTER TABLE `{}`.`{}` MODIFY COLUMN {}",
                        target_database,
                        table,
                        render::column_ddl(&col, is_pk)
                    ));
                    // MODIFY原位改类型，列序不动
                    if let Some(existing) =
                        descriptor.columns.iter_mut().find(|c| c.name == col.name)
                    {
                        *existing = col;
                    }
                }

                AlterTableOperation::ChangeColumn {
                    old_name,
                    new_name,
                    data_type,
                    options,
                    ..
                } => {
                    let def = ColumnDef {
                        name: new_name.clone(),
                        data_type,
                        collation: None,
                        options: options
                            .into_iter()
                            .map(|option| ColumnOptionDef { name: None, option })
                            .collect(),
                    };
                    let col = self.column_descriptor(&table, &def)?;
                    let is_pk = descriptor.primary_key.contains(&old_name.value);
                    statements.push(format!(
                        "ALTER TABLE `{}`.`{}` RENAME COLUMN `{}` TO `{}`",
                        target_database, table, old_name.value, new_name.value
                    ));
                    statements.push(format!(
                        "ALTER TABLE `{}`.`{}` MODIFY COLUMN {}",
                        target_database,
                        table,
                        render::column_ddl(&col, is_pk)
                    ));
                    if let Some(existing) =
                        descriptor.columns.iter_mut().find(|c| c.name == old_name.value)
                    {
                        *existing = col;
                    }
                    if is_pk {
                        for pk in descriptor.primary_key.iter_mut() {
                            if *pk == old_name.value {
                                *pk = new_name.value.clone();
                            }
                        }
                    }
                }

                AlterTableOperation::RenameColumn {
                    old_column_name,
                    new_column_name,
                } => {
                    if let Some(c) = descriptor
                        .columns
                        .iter_mut()
                        .find(|c| c.name == old_column_name.value)
                    {
                        c.name = new_column_name.value.clone();
                    }
                    for pk in descriptor.primary_key.iter_mut() {
                        if *pk == old_column_name.value {
                            *pk = new_column_name.value.clone();
                        }
                    }
                    statements.push(format!(
                        "ALTER TABLE `{}`.`{}` RENAME COLUMN `{}` TO `{}`",
                        target_database, table, old_column_name.value, new_column_name.value
                    ));
                }

                AlterTableOperation::RenameTable { table_name } => {
                    let (_, new_table) = split_object_name(&table_name);
                    statements.push(format!(
                        "RENAME TABLE `{}`.`{}` TO `{}`.`{}`",
                        target_database, table, target_database, new_table
                    ));
                    descriptor.table = new_table.clone();
                    descriptors.rename(default_database, &table, &new_table);
                }

                other => {
                    debug!("skip alter operation: {:?}", other);
                    return Ok(DdlOutcome::Skipped(format!(
                        "alter operation not supported: {:?}",
                        other
                    )));
                }
            }
        }

        descriptors.insert(descriptor);
        Ok(DdlOutcome::Statements(statements))
    }
}

fn parse_single(sql: &str) -> RpResult<Statement> {
    let parsed = Parser::parse_sql(&MySqlDialect {}, sql).or_else(|first_err| {
        // SHOW CREATE尾部的表选项偶有解析不了的，截到列定义右括号重试
        match sql.rfind(')') {
            Some(end) => Parser::parse_sql(&MySqlDialect {}, &sql[..=end]).map_err(|_| first_err),
            None => Err(first_err),
        }
    });

    let mut statements =
        parsed.map_err(|e| RpError::TranslateErr(format!("parse err: {} in {:?}", e, sql)))?;
    if statements.len() != 1 {
        return Err(RpError::TranslateErr(format!(
            "expected single statement: {:?}",
            sql
        )));
    }
    Ok(statements.remove(0))
}

fn head_tokens(sql: &str, n: usize) -> Vec<String> {
    sql.split_whitespace()
        .take(n)
        .map(|t| t.to_lowercase())
        .collect()
}

fn split_object_name(name: &ObjectName) -> (Option<String>, String) {
    let parts = &name.0;
    match parts.len() {
        0 => (None, String::new()),
        1 => (None, parts[0].value.clone()),
        _ => (
            Some(parts[0].value.clone()),
            parts[parts.len() - 1].value.clone(),
        ),
    }
}

fn nullable_of(options: &[ColumnOptionDef]) -> bool {
    for o in options {
        match o.option {
            ColumnOption::NotNull => return false,
            ColumnOption::Unique { is_primary, .. } if is_primary => return false,
            _ => {}
        }
    }
    true
}

fn is_inline_primary(options: &[ColumnOptionDef]) -> bool {
    options
        .iter()
        .any(|o| matches!(o.option, ColumnOption::Unique { is_primary: true, .. }))
}

fn position_clause(position: &Option<MySQLColumnPosition>) -> String {
    match position {
        Some(MySQLColumnPosition::First) => " FIRST".to_string(),
        Some(MySQLColumnPosition::After(ident)) => format!(" AFTER `{}`", ident.value),
        None => String::new(),
    }
}

/// 按MySQL列序规则放置新列；事件值数组按此顺序对位
fn insert_at(
    columns: &mut Vec<ColumnDescriptor>,
    col: ColumnDescriptor,
    position: &Option<MySQLColumnPosition>,
) {
    match position {
        Some(MySQLColumnPosition::First) => columns.insert(0, col),
        Some(MySQLColumnPosition::After(ident)) => {
            match columns.iter().position(|c| c.name == ident.value) {
                Some(i) => columns.insert(i + 1, col),
                None => columns.push(col),
            }
        }
        None => columns.push(col),
    }
}

fn alter_table_name(sql: &str) -> RpResult<String> {
    let mut tokens = sql.split_whitespace();
    let _alter = tokens.next();
    let _table = tokens.next();
    let name = tokens
        .next()
        .ok_or_else(|| RpError::TranslateErr(format!("bad ALTER TABLE: {}", sql)))?;
    Ok(strip_db_prefix(&unquote(name)))
}

fn find_any(haystack: &str, needles: &[&str]) -> Option<(usize, usize)> {
    for n in needles {
        if let Some(i) = haystack.find(n) {
            return Some((i, i + n.len()));
        }
    }
    None
}

fn unquote(s: &str) -> String {
    s.trim().trim_matches('`').trim_matches('"').to_string()
}

fn strip_db_prefix(s: &str) -> String {
    match s.rsplit('.').next() {
        Some(t) => t.trim_matches('`').to_string(),
        None => s.to_string(),
    }
}

fn last_word_unquoted(sql: &str) -> String {
    sql.split_whitespace()
        .last()
        .map(|w| unquote(w))
        .unwrap_or_default()
}
