//! Executor (C8): opens one connection per top-level request, runs
//! statements parent-before-child in that single connection, and reads
//! rowsets back with their column index.
//!
//! `Connection` is the minimal "prepare / execute / fetch rows" capability
//! the rest of the crate depends on; `sqlx`'s `Any` backend implements it
//! for SQLite/Postgres/MySQL uniformly, `tiberius` implements it separately
//! for SQL Server since sqlx has no mssql driver.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::dialect::{Dialect, PoolOptions};
use crate::error::{Error, Result};
use crate::model::{DbModel, SqlValue};
use crate::plan::ObjectQuery;
use crate::planner;
use crate::render::ParameterizedSql;

/// Executor output: one per emitted SQL statement, keyed by the statement's
/// label (top-level table name, `<name>=>count`, or `parent=>link-name`).
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    pub column_index: HashMap<String, usize>,
}

impl RowSet {
    pub fn from_columns_and_rows(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        let column_index = columns
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        RowSet { columns, rows, column_index }
    }
}

/// Minimal driver capability the executor depends on. One implementation
/// per backend family.
pub trait Connection: Send {
    fn fetch_rows<'a>(
        &'a mut self,
        sql: &'a ParameterizedSql,
    ) -> Pin<Box<dyn Future<Output = Result<RowSet>> + Send + 'a>>;

    fn execute<'a>(
        &'a mut self,
        sql: &'a ParameterizedSql,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>>;
}

/// Owns a connection-acquiring pool for one of the two backend families.
pub enum AnyConnectionPool {
    Sqlx(sqlx::AnyPool),
    Tiberius(Arc<Mutex<tiberius::Client<tokio_util::compat::Compat<tokio::net::TcpStream>>>>),
}

impl AnyConnectionPool {
    pub async fn connect_sqlx_any(url: &str, opts: PoolOptions) -> Result<Self> {
        let pool = sqlx::any::AnyPoolOptions::new()
            .max_connections(opts.max_connections)
            .connect(url)
            .await
            .map_err(|e| Error::driver_failure("connect", e))?;
        Ok(AnyConnectionPool::Sqlx(pool))
    }

    pub async fn connect_tiberius(url: &str, _opts: PoolOptions) -> Result<Self> {
        use tokio_util::compat::TokioAsyncWriteCompatExt;
        let config = tiberius::Config::from_ado_string(url)
            .map_err(|e| Error::driver_failure("connect", e))?;
        let tcp = tokio::net::TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| Error::driver_failure("connect", e))?;
        tcp.set_nodelay(true).ok();
        let client = tiberius::Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| Error::driver_failure("connect", e))?;
        Ok(AnyConnectionPool::Tiberius(Arc::new(Mutex::new(client))))
    }

    pub async fn acquire(&self) -> Result<Box<dyn Connection>> {
        match self {
            AnyConnectionPool::Sqlx(pool) => {
                let conn = pool.acquire().await.map_err(|e| Error::driver_failure("acquire", e))?;
                Ok(Box::new(SqlxAnyConnection { conn }))
            }
            AnyConnectionPool::Tiberius(client) => Ok(Box::new(TiberiusConnection { client: client.clone() })),
        }
    }
}

struct SqlxAnyConnection {
    conn: sqlx::pool::PoolConnection<sqlx::Any>,
}

impl Connection for SqlxAnyConnection {
    fn fetch_rows<'a>(
        &'a mut self,
        sql: &'a ParameterizedSql,
    ) -> Pin<Box<dyn Future<Output = Result<RowSet>> + Send + 'a>> {
        Box::pin(async move {
            use sqlx::{Column as _, Row as _};
            let mut query = sqlx::query(&sql.sql);
            for value in &sql.params {
                query = bind_any(query, value);
            }
            let rows = query
                .fetch_all(&mut *self.conn)
                .await
                .map_err(|e| Error::driver_failure(sql.sql.clone(), e))?;
            let columns = rows
                .first()
                .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();
            let out_rows = rows
                .iter()
                .map(|row| {
                    (0..row.len())
                        .map(|i| any_row_value(row, i))
                        .collect::<Vec<_>>()
                })
                .collect();
            Ok(RowSet::from_columns_and_rows(columns, out_rows))
        })
    }

    fn execute<'a>(
        &'a mut self,
        sql: &'a ParameterizedSql,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>> {
        Box::pin(async move {
            let mut query = sqlx::query(&sql.sql);
            for value in &sql.params {
                query = bind_any(query, value);
            }
            let result = query
                .execute(&mut *self.conn)
                .await
                .map_err(|e| Error::driver_failure(sql.sql.clone(), e))?;
            Ok(result.rows_affected())
        })
    }
}

fn bind_any<'q>(
    query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    value: &'q SqlValue,
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.as_str()),
        SqlValue::DateTime(dt) => query.bind(dt.to_rfc3339()),
        SqlValue::Decimal(d) => query.bind(d.to_string()),
        SqlValue::Uuid(u) => query.bind(u.to_string()),
    }
}

fn any_row_value(row: &sqlx::any::AnyRow, idx: usize) -> SqlValue {
    use sqlx::{Row as _, ValueRef as _};
    let raw = row.try_get_raw(idx);
    let Ok(raw) = raw else { return SqlValue::Null };
    if raw.is_null() {
        return SqlValue::Null;
    }
    // Decimal is tried before the integer/float fallbacks so DECIMAL/NUMERIC
    // columns keep exact precision instead of being coerced through f64.
    if let Ok(v) = row.try_get::<rust_decimal::Decimal, _>(idx) {
        return SqlValue::Decimal(v);
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return SqlValue::Int(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return SqlValue::Float(v);
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return SqlValue::Bool(v);
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return SqlValue::Text(v);
    }
    SqlValue::Null
}

struct TiberiusConnection {
    client: Arc<Mutex<tiberius::Client<tokio_util::compat::Compat<tokio::net::TcpStream>>>>,
}

impl Connection for TiberiusConnection {
    fn fetch_rows<'a>(
        &'a mut self,
        sql: &'a ParameterizedSql,
    ) -> Pin<Box<dyn Future<Output = Result<RowSet>> + Send + 'a>> {
        Box::pin(async move {
            let mut client = self.client.lock().await;
            let params: Vec<&dyn tiberius::ToSql> = sql
                .params
                .iter()
                .map(|v| v as &dyn tiberius::ToSql)
                .collect();
            let stream = client
                .query(&sql.sql, &params)
                .await
                .map_err(|e| Error::driver_failure(sql.sql.clone(), e))?;
            let rows = stream
                .into_first_result()
                .await
                .map_err(|e| Error::driver_failure(sql.sql.clone(), e))?;
            let columns = rows
                .first()
                .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();
            let out_rows = rows
                .iter()
                .map(|row| {
                    (0..row.len())
                        .map(|i| tiberius_row_value(row, i))
                        .collect::<Vec<_>>()
                })
                .collect();
            Ok(RowSet::from_columns_and_rows(columns, out_rows))
        })
    }

    fn execute<'a>(
        &'a mut self,
        sql: &'a ParameterizedSql,
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>> {
        Box::pin(async move {
            let mut client = self.client.lock().await;
            let params: Vec<&dyn tiberius::ToSql> = sql
                .params
                .iter()
                .map(|v| v as &dyn tiberius::ToSql)
                .collect();
            let result = client
                .execute(&sql.sql, &params)
                .await
                .map_err(|e| Error::driver_failure(sql.sql.clone(), e))?;
            Ok(result.total())
        })
    }
}

fn tiberius_row_value(row: &tiberius::Row, idx: usize) -> SqlValue {
    if let Ok(Some(v)) = row.try_get::<i64, _>(idx) {
        return SqlValue::Int(v);
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(idx) {
        return SqlValue::Int(v as i64);
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(idx) {
        return SqlValue::Float(v);
    }
    if let Ok(Some(v)) = row.try_get::<bool, _>(idx) {
        return SqlValue::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<&str, _>(idx) {
        return SqlValue::Text(v.to_string());
    }
    SqlValue::Null
}

impl tiberius::ToSql for SqlValue {
    fn to_sql(&self) -> tiberius::ColumnData<'_> {
        match self {
            SqlValue::Null => tiberius::ColumnData::I32(None),
            SqlValue::Bool(b) => tiberius::ColumnData::Bit(Some(*b)),
            SqlValue::Int(i) => tiberius::ColumnData::I64(Some(*i)),
            SqlValue::Float(f) => tiberius::ColumnData::F64(Some(*f)),
            SqlValue::Text(s) => tiberius::ColumnData::String(Some(s.clone().into())),
            SqlValue::DateTime(dt) => tiberius::ColumnData::String(Some(dt.to_rfc3339().into())),
            SqlValue::Decimal(d) => tiberius::ColumnData::String(Some(d.to_string().into())),
            SqlValue::Uuid(u) => tiberius::ColumnData::String(Some(u.to_string().into())),
        }
    }
}

/// Runs the full statement set for one request: the top-level SELECT (and
/// optional count), then, parent-before-child, every link statement.
/// Sibling links could run on separate connections for parallelism; this
/// implementation keeps a single connection for the whole request, which is
/// always correct and is what spec §4.8 requires as the baseline.
pub struct Executor<'d> {
    dialect: &'d dyn Dialect,
    model: &'d DbModel,
    pool: &'d AnyConnectionPool,
    deadline: Option<Duration>,
}

impl<'d> Executor<'d> {
    pub fn new(dialect: &'d dyn Dialect, model: &'d DbModel, pool: &'d AnyConnectionPool, deadline: Option<Duration>) -> Self {
        Executor { dialect, model, pool, deadline }
    }

    /// Executes the whole request on one connection, enforcing the caller's
    /// deadline (if any) across every statement rather than per-statement.
    #[instrument(skip_all, fields(path = %query.path))]
    pub async fn run(&self, query: &ObjectQuery) -> Result<HashMap<String, RowSet>> {
        let fut = async {
            let mut conn = self.pool.acquire().await?;
            let mut rowsets = HashMap::new();

            let statements = planner::plan_top_level(self.dialect, self.model, query)?;
            for (label, sql) in statements {
                debug!(label = %label, sql = %sql.sql, "executing statement");
                let rowset = conn.fetch_rows(&sql).await.map_err(|e| match e {
                    Error::DriverFailure { source, .. } => Error::driver_failure(label.clone(), source),
                    other => other,
                })?;
                rowsets.insert(label, rowset);
            }

            self.run_links_into(conn.as_mut(), query, &mut rowsets).await?;
            Ok(rowsets)
        };
        match self.deadline {
            Some(d) => tokio::time::timeout(d, fut).await.map_err(|_| Error::DeadlineExceeded)?,
            None => fut.await,
        }
    }

    /// Fetches every link of `query`, scoped to the rowset already stored
    /// under `query.path`, then recurses into each child's own links.
    ///
    /// `child.path` and `join.join_alias` are always the same string (both
    /// built as `"{parent_path}=>{link_field_name}"` — see `gql::lower_row_fields`
    /// and `plan::resolve_join`), so the rowset this method inserts for a
    /// link is exactly the one the next recursive call finds under
    /// `child.path`. A child is therefore never independently top-level
    /// queried: its rows come solely from the parent-scoped statement(s)
    /// `planner::plan_child` builds.
    fn run_links_into<'a>(
        &'a self,
        conn: &'a mut dyn Connection,
        query: &'a ObjectQuery,
        out: &'a mut HashMap<String, RowSet>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let parent_rowset = out
                .get(&query.path)
                .cloned()
                .ok_or_else(|| Error::internal(&query.path, "parent rowset missing before link execution"))?;

            for (child, join) in query.links.iter().zip(query.joins.iter()) {
                let statements = planner::plan_child(self.dialect, self.model, child, join, &parent_rowset)?;
                let mut merged: Option<RowSet> = None;
                for sql in &statements {
                    debug!(label = %join.join_alias, sql = %sql.sql, "executing link statement");
                    let rowset = conn.fetch_rows(sql).await.map_err(|e| match e {
                        Error::DriverFailure { source, .. } => Error::driver_failure(join.join_alias.clone(), source),
                        other => other,
                    })?;
                    merged = Some(match merged.take() {
                        Some(mut acc) => {
                            acc.rows.extend(rowset.rows);
                            acc
                        }
                        None => rowset,
                    });
                }
                let rowset = merged.ok_or_else(|| Error::internal(&join.join_alias, "link produced no statements"))?;

                if join.kind == crate::model::LinkKind::Single {
                    warn_if_cardinality_overflow(&join.join_alias, &rowset, &join.child_keys);
                }

                out.insert(join.join_alias.clone(), rowset);
                self.run_links_into(conn, child, out).await?;
            }
            Ok(())
        })
    }
}

fn warn_if_cardinality_overflow(label: &str, rowset: &RowSet, keys: &[String]) {
    let indices: Vec<usize> = keys.iter().filter_map(|k| rowset.column_index.get(k).copied()).collect();
    if indices.is_empty() {
        return;
    }
    let mut seen = std::collections::HashSet::new();
    for row in &rowset.rows {
        let tuple: Vec<String> = indices.iter().map(|&i| format!("{:?}", row[i])).collect();
        if !seen.insert(tuple) {
            warn!(label, "single-link cardinality overflow: more than one child row for a parent key");
            return;
        }
    }
}
