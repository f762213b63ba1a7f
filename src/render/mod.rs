//! SQL Renderer (C6): turns one `ObjectQuery` into parameterized SQL text
//! per the seven-step algorithm in the design doc, plus mutation rendering
//! (insert/update/delete) needed to make mutations end-to-end testable.

mod predicate;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::model::{DbModel, SqlValue, Table};
use crate::plan::ObjectQuery;

pub use predicate::render_predicate;

/// One rendered statement plus its ordered parameter list. Parameter names
/// in the SQL text are dense `p0, p1, …` in first-use order; `params` is in
/// exactly that order so the driver can bind positionally.
#[derive(Debug, Clone)]
pub struct ParameterizedSql {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Accumulates parameter values during rendering and hands back dialect
/// placeholders in allocation order.
pub struct ParameterCollection<'d> {
    dialect: &'d dyn Dialect,
    values: Vec<SqlValue>,
}

impl<'d> ParameterCollection<'d> {
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        ParameterCollection { dialect, values: Vec::new() }
    }

    /// Allocates the next parameter slot for `value`, returning the
    /// dialect-rendered placeholder to splice into the SQL text.
    pub fn push(&mut self, value: SqlValue) -> String {
        let index = self.values.len();
        self.values.push(value);
        self.dialect.param_placeholder(index)
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

/// Renders one `ObjectQuery` node (ignoring its `links`, which the link
/// planner lowers into sibling statements) into a SELECT. `src_columns`, if
/// non-empty, are parent-key columns to prepend to the projection so child
/// rowsets carry `src_*` values the assembler joins on.
pub fn render_object_query(
    dialect: &dyn Dialect,
    model: &DbModel,
    query: &ObjectQuery,
    src_columns: &[String],
) -> Result<ParameterizedSql> {
    let mut params = ParameterCollection::new(dialect);
    let sql = render_select_body(dialect, model, query, src_columns, &mut params)?;
    Ok(ParameterizedSql { sql, params: params.into_values() })
}

fn render_select_body(
    dialect: &dyn Dialect,
    model: &DbModel,
    query: &ObjectQuery,
    src_columns: &[String],
    params: &mut ParameterCollection,
) -> Result<String> {
    let mut projection: Vec<String> = src_columns
        .iter()
        .enumerate()
        .map(|(idx, col)| format!("{} AS {}", dialect.quote_id(col), dialect.quote_id(&format!("src_{idx}"))))
        .collect();
    projection.extend(query.scalar_columns.iter().map(|c| dialect.quote_id(c)));
    if projection.is_empty() {
        projection.push("*".to_string());
    }

    let table = model
        .table(&query.table)
        .ok_or_else(|| Error::internal(&query.path, format!("unknown table '{}'", query.table)))?;

    let mut sql = format!(
        "SELECT {} FROM {}",
        projection.join(", "),
        dialect.quote_id(&table.db_name)
    );

    if let Some(filter) = &query.filter {
        let predicate = predicate::render_predicate(dialect, filter, params, Some((model, table)))?;
        sql.push_str(" WHERE ");
        sql.push_str(&predicate);
    }

    let has_order_by = !query.sort.is_empty();
    if has_order_by {
        let order = query
            .sort
            .iter()
            .map(|k| format!("{} {}", dialect.quote_id(&k.column), k.direction.as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(" ORDER BY ");
        sql.push_str(&order);
    }

    let pagination_requested = query.offset.is_some() || query.limit.is_some();
    if pagination_requested {
        let pagination = dialect.render_pagination(query.offset, query.limit, has_order_by);
        if !pagination.is_empty() {
            sql.push(' ');
            sql.push_str(&pagination);
        }
    }

    Ok(sql)
}

/// `<name>=>count`: `COUNT(*)` over the filtered source, no sort/pagination.
pub fn render_count_query(dialect: &dyn Dialect, model: &DbModel, query: &ObjectQuery) -> Result<ParameterizedSql> {
    let mut params = ParameterCollection::new(dialect);
    let table = model
        .table(&query.table)
        .ok_or_else(|| Error::internal(&query.path, format!("unknown table '{}'", query.table)))?;
    let mut sql = format!("SELECT COUNT(*) FROM {}", dialect.quote_id(&table.db_name));
    if let Some(filter) = &query.filter {
        let predicate = predicate::render_predicate(dialect, filter, &mut params, Some((model, table)))?;
        sql.push_str(" WHERE ");
        sql.push_str(&predicate);
    }
    Ok(ParameterizedSql { sql, params: params.into_values() })
}

pub fn render_insert(
    dialect: &dyn Dialect,
    table_name: &str,
    data: &std::collections::HashMap<String, SqlValue>,
    identity_column: Option<&str>,
) -> Result<ParameterizedSql> {
    if data.is_empty() {
        return Err(Error::invalid_input(table_name, "insert requires at least one column"));
    }
    let mut params = ParameterCollection::new(dialect);
    let mut columns = data.keys().cloned().collect::<Vec<_>>();
    columns.sort();

    let placeholders: Vec<String> = columns
        .iter()
        .map(|c| params.push(data[c].clone()))
        .collect();

    let quoted_columns = columns.iter().map(|c| dialect.quote_id(c)).collect::<Vec<_>>().join(", ");
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote_id(table_name),
        quoted_columns,
        placeholders.join(", ")
    );
    if let Some(identity) = identity_column {
        sql.push_str(&returning_clause(dialect, identity));
    }
    Ok(ParameterizedSql { sql, params: params.into_values() })
}

/// `table` must be the `Table` the caller resolved `data`/`filter` against
/// (its `db_name` is the SQL identifier, `graphql_name` is what
/// `DbModel::table` is keyed by — the two differ for most real schemas, so
/// callers pass the already-resolved `Table` rather than a name this
/// function would have to guess how to look up).
pub fn render_update(
    dialect: &dyn Dialect,
    model: &DbModel,
    table: &Table,
    data: &std::collections::HashMap<String, SqlValue>,
    filter: &crate::filter::Filter,
) -> Result<ParameterizedSql> {
    if data.is_empty() {
        return Err(Error::invalid_input(&table.graphql_name, "update requires at least one column"));
    }
    let mut params = ParameterCollection::new(dialect);
    let mut columns = data.keys().cloned().collect::<Vec<_>>();
    columns.sort();

    let assignments = columns
        .iter()
        .map(|c| format!("{} = {}", dialect.quote_id(c), params.push(data[c].clone())))
        .collect::<Vec<_>>()
        .join(", ");

    let predicate = predicate::render_predicate(dialect, filter, &mut params, Some((model, table)))?;
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        dialect.quote_id(&table.db_name),
        assignments,
        predicate
    );
    Ok(ParameterizedSql { sql, params: params.into_values() })
}

/// See [`render_update`] on why this takes an already-resolved `Table`.
pub fn render_delete(
    dialect: &dyn Dialect,
    model: &DbModel,
    table: &Table,
    filter: &crate::filter::Filter,
) -> Result<ParameterizedSql> {
    let mut params = ParameterCollection::new(dialect);
    let predicate = predicate::render_predicate(dialect, filter, &mut params, Some((model, table)))?;
    let sql = format!("DELETE FROM {} WHERE {}", dialect.quote_id(&table.db_name), predicate);
    Ok(ParameterizedSql { sql, params: params.into_values() })
}

fn returning_clause(dialect: &dyn Dialect, identity_column: &str) -> String {
    match dialect.name() {
        "postgres" | "sqlite" => format!(" RETURNING {}", dialect.quote_id(identity_column)),
        "sqlserver" => format!(" OUTPUT INSERTED.{}", dialect.quote_id(identity_column)),
        // MySQL has no inline RETURNING; callers fetch LAST_INSERT_ID() separately.
        _ => String::new(),
    }
}
