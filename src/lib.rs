//! Translates already-parsed GraphQL operations into parameterized SQL
//! across SQLite, PostgreSQL, MySQL, and SQL Server, and assembles the
//! results back into a nested response tree.
//!
//! GraphQL parsing/validation/schema hosting, HTTP/WebSocket transport, and
//! the database drivers themselves are all owned by collaborators
//! (`async-graphql`, `axum`, `sqlx`/`tiberius`) outside this crate; see
//! `src/bin/gateway.rs` for how the demo binary wires them up.

pub mod assembler;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod filter;
pub mod gql;
pub mod model;
pub mod plan;
pub mod planner;
pub mod policy;
pub mod render;
pub mod schema;
pub mod tree_sync;

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::instrument;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::executor::{AnyConnectionPool, Executor};
use crate::filter::Filter;
use crate::gql::{GraphQlOperation, OperationKind};
use crate::model::{DbModel, SqlValue};
use crate::plan::ObjectQuery;
use crate::policy::{MutationKind, PolicyRegistry, RequestContext};

pub use schema::introspect::introspect;

/// Runs one GraphQL operation end to end: lowers each root selection into a
/// plan, applies policy, executes against `pool`, and assembles the
/// response. The one public entry point the demo binary's resolvers call.
#[instrument(skip_all)]
pub async fn execute(
    model: &DbModel,
    dialect: &dyn Dialect,
    pool: &AnyConnectionPool,
    policy: &PolicyRegistry,
    ctx: &RequestContext,
    operation: &GraphQlOperation<'_>,
    deadline: Option<Duration>,
) -> Result<Value> {
    match operation.kind {
        OperationKind::Query => execute_query(model, dialect, pool, policy, ctx, operation, deadline).await,
        OperationKind::Mutation => execute_mutation(model, dialect, pool, policy, ctx, operation).await,
    }
}

async fn execute_query(
    model: &DbModel,
    dialect: &dyn Dialect,
    pool: &AnyConnectionPool,
    policy: &PolicyRegistry,
    ctx: &RequestContext,
    operation: &GraphQlOperation<'_>,
    deadline: Option<Duration>,
) -> Result<Value> {
    let mut out = Map::new();
    for selection in &operation.root_selections {
        let table = model
            .table(selection.name())
            .ok_or_else(|| Error::invalid_input(selection.name(), format!("unresolved-table: no table backs query field '{}'", selection.name())))?;

        let mut query: ObjectQuery = gql::lower_selection(model, table, selection, &table.graphql_name)?;
        plan::connect_links(model, &mut query)?;
        policy.apply_filters(model, &mut query, ctx, true)?;

        let executor = Executor::new(dialect, model, pool, deadline);
        let rowsets = executor.run(&query).await?;
        let paged = assembler::assemble(&query, &rowsets)?;

        let alias = selection.alias().unwrap_or(selection.name()).to_string();
        out.insert(alias, paged.into_value());
    }
    Ok(Value::Object(out))
}

async fn execute_mutation(
    model: &DbModel,
    dialect: &dyn Dialect,
    pool: &AnyConnectionPool,
    policy: &PolicyRegistry,
    ctx: &RequestContext,
    operation: &GraphQlOperation<'_>,
) -> Result<Value> {
    let mut conn = pool.acquire().await?;
    let mut out = Map::new();

    for selection in &operation.root_selections {
        let field_name = selection.name();
        let (kind, table) = resolve_mutation_field(model, field_name)?;

        let mut args = Map::new();
        for (name, value) in selection
            .arguments()
            .map_err(|e| Error::invalid_input(field_name, format!("invalid-argument: {e}")))?
        {
            args.insert(name.to_string(), value.into_json().map_err(|e| Error::invalid_input(field_name, e.to_string()))?);
        }

        let data: HashMap<String, SqlValue> = args
            .get("data")
            .and_then(Value::as_object)
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), SqlValue::from_json(v))).collect())
            .unwrap_or_default();
        let filter = match args.get("filter") {
            Some(v) => Some(Filter::from_value(model, table, v)?),
            None => None,
        };

        let (kind, mut data, extra_filter) = policy.apply_mutation(table, kind, data, ctx)?;
        policy.apply_audit(table, kind, &mut data, ctx, chrono::Utc::now());

        let combined_filter = match (filter, extra_filter) {
            (Some(a), Some(b)) => Some(a.and(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };

        let value = match kind {
            MutationKind::Insert => {
                let identity = table.primary_keys.first().map(String::as_str);
                let sql = render::render_insert(dialect, &table.db_name, &data, identity)?;
                if identity.is_some() && dialect.name() != "mysql" {
                    let rowset = conn.fetch_rows(&sql).await?;
                    rowset
                        .rows
                        .first()
                        .and_then(|r| r.first())
                        .map(sql_value_to_json)
                        .unwrap_or(Value::Null)
                } else {
                    let affected = conn.execute(&sql).await?;
                    Value::from(affected)
                }
            }
            MutationKind::Update | MutationKind::Delete => {
                let filter = combined_filter
                    .ok_or_else(|| Error::invalid_input(field_name, "update/delete mutations require a 'filter' argument"))?;
                let sql = match kind {
                    MutationKind::Update => render::render_update(dialect, model, table, &data, &filter)?,
                    MutationKind::Delete => render::render_delete(dialect, model, table, &filter)?,
                    MutationKind::Insert => unreachable!(),
                };
                let affected = conn.execute(&sql).await?;
                Value::from(affected)
            }
        };

        let alias = selection.alias().unwrap_or(field_name).to_string();
        out.insert(alias, value);
    }

    Ok(Value::Object(out))
}

/// Maps a mutation field name (`insertProduct`, `updateProduct`,
/// `deleteProduct`) back to its table and `MutationKind` by matching it
/// against every table's `gql::sdl::describe_table` names in reverse.
fn resolve_mutation_field<'a>(model: &'a DbModel, field_name: &str) -> Result<(MutationKind, &'a model::Table)> {
    for table in model.tables() {
        let desc = gql::sdl::describe_table(table);
        if desc.mutation_field_insert.eq_ignore_ascii_case(field_name) {
            return Ok((MutationKind::Insert, table));
        }
        if desc.mutation_field_update.eq_ignore_ascii_case(field_name) {
            return Ok((MutationKind::Update, table));
        }
        if desc.mutation_field_delete.eq_ignore_ascii_case(field_name) {
            return Ok((MutationKind::Delete, table));
        }
    }
    Err(Error::invalid_input(field_name, "unresolved-mutation: field name matches no table's insert/update/delete mutation"))
}

fn sql_value_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Int(i) => Value::from(*i),
        SqlValue::Float(f) => Value::from(*f),
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
        SqlValue::Decimal(d) => Value::String(d.to_string()),
        SqlValue::Uuid(u) => Value::String(u.to_string()),
    }
}
