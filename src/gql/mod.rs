//! GraphQL selection lowering (C4 supplement): turns an already-parsed
//! `async-graphql` look-ahead selection into a `plan::ObjectQuery` tree.
//! GraphQL parsing, validation, and schema hosting remain entirely
//! `async-graphql`'s job — this module only reads the selection tree and
//! resolved argument values the demo binary's resolvers hand it.

pub mod sdl;

use async_graphql::{SelectionField, Value as GqlValue};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::model::{DbModel, SortDirection, SortKey, Table};
use crate::plan::ObjectQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

/// One resolved top-level operation, constructed by the demo binary's
/// resolvers from `async-graphql`'s look-ahead API — the "already-parsed
/// GraphQL AST" boundary this crate treats as external input.
pub struct GraphQlOperation<'a> {
    pub kind: OperationKind,
    pub root_selections: Vec<SelectionField<'a>>,
    pub variables: Value,
}

/// Lowers one root selection field (a table's query field, selecting the
/// `{data, total, offset, limit}` envelope) into a connected `ObjectQuery`.
/// Link fields nested under `data` lower recursively; `plan::connect_links`
/// must still be run over the result to attach `JoinSpec`s.
pub fn lower_selection(model: &DbModel, table: &Table, selection: &SelectionField, path: &str) -> Result<ObjectQuery> {
    let mut query = ObjectQuery::new(table.graphql_name.clone(), path.to_string());
    query.graphql_alias = selection.name().to_string();

    if let Some(v) = argument_value(selection, "filter")? {
        query.filter = Some(Filter::from_value(model, table, &v)?);
    }
    if let Some(v) = argument_value(selection, "sort")? {
        query.sort = parse_sort(&v)?;
    }
    if let Some(offset) = argument_value(selection, "offset")?.and_then(|v| v.as_i64()) {
        query.offset = Some(offset);
    }
    if let Some(limit) = argument_value(selection, "limit")?.and_then(|v| v.as_i64()) {
        query.limit = Some(limit);
    }

    for envelope_field in selection.selection_set() {
        match envelope_field.name() {
            "total" => query.include_total = true,
            "data" => lower_row_fields(model, table, &envelope_field, path, &mut query)?,
            // `offset`/`limit` echoed back in the response need no lowering.
            _ => {}
        }
    }

    Ok(query)
}

fn lower_row_fields(model: &DbModel, table: &Table, data_field: &SelectionField, path: &str, query: &mut ObjectQuery) -> Result<()> {
    for row_field in data_field.selection_set() {
        let name = row_field.name();
        if row_field.selection_set().next().is_none() {
            query.scalar_columns.push(name.to_string());
            continue;
        }
        // Has a sub-selection: a link field. Its own table is resolved from
        // the schema when `connect_links` runs; here we only need the
        // link's declared table to keep lowering its nested columns.
        let (_, link) = table
            .link(name)
            .ok_or_else(|| Error::invalid_input(path, format!("unresolved-link: '{name}' is not an attribute or known link on '{}'", table.graphql_name)))?;
        let child_table = model.table_at(link.child_table);
        let child_path = format!("{path}=>{name}");
        let child = lower_selection(model, child_table, &row_field, &child_path)?;
        query.links.push(child);
    }
    Ok(())
}

fn argument_value(selection: &SelectionField, name: &str) -> Result<Option<Value>> {
    let args = selection
        .arguments()
        .map_err(|e| Error::invalid_input(selection.name(), format!("invalid-argument: {e}")))?;
    for (arg_name, value) in args {
        if arg_name.as_str() == name {
            return gql_value_to_json(value).map(Some);
        }
    }
    Ok(None)
}

fn gql_value_to_json(value: GqlValue) -> Result<Value> {
    value
        .into_json()
        .map_err(|e| Error::invalid_input("", format!("invalid-argument-encoding: {e}")))
}

fn parse_sort(value: &Value) -> Result<Vec<SortKey>> {
    let entries = value
        .as_array()
        .ok_or_else(|| Error::invalid_input("sort", "sort must be a list of {column, direction} entries"))?;
    entries
        .iter()
        .map(|entry| {
            let column = entry
                .get("column")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid_input("sort", "each sort entry requires a 'column'"))?
                .to_string();
            let direction = match entry.get("direction").and_then(Value::as_str) {
                Some("DESC") | Some("desc") => SortDirection::Desc,
                _ => SortDirection::Asc,
            };
            Ok(SortKey { column, direction })
        })
        .collect()
}
