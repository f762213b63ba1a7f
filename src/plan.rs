//! Query Plan (C4): the `ObjectQuery` tree produced by lowering a GraphQL
//! selection, and `connect_links`, which resolves each child selection
//! against the schema's links and attaches join metadata.

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::model::{DbModel, LinkKind, SortKey, Table};

#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub parent_keys: Vec<String>,
    pub child_keys: Vec<String>,
    pub join_alias: String,
    pub kind: LinkKind,
}

#[derive(Debug, Clone)]
pub struct ObjectQuery {
    pub table: String,
    pub graphql_alias: String,
    pub scalar_columns: Vec<String>,
    pub filter: Option<Filter>,
    pub sort: Vec<SortKey>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub include_total: bool,
    pub links: Vec<ObjectQuery>,
    pub joins: Vec<JoinSpec>,
    pub path: String,
}

impl ObjectQuery {
    pub fn new(table: impl Into<String>, path: impl Into<String>) -> Self {
        ObjectQuery {
            table: table.into(),
            graphql_alias: String::new(),
            scalar_columns: Vec::new(),
            filter: None,
            sort: Vec::new(),
            offset: None,
            limit: None,
            include_total: false,
            links: Vec::new(),
            joins: Vec::new(),
            path: path.into(),
        }
    }
}

/// Resolves every child in `links` against the schema, attaching a
/// `JoinSpec` per link and recursing. Idempotent: running it twice on an
/// already-connected plan produces the identical `joins` set because it
/// rebuilds `joins` from scratch from `links` + schema rather than mutating
/// in place.
pub fn connect_links(model: &DbModel, query: &mut ObjectQuery) -> Result<()> {
    let table = model
        .table(&query.table)
        .ok_or_else(|| Error::internal(&query.path, format!("unknown table '{}'", query.table)))?;

    let mut joins = Vec::with_capacity(query.links.len());
    for child in &mut query.links {
        let join = resolve_join(table, &child.graphql_alias, &query.path)?;
        joins.push(join);
        connect_links(model, child)?;
    }
    query.joins = joins;
    Ok(())
}

pub(crate) fn resolve_join(table: &Table, link_field_name: &str, parent_path: &str) -> Result<JoinSpec> {
    let (kind, link) = table.link(link_field_name).ok_or_else(|| {
        Error::invalid_input(
            parent_path,
            format!("unresolved-link: '{link_field_name}' is not an attribute or known link on '{}'", table.graphql_name),
        )
    })?;

    let join_alias = format!("{parent_path}=>{link_field_name}");
    Ok(JoinSpec {
        parent_keys: link.parent_columns.clone(),
        child_keys: link.child_columns.clone(),
        join_alias,
        kind,
    })
}
