//! Dialect-agnostic construction of a `DbModel` from raw introspection rows.
//!
//! Each dialect contributes its own `introspect_sql()`; the executor runs it
//! and hands back plain rows, which this module turns into `IntrospectedColumn`
//! values before deriving links and attaching metadata.

use std::collections::HashMap;

use tracing::warn;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::executor::{AnyConnectionPool, RowSet};
use crate::model::{Column, DbModel, Link, LinkKind, SqlValue, Table};
use crate::render::ParameterizedSql;
use crate::schema::MetadataLoader;

/// One row of raw introspection output: one column of one table.
#[derive(Debug, Clone)]
pub struct IntrospectedColumn {
    pub table_name: String,
    pub schema_name: String,
    pub column_name: String,
    pub native_type: String,
    pub is_nullable: bool,
    pub is_identity: bool,
    pub is_primary_key: bool,
}

/// One detected foreign key: child-side columns reference parent-side
/// columns on another table.
#[derive(Debug, Clone)]
pub struct IntrospectedForeignKey {
    pub child_table: String,
    pub child_columns: Vec<String>,
    pub parent_table: String,
    pub parent_columns: Vec<String>,
    /// Optional override for the generated single-link name on the child
    /// table (defaults to the parent's singular graphql name).
    pub link_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IntrospectedSchema {
    pub columns: Vec<IntrospectedColumn>,
    pub foreign_keys: Vec<IntrospectedForeignKey>,
}

fn graphql_name(db_name: &str) -> String {
    db_name
        .split(['_', '-'])
        .filter(|s| !s.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn pluralize(name: &str) -> String {
    if name.ends_with('y') && !name.ends_with("ay") && !name.ends_with("ey") {
        format!("{}ies", &name[..name.len() - 1])
    } else if name.ends_with('s') {
        format!("{name}es")
    } else {
        format!("{name}s")
    }
}

/// Builds the immutable `DbModel`, applying link derivation (§4.2) and
/// metadata attachment from the loaded rules.
pub fn build_db_model(
    schema: IntrospectedSchema,
    metadata: &MetadataLoader,
    dialect: &dyn Dialect,
) -> DbModel {
    let mut tables: Vec<Table> = Vec::new();
    let mut index_by_db_name: HashMap<String, usize> = HashMap::new();

    for col in &schema.columns {
        let idx = *index_by_db_name.entry(col.table_name.to_ascii_lowercase()).or_insert_with(|| {
            tables.push(Table {
                db_name: col.table_name.clone(),
                schema_name: col.schema_name.clone(),
                graphql_name: graphql_name(&col.table_name),
                columns: Vec::new(),
                primary_keys: Vec::new(),
                single_links: HashMap::new(),
                multi_links: HashMap::new(),
                metadata: metadata.table_metadata(&col.table_name),
            });
            tables.len() - 1
        });

        let column_metadata = metadata.column_metadata(&col.table_name, &col.column_name);
        let table = &mut tables[idx];
        if col.is_primary_key {
            table.primary_keys.push(col.column_name.clone());
        }
        table.columns.push(Column {
            name: col.column_name.clone(),
            graphql_name: graphql_name(&col.column_name),
            data_type: col.native_type.clone(),
            is_nullable: col.is_nullable,
            is_identity: col.is_identity,
            is_primary_key: col.is_primary_key,
            metadata: column_metadata,
        });
    }

    for fk in &schema.foreign_keys {
        let Some(&child_idx) = index_by_db_name.get(&fk.child_table.to_ascii_lowercase()) else {
            continue;
        };
        let Some(&parent_idx) = index_by_db_name.get(&fk.parent_table.to_ascii_lowercase()) else {
            warn!(
                child_table = %fk.child_table,
                parent_table = %fk.parent_table,
                "dropping link: referenced table absent from introspection"
            );
            continue;
        };

        let parent_graphql_name = tables[parent_idx].graphql_name.clone();
        let child_graphql_name = tables[child_idx].graphql_name.clone();

        let single_name = fk
            .link_name
            .clone()
            .unwrap_or_else(|| parent_graphql_name.clone());
        let multi_name = pluralize(&child_graphql_name);

        let single = Link {
            kind: LinkKind::Single,
            name: single_name.clone(),
            parent_table: parent_idx,
            parent_columns: fk.parent_columns.clone(),
            child_table: child_idx,
            child_columns: fk.child_columns.clone(),
        };
        let multi = Link {
            kind: LinkKind::Multi,
            name: multi_name.clone(),
            parent_table: parent_idx,
            parent_columns: fk.parent_columns.clone(),
            child_table: child_idx,
            child_columns: fk.child_columns.clone(),
        };

        tables[child_idx]
            .single_links
            .insert(single_name.to_ascii_lowercase(), single);
        tables[parent_idx]
            .multi_links
            .insert(multi_name.to_ascii_lowercase(), multi);
    }

    let mapper = dialect_type_mapper_fn(dialect.name());
    DbModel::new(tables, mapper, metadata.root_metadata())
}

/// Runs `Dialect::introspect_sql`/`foreign_key_sql` against a live
/// connection and builds the resulting `DbModel`. This is the one place in
/// the crate that turns a database's own catalog into the schema the rest
/// of the engine works from.
pub async fn introspect(dialect: &dyn Dialect, pool: &AnyConnectionPool, metadata_source: &str) -> Result<DbModel> {
    let metadata = MetadataLoader::parse(metadata_source)?;
    let mut conn = pool.acquire().await?;

    let column_sql = ParameterizedSql { sql: dialect.introspect_sql().to_string(), params: Vec::new() };
    let column_rows = conn.fetch_rows(&column_sql).await?;
    let columns = parse_columns(&column_rows);

    let fk_sql = ParameterizedSql { sql: dialect.foreign_key_sql().to_string(), params: Vec::new() };
    let fk_rows = conn.fetch_rows(&fk_sql).await?;
    let foreign_keys = parse_foreign_keys(&fk_rows);

    Ok(build_db_model(IntrospectedSchema { columns, foreign_keys }, &metadata, dialect))
}

fn sql_value_to_string(value: Option<&SqlValue>) -> String {
    match value {
        Some(SqlValue::Text(s)) => s.clone(),
        Some(SqlValue::Int(i)) => i.to_string(),
        _ => String::new(),
    }
}

fn sql_value_to_bool(value: Option<&SqlValue>) -> bool {
    match value {
        Some(SqlValue::Bool(b)) => *b,
        Some(SqlValue::Int(i)) => *i != 0,
        Some(SqlValue::Text(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn parse_columns(rowset: &RowSet) -> Vec<IntrospectedColumn> {
    // `sqlite`/`postgres`/`mysql` report `not_null`; SQL Server reports the
    // inverse as `is_nullable`.
    let (nullability_key, nullability_is_negative) = if rowset.column_index.contains_key("not_null") {
        ("not_null", true)
    } else {
        ("is_nullable", false)
    };

    rowset
        .rows
        .iter()
        .map(|row| {
            let get = |name: &str| rowset.column_index.get(name).map(|&i| &row[i]);
            let flag = sql_value_to_bool(get(nullability_key));
            IntrospectedColumn {
                table_name: sql_value_to_string(get("table_name")),
                schema_name: sql_value_to_string(get("schema_name")),
                column_name: sql_value_to_string(get("column_name")),
                native_type: sql_value_to_string(get("data_type")),
                is_nullable: if nullability_is_negative { !flag } else { flag },
                is_identity: sql_value_to_bool(get("is_identity")),
                is_primary_key: sql_value_to_bool(get("pk")),
            }
        })
        .collect()
}

/// Groups consecutive rows for the same `(child_table, parent_table)` pair
/// into one foreign key. Two distinct composite foreign keys between the
/// same pair of tables would be merged into one; this is a known
/// simplification, not expected in the schemas this crate targets.
fn parse_foreign_keys(rowset: &RowSet) -> Vec<IntrospectedForeignKey> {
    let mut out: Vec<IntrospectedForeignKey> = Vec::new();
    for row in &rowset.rows {
        let get = |name: &str| rowset.column_index.get(name).map(|&i| &row[i]);
        let child_table = sql_value_to_string(get("child_table"));
        let parent_table = sql_value_to_string(get("parent_table"));
        let child_column = sql_value_to_string(get("child_column"));
        let parent_column = sql_value_to_string(get("parent_column"));

        match out.last_mut() {
            Some(fk) if fk.child_table == child_table && fk.parent_table == parent_table => {
                fk.child_columns.push(child_column);
                fk.parent_columns.push(parent_column);
            }
            _ => out.push(IntrospectedForeignKey {
                child_table,
                child_columns: vec![child_column],
                parent_table,
                parent_columns: vec![parent_column],
                link_name: None,
            }),
        }
    }
    out
}

/// `DbModel` stores the type mapper as a bare function pointer (it must be
/// `Copy`/`'static` to keep `DbModel` cheaply cloneable); this indirection
/// resolves a dialect name back to its mapping function.
fn dialect_type_mapper_fn(dialect_name: &str) -> fn(&str) -> crate::dialect::TypeCategory {
    match dialect_name {
        "postgres" => |t| crate::dialect::PostgresDialect.type_mapper(t),
        "mysql" => |t| crate::dialect::MySqlDialect.type_mapper(t),
        "sqlserver" => |t| crate::dialect::SqlServerDialect.type_mapper(t),
        _ => |t| crate::dialect::SqliteDialect.type_mapper(t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;

    #[test]
    fn derives_single_and_multi_links_from_one_fk() {
        let schema = IntrospectedSchema {
            columns: vec![
                IntrospectedColumn {
                    table_name: "categories".into(),
                    schema_name: "".into(),
                    column_name: "id".into(),
                    native_type: "INTEGER".into(),
                    is_nullable: false,
                    is_identity: true,
                    is_primary_key: true,
                },
                IntrospectedColumn {
                    table_name: "products".into(),
                    schema_name: "".into(),
                    column_name: "id".into(),
                    native_type: "INTEGER".into(),
                    is_nullable: false,
                    is_identity: true,
                    is_primary_key: true,
                },
                IntrospectedColumn {
                    table_name: "products".into(),
                    schema_name: "".into(),
                    column_name: "category_id".into(),
                    native_type: "INTEGER".into(),
                    is_nullable: true,
                    is_identity: false,
                    is_primary_key: false,
                },
            ],
            foreign_keys: vec![IntrospectedForeignKey {
                child_table: "products".into(),
                child_columns: vec!["category_id".into()],
                parent_table: "categories".into(),
                parent_columns: vec!["id".into()],
                link_name: None,
            }],
        };
        let metadata = MetadataLoader::parse("").unwrap();
        let model = build_db_model(schema, &metadata, &SqliteDialect);

        let products = model.table("Products").unwrap();
        assert!(products.link("Categories").is_some());
        let categories = model.table("Categories").unwrap();
        assert!(categories.link("Products").is_some());
    }

    #[test]
    fn dangling_fk_is_dropped_without_failure() {
        let schema = IntrospectedSchema {
            columns: vec![IntrospectedColumn {
                table_name: "products".into(),
                schema_name: "".into(),
                column_name: "id".into(),
                native_type: "INTEGER".into(),
                is_nullable: false,
                is_identity: true,
                is_primary_key: true,
            }],
            foreign_keys: vec![IntrospectedForeignKey {
                child_table: "products".into(),
                child_columns: vec!["vendor_id".into()],
                parent_table: "vendors".into(),
                parent_columns: vec!["id".into()],
                link_name: None,
            }],
        };
        let metadata = MetadataLoader::parse("").unwrap();
        let model = build_db_model(schema, &metadata, &SqliteDialect);
        assert!(model.table("Products").unwrap().single_links.is_empty());
    }
}
