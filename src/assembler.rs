//! Assembler (C9): stitches labeled rowsets back into a nested response
//! tree, following the same `joins` the renderer and planner walked.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::executor::RowSet;
use crate::model::LinkKind;
use crate::model::SqlValue;
use crate::plan::ObjectQuery;

/// One paged selection's response envelope.
#[derive(Debug, Clone)]
pub struct Paged {
    pub data: Vec<Value>,
    pub total: Option<i64>,
    pub offset: i64,
    pub limit: Option<i64>,
}

impl Paged {
    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert("data".to_string(), Value::Array(self.data));
        if let Some(total) = self.total {
            map.insert("total".to_string(), Value::from(total));
        }
        map.insert("offset".to_string(), Value::from(self.offset));
        if let Some(limit) = self.limit {
            map.insert("limit".to_string(), Value::from(limit));
        }
        Value::Object(map)
    }
}

/// Assembles the response for one top-level `query`, consuming the labeled
/// rowset map produced by the executor.
pub fn assemble(query: &ObjectQuery, rowsets: &HashMap<String, RowSet>) -> Result<Paged> {
    let rowset = rowsets
        .get(&query.path)
        .ok_or_else(|| Error::internal(&query.path, "missing top-level rowset"))?;

    let data = assemble_rows(query, rowset, None, rowsets)?;

    let total = if query.include_total {
        let count_rowset = rowsets
            .get(&format!("{}=>count", query.path))
            .ok_or_else(|| Error::internal(&query.path, "missing count rowset"))?;
        Some(count_value(count_rowset)?)
    } else {
        None
    };

    Ok(Paged {
        data,
        total,
        offset: query.offset.unwrap_or(0),
        limit: query.limit,
    })
}

fn count_value(rowset: &RowSet) -> Result<i64> {
    let row = rowset
        .rows
        .first()
        .ok_or_else(|| Error::internal("", "count statement returned no rows"))?;
    match row.first() {
        Some(SqlValue::Int(n)) => Ok(*n),
        Some(SqlValue::Float(f)) => Ok(*f as i64),
        _ => Err(Error::internal("", "count statement returned a non-numeric value")),
    }
}

fn assemble_rows(
    query: &ObjectQuery,
    rowset: &RowSet,
    parent_tuple_filter: Option<(&[String], &[SqlValue])>,
    rowsets: &HashMap<String, RowSet>,
) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(rowset.rows.len());
    for row in &rowset.rows {
        if let Some((keys, expected)) = parent_tuple_filter {
            if !row_matches_tuple(rowset, row, keys, expected) {
                continue;
            }
        }
        out.push(assemble_one_row(query, rowset, row, rowsets)?);
    }
    Ok(out)
}

fn row_matches_tuple(rowset: &RowSet, row: &[SqlValue], keys: &[String], expected: &[SqlValue]) -> bool {
    keys.iter().zip(expected.iter()).all(|(k, v)| {
        rowset
            .column_index
            .get(k)
            .map(|&idx| &row[idx] == v)
            .unwrap_or(false)
    })
}

fn assemble_one_row(
    query: &ObjectQuery,
    rowset: &RowSet,
    row: &[SqlValue],
    rowsets: &HashMap<String, RowSet>,
) -> Result<Value> {
    let mut obj = Map::new();
    for column in &query.scalar_columns {
        let idx = rowset
            .column_index
            .get(column)
            .ok_or_else(|| Error::internal(&query.path, format!("column '{column}' missing from rowset")))?;
        obj.insert(column.clone(), sql_value_to_json(&row[*idx]));
    }

    for (child, join) in query.links.iter().zip(query.joins.iter()) {
        let child_rowset = rowsets
            .get(&join.join_alias)
            .ok_or_else(|| Error::internal(&join.join_alias, "missing child rowset"))?;

        let parent_key_values: Vec<SqlValue> = join
            .parent_keys
            .iter()
            .map(|k| {
                rowset
                    .column_index
                    .get(k)
                    .map(|&idx| row[idx].clone())
                    .ok_or_else(|| Error::internal(&query.path, format!("join key '{k}' missing from parent rowset")))
            })
            .collect::<Result<Vec<_>>>()?;

        let src_keys: Vec<String> = (0..join.child_keys.len()).map(|i| format!("src_{i}")).collect();
        let child_rows = assemble_rows(child, child_rowset, Some((&src_keys, &parent_key_values)), rowsets)?;

        match join.kind {
            LinkKind::Single => {
                let value = match child_rows.len() {
                    0 => Value::Null,
                    1 => child_rows.into_iter().next().unwrap(),
                    _ => {
                        warn!(link = %join.join_alias, "single-link cardinality overflow, taking first row");
                        child_rows.into_iter().next().unwrap()
                    }
                };
                obj.insert(child.graphql_alias.clone(), value);
            }
            LinkKind::Multi => {
                obj.insert(child.graphql_alias.clone(), Value::Array(child_rows));
            }
        }
    }

    Ok(Value::Object(obj))
}

fn sql_value_to_json(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Int(i) => Value::from(*i),
        SqlValue::Float(f) => Value::from(*f),
        SqlValue::Text(s) => Value::String(s.clone()),
        // ISO-8601 per the formatting contract.
        SqlValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
        // Decimal's Display preserves precision exactly.
        SqlValue::Decimal(d) => Value::String(d.to_string()),
        SqlValue::Uuid(u) => Value::String(u.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SortKey;

    fn simple_rowset() -> RowSet {
        let mut column_index = HashMap::new();
        column_index.insert("Name".to_string(), 0);
        RowSet {
            columns: vec!["Name".to_string()],
            rows: vec![vec![SqlValue::Text("Laptop".into())]],
            column_index,
        }
    }

    #[test]
    fn paged_envelope_includes_total_offset_limit() {
        let mut query = ObjectQuery::new("Products", "Products");
        query.scalar_columns = vec!["Name".into()];
        query.include_total = true;
        query.offset = Some(2);
        query.limit = Some(2);
        query.sort = vec![SortKey { column: "Id".into(), direction: crate::model::SortDirection::Asc }];

        let mut rowsets = HashMap::new();
        rowsets.insert("Products".to_string(), simple_rowset());
        let mut count_index = HashMap::new();
        count_index.insert("COUNT(*)".to_string(), 0);
        rowsets.insert(
            "Products=>count".to_string(),
            RowSet { columns: vec!["COUNT(*)".into()], rows: vec![vec![SqlValue::Int(5)]], column_index: count_index },
        );

        let paged = assemble(&query, &rowsets).unwrap();
        assert_eq!(paged.total, Some(5));
        assert_eq!(paged.offset, 2);
        assert_eq!(paged.limit, Some(2));
        assert_eq!(paged.data.len(), 1);
    }

    #[test]
    fn null_values_preserve_as_json_null_not_empty_string() {
        let mut query = ObjectQuery::new("Products", "Products");
        query.scalar_columns = vec!["Name".into()];
        let mut column_index = HashMap::new();
        column_index.insert("Name".to_string(), 0);
        let rowset = RowSet { columns: vec!["Name".into()], rows: vec![vec![SqlValue::Null]], column_index };
        let mut rowsets = HashMap::new();
        rowsets.insert("Products".to_string(), rowset);
        let paged = assemble(&query, &rowsets).unwrap();
        assert_eq!(paged.data[0]["Name"], Value::Null);
    }
}
