//! Filter Algebra (C3): a closed, tagged AST for predicates, built from the
//! dynamic JSON value GraphQL input decodes to. Everything past construction
//! is typed — there is no "object bag" after this module runs.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{DbModel, SqlValue, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Between,
    Contains,
    StartsWith,
    EndsWith,
    Like,
    IsNull,
}

impl RelationOp {
    fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "_eq" => RelationOp::Eq,
            "_neq" => RelationOp::Neq,
            "_lt" => RelationOp::Lt,
            "_lte" => RelationOp::Lte,
            "_gt" => RelationOp::Gt,
            "_gte" => RelationOp::Gte,
            "_in" => RelationOp::In,
            "_nin" => RelationOp::Nin,
            "_between" => RelationOp::Between,
            "_contains" => RelationOp::Contains,
            "_starts_with" => RelationOp::StartsWith,
            "_ends_with" => RelationOp::EndsWith,
            "_like" => RelationOp::Like,
            "_is_null" => RelationOp::IsNull,
            _ => return None,
        })
    }

    fn inverse(self) -> Self {
        match self {
            RelationOp::Eq => RelationOp::Neq,
            RelationOp::Neq => RelationOp::Eq,
            RelationOp::Lt => RelationOp::Gte,
            RelationOp::Lte => RelationOp::Gt,
            RelationOp::Gt => RelationOp::Lte,
            RelationOp::Gte => RelationOp::Lt,
            RelationOp::In => RelationOp::Nin,
            RelationOp::Nin => RelationOp::In,
            // These have no clean logical inverse; De Morgan pushes a `not`
            // around them instead of rewriting the operator itself.
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone)]
pub enum RelationValue {
    Scalar(SqlValue),
    Null,
    List(Vec<SqlValue>),
    Pair(SqlValue, SqlValue),
}

#[derive(Debug, Clone)]
pub enum Filter {
    Relation {
        op: RelationOp,
        value: RelationValue,
    },
    Column {
        table: String,
        column: String,
        next: Box<Filter>,
    },
    Logical {
        op: LogicalOp,
        branches: Vec<Filter>,
    },
    CrossTable {
        link_name: String,
        sub: Box<Filter>,
    },
}

impl Filter {
    /// Build a filter from a decoded GraphQL filter-input value, rooted at
    /// `table`. Mapping keys are interpreted key-first: `and`/`or`/`not`,
    /// else a column name, else a link name (producing a `CrossTable` node
    /// whose sub-filter is built against the link's child table).
    pub fn from_value(model: &DbModel, table: &Table, value: &Value) -> Result<Filter> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_input(&table.graphql_name, "invalid-filter: expected an object"))?;
        if obj.is_empty() {
            return Err(Error::invalid_input(
                &table.graphql_name,
                "invalid-filter: empty mapping at column position",
            ));
        }

        let mut branches = Vec::new();
        for (key, v) in obj {
            match key.as_str() {
                "and" | "or" | "not" => {
                    let op = match key.as_str() {
                        "and" => LogicalOp::And,
                        "or" => LogicalOp::Or,
                        _ => LogicalOp::Not,
                    };
                    let seq = v.as_array().ok_or_else(|| {
                        Error::invalid_input(&table.graphql_name, format!("invalid-filter: '{key}' expects a list"))
                    })?;
                    let sub_branches = seq
                        .iter()
                        .map(|item| Filter::from_value(model, table, item))
                        .collect::<Result<Vec<_>>>()?;
                    branches.push(Filter::Logical { op, branches: sub_branches });
                }
                key if table.column(key).is_some() => {
                    let col = table.column(key).unwrap();
                    let next = Filter::relation_from_value(&table.graphql_name, &col.name, v)?;
                    branches.push(Filter::Column {
                        table: table.graphql_name.clone(),
                        column: col.name.clone(),
                        next: Box::new(next),
                    });
                }
                key if table.link(key).is_some() => {
                    let (_, link) = table.link(key).unwrap();
                    let child_table = model.table_at(link.child_table);
                    branches.push(Filter::cross_table_from_value(model, key, child_table, v)?);
                }
                key => {
                    return Err(Error::invalid_input(
                        &table.graphql_name,
                        format!("invalid-filter: unknown column or link '{key}'"),
                    ));
                }
            }
        }

        if branches.len() == 1 {
            Ok(branches.pop().unwrap())
        } else {
            Ok(Filter::Logical { op: LogicalOp::And, branches })
        }
    }

    /// Build a `CrossTable` filter for a link field: `link_name: { sub-filter }`.
    pub fn cross_table_from_value(model: &DbModel, link_name: &str, child_table: &Table, value: &Value) -> Result<Filter> {
        let sub = Filter::from_value(model, child_table, value)?;
        Ok(Filter::CrossTable {
            link_name: link_name.to_string(),
            sub: Box::new(sub),
        })
    }

    fn relation_from_value(path: &str, column: &str, value: &Value) -> Result<Filter> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_input(path, format!("invalid-filter: '{column}' expects an operator object")))?;
        if obj.is_empty() {
            return Err(Error::invalid_input(path, "invalid-filter: empty mapping at column position"));
        }
        let mut branches = Vec::new();
        for (op_key, op_value) in obj {
            let op = RelationOp::parse(op_key)
                .ok_or_else(|| Error::invalid_input(path, format!("invalid-filter: unknown operator '{op_key}'")))?;
            let value = match op {
                RelationOp::In | RelationOp::Nin => {
                    let arr = op_value
                        .as_array()
                        .ok_or_else(|| Error::invalid_input(path, format!("invalid-filter: '{op_key}' expects an array")))?;
                    RelationValue::List(arr.iter().map(SqlValue::from_json).collect())
                }
                RelationOp::Between => {
                    let arr = op_value
                        .as_array()
                        .ok_or_else(|| Error::invalid_input(path, "invalid-filter: '_between' expects an array"))?;
                    if arr.len() != 2 {
                        return Err(Error::invalid_input(
                            path,
                            "invalid-filter: '_between' requires exactly 2 values",
                        ));
                    }
                    RelationValue::Pair(SqlValue::from_json(&arr[0]), SqlValue::from_json(&arr[1]))
                }
                RelationOp::IsNull => {
                    let want_null = op_value.as_bool().unwrap_or(true);
                    let effective_op = if want_null { RelationOp::Eq } else { RelationOp::Neq };
                    branches.push(Filter::Relation { op: effective_op, value: RelationValue::Null });
                    continue;
                }
                _ if op_value.is_null() => RelationValue::Null,
                _ => RelationValue::Scalar(SqlValue::from_json(op_value)),
            };
            branches.push(Filter::Relation { op, value });
        }
        if branches.len() == 1 {
            Ok(branches.pop().unwrap())
        } else {
            Ok(Filter::Logical { op: LogicalOp::And, branches })
        }
    }

    /// De Morgan's-law inversion used for the AST round-trip property:
    /// `render(render_inverse(F)) ≡ render(F)`.
    pub fn render_inverse(&self) -> Filter {
        match self {
            Filter::Relation { op, value } => match op {
                RelationOp::Eq | RelationOp::Neq | RelationOp::Lt | RelationOp::Lte | RelationOp::Gt
                | RelationOp::Gte | RelationOp::In | RelationOp::Nin => Filter::Relation {
                    op: op.inverse(),
                    value: value.clone(),
                },
                _ => Filter::Logical {
                    op: LogicalOp::Not,
                    branches: vec![self.clone()],
                },
            },
            Filter::Column { table, column, next } => Filter::Column {
                table: table.clone(),
                column: column.clone(),
                next: Box::new(next.render_inverse()),
            },
            Filter::Logical { op: LogicalOp::Not, branches } if branches.len() == 1 => branches[0].clone(),
            Filter::Logical { op: LogicalOp::And, branches } => Filter::Logical {
                op: LogicalOp::Or,
                branches: branches.iter().map(Filter::render_inverse).collect(),
            },
            Filter::Logical { op: LogicalOp::Or, branches } => Filter::Logical {
                op: LogicalOp::And,
                branches: branches.iter().map(Filter::render_inverse).collect(),
            },
            Filter::Logical { op: LogicalOp::Not, branches } => Filter::Logical {
                op: LogicalOp::And,
                branches: branches.clone(),
            },
            Filter::CrossTable { link_name, sub } => Filter::CrossTable {
                link_name: link_name.clone(),
                sub: Box::new(Filter::Logical { op: LogicalOp::Not, branches: vec![(**sub).clone()] }),
            },
        }
    }

    /// ANDs `other` onto `self`, flattening nested top-level `And` nodes so
    /// composed policy filters don't grow a new wrapper per transformer.
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::Logical { op: LogicalOp::And, mut branches } => {
                branches.push(other);
                Filter::Logical { op: LogicalOp::And, branches }
            }
            existing => Filter::Logical { op: LogicalOp::And, branches: vec![existing, other] },
        }
    }
}

/// Parses the flat `[<column>, <op>, <value>, <type>]` text form used for
/// metadata rules and UI filter params into a single-column `Filter`.
pub fn parse_filter_string(table: &Table, raw: &str) -> Result<Filter> {
    let parts: Vec<Value> = serde_json::from_str(raw)
        .map_err(|e| Error::invalid_input(&table.graphql_name, format!("invalid-filter: malformed filter string: {e}")))?;
    if parts.len() != 4 {
        return Err(Error::invalid_input(
            &table.graphql_name,
            "invalid-filter: filter string must have exactly 4 elements",
        ));
    }
    let column = parts[0]
        .as_str()
        .ok_or_else(|| Error::invalid_input(&table.graphql_name, "invalid-filter: column must be a string"))?;
    let op = parts[1]
        .as_str()
        .ok_or_else(|| Error::invalid_input(&table.graphql_name, "invalid-filter: op must be a string"))?;
    let col = table
        .column(column)
        .ok_or_else(|| Error::invalid_input(&table.graphql_name, format!("invalid-filter: unknown column '{column}'")))?;
    let mut map = serde_json::Map::new();
    map.insert(op.to_string(), parts[2].clone());
    let next = Filter::relation_from_value(&table.graphql_name, &col.name, &Value::Object(map))?;
    Ok(Filter::Column {
        table: table.graphql_name.clone(),
        column: col.name.clone(),
        next: Box::new(next),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;
    use std::collections::HashMap as Map;

    fn products_model() -> DbModel {
        DbModel::new(vec![products_table()], |_| crate::dialect::TypeCategory::String, Map::new())
    }

    fn products_table() -> Table {
        Table {
            db_name: "products".into(),
            schema_name: "".into(),
            graphql_name: "Products".into(),
            columns: vec![
                Column {
                    name: "Id".into(),
                    graphql_name: "Id".into(),
                    data_type: "int".into(),
                    is_nullable: false,
                    is_identity: true,
                    is_primary_key: true,
                    metadata: Map::new(),
                },
                Column {
                    name: "Name".into(),
                    graphql_name: "Name".into(),
                    data_type: "text".into(),
                    is_nullable: true,
                    is_identity: false,
                    is_primary_key: false,
                    metadata: Map::new(),
                },
            ],
            primary_keys: vec!["Id".into()],
            single_links: Map::new(),
            multi_links: Map::new(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn eq_null_becomes_null_relation() {
        let table = products_table();
        let model = products_model();
        let f = Filter::from_value(&model, &table, &serde_json::json!({"Name": {"_eq": null}})).unwrap();
        match f {
            Filter::Column { next, .. } => match *next {
                Filter::Relation { op, value: RelationValue::Null } => assert_eq!(op, RelationOp::Eq),
                other => panic!("unexpected: {other:?}"),
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn between_requires_exactly_two_values() {
        let table = products_table();
        let model = products_model();
        let err = Filter::from_value(&model, &table, &serde_json::json!({"Id": {"_between": [1]}})).unwrap_err();
        assert_eq!(err.code(), "invalid-input");
    }

    #[test]
    fn link_key_produces_cross_table_filter() {
        let categories = Table {
            db_name: "categories".into(),
            schema_name: "".into(),
            graphql_name: "Categories".into(),
            columns: vec![Column {
                name: "Id".into(),
                graphql_name: "Id".into(),
                data_type: "int".into(),
                is_nullable: false,
                is_identity: true,
                is_primary_key: true,
                metadata: Map::new(),
            }],
            primary_keys: vec!["Id".into()],
            single_links: Map::new(),
            multi_links: Map::new(),
            metadata: Map::new(),
        };
        let mut products = products_table();
        products.single_links.insert(
            "categories".into(),
            crate::model::Link {
                kind: crate::model::LinkKind::Single,
                name: "Categories".into(),
                parent_table: 0,
                parent_columns: vec!["Id".into()],
                child_table: 1,
                child_columns: vec!["CategoryId".into()],
            },
        );
        let model = DbModel::new(vec![categories, products.clone()], |_| crate::dialect::TypeCategory::String, Map::new());

        let f = Filter::from_value(&model, &products, &serde_json::json!({"categories": {"Id": {"_eq": 1}}})).unwrap();
        match f {
            Filter::CrossTable { link_name, sub } => {
                assert_eq!(link_name, "categories");
                assert!(matches!(*sub, Filter::Column { .. }));
            }
            other => panic!("expected CrossTable, got {other:?}"),
        }
    }

    #[test]
    fn unknown_column_is_invalid_input() {
        let table = products_table();
        let model = products_model();
        let err = Filter::from_value(&model, &table, &serde_json::json!({"Bogus": {"_eq": 1}})).unwrap_err();
        assert_eq!(err.code(), "invalid-input");
    }

    #[test]
    fn double_inverse_of_eq_round_trips() {
        let table = products_table();
        let model = products_model();
        let f = Filter::from_value(&model, &table, &serde_json::json!({"Id": {"_eq": 1}})).unwrap();
        let double_inverse = f.render_inverse().render_inverse();
        match (&f, &double_inverse) {
            (
                Filter::Column { next: a, .. },
                Filter::Column { next: b, .. },
            ) => {
                let (Filter::Relation { op: op_a, .. }, Filter::Relation { op: op_b, .. }) = (a.as_ref(), b.as_ref()) else {
                    panic!("expected relations");
                };
                assert_eq!(op_a, op_b);
            }
            _ => panic!("shape mismatch"),
        }
    }
}
