//! Link Planner (C7): lowers a connected `ObjectQuery` tree into the
//! labeled map of SQL statements the executor runs. Purely functional —
//! it holds no state across calls.
//!
//! Chooses the materialized-IN-list strategy over a correlated subquery:
//! once a parent rowset is known, child statements are built directly
//! against the parent's actual key values rather than embedding the
//! parent's SELECT as a subquery. Both forms are spec-sanctioned as
//! equivalent; IN-list makes "child rows ⊆ children of parent rows
//! actually returned" trivial to state and to test.

use std::collections::HashMap;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::executor::RowSet;
use crate::filter::{Filter, LogicalOp, RelationOp, RelationValue};
use crate::model::{DbModel, SqlValue};
use crate::plan::{JoinSpec, ObjectQuery};
use crate::render::{self, ParameterizedSql};

/// Plans the top-level statement(s) for one root `ObjectQuery`: the SELECT
/// itself, and — if `include_total` is set — an additional `<alias>=>count`
/// statement with no sort/pagination.
pub fn plan_top_level(dialect: &dyn Dialect, model: &DbModel, query: &ObjectQuery) -> Result<HashMap<String, ParameterizedSql>> {
    let mut out = HashMap::new();
    let sql = render::render_object_query(dialect, model, query, &[])?;
    out.insert(query.path.clone(), sql);
    if query.include_total {
        let count_sql = render::render_count_query(dialect, model, query)?;
        out.insert(format!("{}=>count", query.path), count_sql);
    }
    Ok(out)
}

/// Builds the statement(s) for one link given the parent rowset already
/// fetched. `src_*` columns in each returned statement are the child's join
/// keys so the assembler can attach rows back to their parent.
///
/// When `child` carries its own `limit`/`offset`, a single IN-list
/// statement across every parent key would apply that limit to the
/// *combined* child row set instead of to each parent's children
/// individually ("first 5 items per order" would instead return the first
/// 5 items across all orders combined). In that case one statement is
/// rendered per distinct parent key tuple instead, each scoped to exactly
/// one parent and carrying the limit/offset unchanged; the executor runs
/// all of them and concatenates the resulting rows. Unlimited child
/// queries keep the single batched IN-list statement, since there is
/// nothing for per-parent scoping to fix.
pub fn plan_child(
    dialect: &dyn Dialect,
    model: &DbModel,
    child: &ObjectQuery,
    join: &JoinSpec,
    parent_rowset: &RowSet,
) -> Result<Vec<ParameterizedSql>> {
    let key_tuples = distinct_parent_key_tuples(parent_rowset, &join.parent_keys)?;

    if key_tuples.is_empty() {
        let mut effective = child.clone();
        effective.filter = Some(match effective.filter.take() {
            Some(existing) => existing.and(always_false_filter()),
            None => always_false_filter(),
        });
        return Ok(vec![render::render_object_query(dialect, model, &effective, &join.child_keys)?]);
    }

    if (child.limit.is_some() || child.offset.is_some()) && key_tuples.len() > 1 {
        return key_tuples
            .iter()
            .map(|tuple| {
                let mut effective = child.clone();
                let eq_filter = materialized_in_filter(&join.child_keys, std::slice::from_ref(tuple));
                effective.filter = Some(match effective.filter.take() {
                    Some(existing) => existing.and(eq_filter),
                    None => eq_filter,
                });
                render::render_object_query(dialect, model, &effective, &join.child_keys)
            })
            .collect();
    }

    let mut effective = child.clone();
    let in_filter = materialized_in_filter(&join.child_keys, &key_tuples);
    effective.filter = Some(match effective.filter.take() {
        Some(existing) => existing.and(in_filter),
        None => in_filter,
    });
    Ok(vec![render::render_object_query(dialect, model, &effective, &join.child_keys)?])
}

fn distinct_parent_key_tuples(rowset: &RowSet, parent_keys: &[String]) -> Result<Vec<Vec<SqlValue>>> {
    let indices = parent_keys
        .iter()
        .map(|k| {
            rowset
                .column_index
                .get(k)
                .copied()
                .ok_or_else(|| crate::error::Error::internal("", format!("join key '{k}' missing from parent rowset")))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut seen = std::collections::HashSet::new();
    let mut tuples = Vec::new();
    for row in &rowset.rows {
        let tuple: Vec<SqlValue> = indices.iter().map(|&i| row[i].clone()).collect();
        let key = format!("{tuple:?}");
        if seen.insert(key) {
            tuples.push(tuple);
        }
    }
    Ok(tuples)
}

/// `(col1, col2) IN ((v1,v2), (v3,v4))` expressed portably as an OR of
/// ANDed equalities, since row-value `IN` support varies across the four
/// target dialects.
fn materialized_in_filter(child_keys: &[String], tuples: &[Vec<SqlValue>]) -> Filter {
    let branches: Vec<Filter> = tuples
        .iter()
        .map(|tuple| {
            let eqs: Vec<Filter> = child_keys
                .iter()
                .zip(tuple.iter())
                .map(|(col, val)| Filter::Column {
                    table: String::new(),
                    column: col.clone(),
                    next: Box::new(Filter::Relation { op: RelationOp::Eq, value: RelationValue::Scalar(val.clone()) }),
                })
                .collect();
            if eqs.len() == 1 {
                eqs.into_iter().next().unwrap()
            } else {
                Filter::Logical { op: LogicalOp::And, branches: eqs }
            }
        })
        .collect();
    if branches.len() == 1 {
        branches.into_iter().next().unwrap()
    } else {
        Filter::Logical { op: LogicalOp::Or, branches }
    }
}

/// `_in []` on any column renders as the tautologically-false form the
/// renderer already special-cases; the column name is irrelevant since an
/// empty list ignores it.
fn always_false_filter() -> Filter {
    Filter::Column {
        table: String::new(),
        column: "1".to_string(),
        next: Box::new(Filter::Relation { op: RelationOp::In, value: RelationValue::List(vec![]) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::model::{Column, LinkKind, Table};

    fn rowset_with_category_ids(ids: &[i64]) -> RowSet {
        let mut column_index = HashMap::new();
        column_index.insert("Id".to_string(), 0);
        RowSet {
            columns: vec!["Id".to_string()],
            rows: ids.iter().map(|id| vec![SqlValue::Int(*id)]).collect(),
            column_index,
        }
    }

    fn products_model() -> DbModel {
        let products = Table {
            db_name: "Products".into(),
            schema_name: "".into(),
            graphql_name: "Products".into(),
            columns: vec![Column {
                name: "CategoryId".into(),
                graphql_name: "CategoryId".into(),
                data_type: "int".into(),
                is_nullable: false,
                is_identity: false,
                is_primary_key: false,
                metadata: HashMap::new(),
            }],
            primary_keys: vec![],
            single_links: HashMap::new(),
            multi_links: HashMap::new(),
            metadata: HashMap::new(),
        };
        DbModel::new(vec![products], |_| crate::dialect::TypeCategory::Int, HashMap::new())
    }

    #[test]
    fn child_statement_scopes_to_distinct_parent_keys() {
        let dialect = SqliteDialect;
        let model = products_model();
        let rowset = rowset_with_category_ids(&[1, 1, 2]);
        let child = ObjectQuery::new("Products", "Categories=>Products");
        let join = JoinSpec {
            parent_keys: vec!["Id".into()],
            child_keys: vec!["CategoryId".into()],
            join_alias: "Categories=>Products".into(),
            kind: LinkKind::Multi,
        };
        let statements = plan_child(&dialect, &model, &child, &join, &rowset).unwrap();
        assert_eq!(statements.len(), 1);
        // Two distinct parent ids -> exactly two bound parameters, not three.
        assert_eq!(statements[0].params.len(), 2);
    }

    #[test]
    fn limited_child_scopes_one_statement_per_distinct_parent() {
        let dialect = SqliteDialect;
        let model = products_model();
        let rowset = rowset_with_category_ids(&[1, 1, 2]);
        let mut child = ObjectQuery::new("Products", "Categories=>Products");
        child.limit = Some(5);
        let join = JoinSpec {
            parent_keys: vec!["Id".into()],
            child_keys: vec!["CategoryId".into()],
            join_alias: "Categories=>Products".into(),
            kind: LinkKind::Multi,
        };
        let statements = plan_child(&dialect, &model, &child, &join, &rowset).unwrap();
        // Two distinct parent ids -> one independently-limited statement each.
        assert_eq!(statements.len(), 2);
        for sql in &statements {
            assert!(sql.sql.contains("LIMIT 5"));
        }
    }

    #[test]
    fn empty_parent_rowset_short_circuits_to_no_rows() {
        let dialect = SqliteDialect;
        let model = products_model();
        let rowset = rowset_with_category_ids(&[]);
        let child = ObjectQuery::new("Products", "Categories=>Products");
        let join = JoinSpec {
            parent_keys: vec!["Id".into()],
            child_keys: vec!["CategoryId".into()],
            join_alias: "Categories=>Products".into(),
            kind: LinkKind::Multi,
        };
        let statements = plan_child(&dialect, &model, &child, &join, &rowset).unwrap();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].sql.contains("1 = 0"));
    }
}
