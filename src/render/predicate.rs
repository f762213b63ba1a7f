//! Predicate rendering: walks the tagged `Filter` AST into a SQL boolean
//! expression, allocating parameters as it goes. Values never touch the SQL
//! text directly; only `quote_id` output (identifiers) is spliced in raw.

use crate::dialect::{escape_like_value, Dialect};
use crate::error::{Error, Result};
use crate::filter::{Filter, LogicalOp, RelationOp, RelationValue};
use crate::model::{DbModel, SqlValue, Table};
use crate::render::ParameterCollection;

/// Schema context needed to resolve `Filter::CrossTable` into an `EXISTS`
/// subquery. `None` for callers (mutations, ad-hoc tests) that never see a
/// cross-table filter; resolving one without context is an internal error.
pub type SchemaCtx<'a> = Option<(&'a DbModel, &'a Table)>;

pub fn render_predicate(
    dialect: &dyn Dialect,
    filter: &Filter,
    params: &mut ParameterCollection,
    ctx: SchemaCtx,
) -> Result<String> {
    match filter {
        Filter::Column { column, next, .. } => render_column(dialect, column, next, params, ctx),
        Filter::Logical { op, branches } => render_logical(dialect, *op, branches, params, ctx),
        Filter::CrossTable { link_name, sub } => render_cross_table(dialect, link_name, sub, params, ctx),
        Filter::Relation { .. } => Err(Error::internal(
            "",
            "a bare Relation filter cannot be rendered without its owning column",
        )),
    }
}

fn render_column(
    dialect: &dyn Dialect,
    column: &str,
    next: &Filter,
    params: &mut ParameterCollection,
    ctx: SchemaCtx,
) -> Result<String> {
    match next {
        Filter::Relation { op, value } => render_relation(dialect, column, *op, value, params),
        // A Logical node nested directly under a Column is how multiple
        // operators on one field combine (e.g. `{_gte: 1, _lte: 10}`); its
        // branches are bare Relations sharing this column, not full Filters.
        Filter::Logical { op, branches } => {
            let joiner = if *op == LogicalOp::Or { " OR " } else { " AND " };
            let rendered = branches
                .iter()
                .map(|b| render_column(dialect, column, b, params, ctx).map(|s| format!("({s})")))
                .collect::<Result<Vec<_>>>()?;
            Ok(rendered.join(joiner))
        }
        other => render_predicate(dialect, other, params, ctx),
    }
}

fn render_relation(
    dialect: &dyn Dialect,
    column: &str,
    op: RelationOp,
    value: &RelationValue,
    params: &mut ParameterCollection,
) -> Result<String> {
    let quoted = dialect.quote_id(column);

    if matches!(value, RelationValue::Null) {
        return Ok(match op {
            RelationOp::Eq => format!("{quoted} IS NULL"),
            RelationOp::Neq => format!("{quoted} IS NOT NULL"),
            other => return Err(Error::internal("", format!("null value used with non-equality op {other:?}"))),
        });
    }

    Ok(match (op, value) {
        (RelationOp::Eq, RelationValue::Scalar(v)) => format!("{quoted} = {}", params.push(v.clone())),
        (RelationOp::Neq, RelationValue::Scalar(v)) => format!("{quoted} != {}", params.push(v.clone())),
        (RelationOp::Lt, RelationValue::Scalar(v)) => format!("{quoted} < {}", params.push(v.clone())),
        (RelationOp::Lte, RelationValue::Scalar(v)) => format!("{quoted} <= {}", params.push(v.clone())),
        (RelationOp::Gt, RelationValue::Scalar(v)) => format!("{quoted} > {}", params.push(v.clone())),
        (RelationOp::Gte, RelationValue::Scalar(v)) => format!("{quoted} >= {}", params.push(v.clone())),
        (RelationOp::Between, RelationValue::Pair(a, b)) => {
            format!("{quoted} BETWEEN {} AND {}", params.push(a.clone()), params.push(b.clone()))
        }
        (RelationOp::In, RelationValue::List(items)) => render_in(&quoted, items, params, false),
        (RelationOp::Nin, RelationValue::List(items)) => render_in(&quoted, items, params, true),
        (RelationOp::Contains, RelationValue::Scalar(SqlValue::Text(s))) => {
            let escaped = escape_like_value(s);
            let placeholder = params.push(SqlValue::Text(escaped));
            dialect.render_like_contains(&quoted, &placeholder)
        }
        (RelationOp::StartsWith, RelationValue::Scalar(SqlValue::Text(s))) => {
            let escaped = escape_like_value(s);
            let placeholder = params.push(SqlValue::Text(escaped));
            dialect.render_like_starts_with(&quoted, &placeholder)
        }
        (RelationOp::EndsWith, RelationValue::Scalar(SqlValue::Text(s))) => {
            let escaped = escape_like_value(s);
            let placeholder = params.push(SqlValue::Text(escaped));
            dialect.render_like_ends_with(&quoted, &placeholder)
        }
        (RelationOp::Like, RelationValue::Scalar(v)) => {
            format!("{quoted} LIKE {}", params.push(v.clone()))
        }
        _ => {
            return Err(Error::invalid_input(
                column,
                format!("invalid-filter: operator {op:?} is not compatible with the supplied value shape"),
            ));
        }
    })
}

fn render_in(quoted_column: &str, items: &[SqlValue], params: &mut ParameterCollection, negate: bool) -> String {
    if items.is_empty() {
        // Empty `_in` / `_nin` render as a tautologically false / true
        // predicate the dialect accepts without a driver error.
        return if negate { "1 = 1".to_string() } else { "1 = 0".to_string() };
    }
    let placeholders = items
        .iter()
        .map(|v| params.push(v.clone()))
        .collect::<Vec<_>>()
        .join(", ");
    if negate {
        format!("{quoted_column} NOT IN ({placeholders})")
    } else {
        format!("{quoted_column} IN ({placeholders})")
    }
}

fn render_logical(
    dialect: &dyn Dialect,
    op: LogicalOp,
    branches: &[Filter],
    params: &mut ParameterCollection,
    ctx: SchemaCtx,
) -> Result<String> {
    if branches.is_empty() {
        return Ok("1 = 1".to_string());
    }
    match op {
        LogicalOp::Not => {
            let inner = render_predicate(dialect, &branches[0], params, ctx)?;
            Ok(format!("NOT ({inner})"))
        }
        LogicalOp::And | LogicalOp::Or => {
            let joiner = if op == LogicalOp::And { " AND " } else { " OR " };
            let rendered = branches
                .iter()
                .map(|b| render_predicate(dialect, b, params, ctx).map(|s| format!("({s})")))
                .collect::<Result<Vec<_>>>()?;
            Ok(rendered.join(joiner))
        }
    }
}

fn render_cross_table(
    dialect: &dyn Dialect,
    link_name: &str,
    sub: &Filter,
    params: &mut ParameterCollection,
    ctx: SchemaCtx,
) -> Result<String> {
    let (model, table) = ctx.ok_or_else(|| {
        Error::internal(link_name, "cross-table filter rendered without schema context")
    })?;
    let (_, link) = table.link(link_name).ok_or_else(|| {
        Error::invalid_input(
            link_name,
            format!("unresolved-link: '{link_name}' is not a known link on '{}'", table.graphql_name),
        )
    })?;
    let child_table = model.table_at(link.child_table);

    let join_eq = link
        .parent_columns
        .iter()
        .zip(link.child_columns.iter())
        .map(|(p, c)| {
            format!(
                "{}.{} = {}.{}",
                dialect.quote_id(&table.db_name),
                dialect.quote_id(p),
                dialect.quote_id(&child_table.db_name),
                dialect.quote_id(c)
            )
        })
        .collect::<Vec<_>>()
        .join(" AND ");

    let inner = render_predicate(dialect, sub, params, Some((model, child_table)))?;
    Ok(format!(
        "EXISTS (SELECT 1 FROM {} WHERE {} AND {})",
        dialect.quote_id(&child_table.db_name),
        join_eq,
        inner
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use crate::render::ParameterCollection;

    #[test]
    fn empty_in_is_tautologically_false() {
        let dialect = SqliteDialect;
        let mut params = ParameterCollection::new(&dialect);
        let sql = render_in("\"Id\"", &[], &mut params, false);
        assert_eq!(sql, "1 = 0");
    }

    #[test]
    fn eq_null_consumes_zero_parameters() {
        let dialect = SqliteDialect;
        let mut params = ParameterCollection::new(&dialect);
        let filter = Filter::Column {
            table: "Products".into(),
            column: "DeletedAt".into(),
            next: Box::new(Filter::Relation { op: RelationOp::Eq, value: RelationValue::Null }),
        };
        let sql = render_predicate(&dialect, &filter, &mut params, None).unwrap();
        assert_eq!(sql, "\"DeletedAt\" IS NULL");
        assert_eq!(params.into_values().len(), 0);
    }
}
