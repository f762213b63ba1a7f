//! Auto-filter transformer (priority 1): reads `auto-filter: col:claim,…`
//! metadata and ANDs an equality/IN predicate per entry, using equality when
//! the claim value is scalar and IN when it is a sequence. An admin role
//! (named by `auto-filter-bypass-role`) skips the filter entirely.

use crate::error::{Error, Result};
use crate::filter::{Filter, RelationOp, RelationValue};
use crate::model::{DbModel, SqlValue, Table};
use crate::policy::{FilterTransformer, RequestContext};

pub struct AutoFilter;

impl FilterTransformer for AutoFilter {
    fn priority(&self) -> i32 {
        1
    }

    fn applies_to(&self, table: &Table, _is_root: bool, ctx: &RequestContext) -> bool {
        if !table.metadata.contains_key("auto-filter") {
            return false;
        }
        match table.metadata.get("auto-filter-bypass-role") {
            Some(role) => !matches!(ctx.claims.get("role"), Some(SqlValue::Text(r)) if r == role),
            None => true,
        }
    }

    fn additional_filter(&self, _model: &DbModel, table: &Table, ctx: &RequestContext) -> Result<Option<Filter>> {
        let spec = table.metadata.get("auto-filter").expect("applies_to checked this");
        let mut branches = Vec::new();
        for entry in spec.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((column, claim)) = entry.split_once(':') else {
                continue;
            };
            let claim = claim.trim();
            let Some(value) = ctx.claims.get(claim) else {
                return Err(Error::policy_violation(
                    &table.graphql_name,
                    format!("auto-filter-claim-missing: '{claim}' is not present in request context"),
                ));
            };
            let relation = match value {
                SqlValue::Text(s) if s.contains(',') => Filter::Relation {
                    op: RelationOp::In,
                    value: RelationValue::List(
                        s.split(',').map(|v| SqlValue::Text(v.trim().to_string())).collect(),
                    ),
                },
                scalar => Filter::Relation {
                    op: RelationOp::Eq,
                    value: RelationValue::Scalar(scalar.clone()),
                },
            };
            branches.push(Filter::Column {
                table: table.graphql_name.clone(),
                column: column.trim().to_string(),
                next: Box::new(relation),
            });
        }
        if branches.is_empty() {
            return Ok(None);
        }
        if branches.len() == 1 {
            return Ok(Some(branches.pop().unwrap()));
        }
        Ok(Some(Filter::Logical {
            op: crate::filter::LogicalOp::And,
            branches,
        }))
    }
}
