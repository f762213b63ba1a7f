//! Soft-delete: a filter transformer that hides soft-deleted rows, and a
//! mutation transformer that rewrites `Delete` into an `Update` that stamps
//! the deletion timestamp instead of issuing a SQL `DELETE`.

use std::collections::HashMap;

use crate::error::Result;
use crate::filter::{Filter, RelationOp, RelationValue};
use crate::model::{DbModel, SqlValue, Table};
use crate::policy::{FilterTransformer, MutationKind, MutationTransformResult, MutationTransformer, RequestContext};

pub struct SoftDeleteFilter;

impl FilterTransformer for SoftDeleteFilter {
    fn priority(&self) -> i32 {
        100
    }

    fn applies_to(&self, table: &Table, _is_root: bool, ctx: &RequestContext) -> bool {
        table.metadata.contains_key("soft-delete") && !ctx.includes_deleted(&table.graphql_name)
    }

    fn additional_filter(&self, _model: &DbModel, table: &Table, _ctx: &RequestContext) -> Result<Option<Filter>> {
        let column = table.metadata.get("soft-delete").expect("applies_to checked this");
        Ok(Some(Filter::Column {
            table: table.graphql_name.clone(),
            column: column.clone(),
            next: Box::new(Filter::Relation { op: RelationOp::Eq, value: RelationValue::Null }),
        }))
    }
}

pub struct SoftDeleteMutation;

impl MutationTransformer for SoftDeleteMutation {
    fn priority(&self) -> i32 {
        100
    }

    fn applies_to(&self, table: &Table, kind: MutationKind, _ctx: &RequestContext) -> bool {
        table.metadata.contains_key("soft-delete") && matches!(kind, MutationKind::Delete | MutationKind::Update)
    }

    fn transform(
        &self,
        table: &Table,
        kind: MutationKind,
        mut data: HashMap<String, SqlValue>,
        ctx: &RequestContext,
    ) -> Result<MutationTransformResult> {
        let deleted_at_column = table.metadata.get("soft-delete").expect("applies_to checked this").clone();
        let affected_rows_filter = Filter::Column {
            table: table.graphql_name.clone(),
            column: deleted_at_column.clone(),
            next: Box::new(Filter::Relation { op: RelationOp::Eq, value: RelationValue::Null }),
        };

        let new_kind = match kind {
            MutationKind::Delete => {
                data.insert(deleted_at_column.clone(), SqlValue::DateTime(chrono::Utc::now()));
                if let Some(by_column) = table.metadata.get("soft-delete-by") {
                    if let Some(user_audit_key) = table.metadata.get("user-audit-key") {
                        if let Some(user) = ctx.claims.get(user_audit_key) {
                            data.insert(by_column.clone(), user.clone());
                        }
                    }
                }
                MutationKind::Update
            }
            other => other,
        };

        Ok(MutationTransformResult {
            kind: new_kind,
            data,
            additional_filter: Some(affected_rows_filter),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soft_delete_table() -> Table {
        Table {
            db_name: "orders".into(),
            schema_name: "".into(),
            graphql_name: "Orders".into(),
            columns: vec![],
            primary_keys: vec!["Id".into()],
            single_links: HashMap::new(),
            multi_links: HashMap::new(),
            metadata: HashMap::from([("soft-delete".to_string(), "deleted_at".to_string())]),
        }
    }

    #[test]
    fn delete_becomes_update_with_timestamp() {
        let table = soft_delete_table();
        let ctx = RequestContext::default();
        let data = HashMap::from([("Id".to_string(), SqlValue::Int(1))]);
        let result = SoftDeleteMutation.transform(&table, MutationKind::Delete, data, &ctx).unwrap();
        assert_eq!(result.kind, MutationKind::Update);
        assert!(matches!(result.data.get("deleted_at"), Some(SqlValue::DateTime(_))));
        assert!(result.additional_filter.is_some());
    }
}
