//! Tenant isolation filter transformer (priority 0 — applied first /
//! innermost). Reads `tenant-filter` table metadata naming the FK column;
//! pulls the tenant id from the caller context key (default `tenant_id`,
//! overridable via model metadata `tenant-context-key`).

use crate::error::{Error, Result};
use crate::filter::{Filter, RelationOp, RelationValue};
use crate::model::{DbModel, Table};
use crate::policy::{FilterTransformer, RequestContext};

pub struct TenantIsolation;

impl FilterTransformer for TenantIsolation {
    fn priority(&self) -> i32 {
        0
    }

    fn applies_to(&self, table: &Table, _is_root: bool, _ctx: &RequestContext) -> bool {
        table.metadata.contains_key("tenant-filter")
    }

    fn additional_filter(&self, model: &DbModel, table: &Table, ctx: &RequestContext) -> Result<Option<Filter>> {
        let column = table.metadata.get("tenant-filter").expect("applies_to checked this");
        let context_key = model
            .metadata
            .get("tenant-context-key")
            .cloned()
            .unwrap_or_else(|| "tenant_id".to_string());

        let value = ctx.claims.get(&context_key).cloned().ok_or_else(|| {
            Error::policy_violation(
                &table.graphql_name,
                format!("tenant-required: missing '{context_key}' in request context"),
            )
        })?;

        Ok(Some(Filter::Column {
            table: table.graphql_name.clone(),
            column: column.clone(),
            next: Box::new(Filter::Relation {
                op: RelationOp::Eq,
                value: RelationValue::Scalar(value),
            }),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SqlValue;
    use std::collections::HashMap;

    fn tenant_table() -> Table {
        Table {
            db_name: "orders".into(),
            schema_name: "".into(),
            graphql_name: "Orders".into(),
            columns: vec![],
            primary_keys: vec![],
            single_links: HashMap::new(),
            multi_links: HashMap::new(),
            metadata: HashMap::from([("tenant-filter".to_string(), "org_id".to_string())]),
        }
    }

    fn empty_model() -> DbModel {
        DbModel::new(vec![], |_| crate::dialect::TypeCategory::String, HashMap::new())
    }

    #[test]
    fn missing_tenant_claim_is_policy_violation() {
        let table = tenant_table();
        let model = empty_model();
        let ctx = RequestContext::default();
        let err = TenantIsolation.additional_filter(&model, &table, &ctx).unwrap_err();
        assert_eq!(err.code(), "policy-violation");
    }

    #[test]
    fn present_claim_produces_equality_filter() {
        let table = tenant_table();
        let model = empty_model();
        let mut ctx = RequestContext::default();
        ctx.claims.insert("tenant_id".to_string(), SqlValue::Int(7));
        let filter = TenantIsolation.additional_filter(&model, &table, &ctx).unwrap();
        assert!(filter.is_some());
    }

    #[test]
    fn context_key_override_reads_model_metadata_not_table_metadata() {
        let table = tenant_table();
        let model = DbModel::new(
            vec![],
            |_| crate::dialect::TypeCategory::String,
            HashMap::from([("tenant-context-key".to_string(), "org_claim".to_string())]),
        );
        let mut ctx = RequestContext::default();
        ctx.claims.insert("org_claim".to_string(), SqlValue::Int(42));
        let filter = TenantIsolation.additional_filter(&model, &table, &ctx).unwrap();
        assert!(filter.is_some());

        let err = TenantIsolation.additional_filter(&model, &table, &RequestContext::default()).unwrap_err();
        assert_eq!(err.code(), "policy-violation");
    }
}
