//! Audit module: overwrites columns flagged `populate` with system-managed
//! values on every mutation. Client-supplied values for those columns are
//! discarded (overwritten silently — see DESIGN.md for the open-question
//! decision). A missing user claim leaves `-by` columns untouched rather
//! than erroring, so anonymous inserts stay valid when audit is optional.

use std::collections::HashMap;

use crate::model::{SqlValue, Table};
use crate::policy::{AuditModule, MutationKind, RequestContext};

pub struct AuditColumns;

impl AuditModule for AuditColumns {
    fn priority(&self) -> i32 {
        0
    }

    fn apply(
        &self,
        table: &Table,
        kind: MutationKind,
        data: &mut HashMap<String, SqlValue>,
        ctx: &RequestContext,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        let user_audit_key = table.metadata.get("user-audit-key");

        for column in &table.columns {
            let Some(populate) = column.populate_kind() else { continue };
            match (populate, kind) {
                ("created-on", MutationKind::Insert) | ("updated-on", MutationKind::Insert) => {
                    data.insert(column.name.clone(), SqlValue::DateTime(now));
                }
                ("updated-on", MutationKind::Update) => {
                    data.insert(column.name.clone(), SqlValue::DateTime(now));
                }
                ("deleted-on", MutationKind::Delete) => {
                    data.insert(column.name.clone(), SqlValue::DateTime(now));
                }
                ("created-by", MutationKind::Insert) | ("updated-by", MutationKind::Insert) => {
                    set_from_claim(data, column, user_audit_key, ctx);
                }
                ("updated-by", MutationKind::Update) => {
                    set_from_claim(data, column, user_audit_key, ctx);
                }
                ("deleted-by", MutationKind::Delete) => {
                    set_from_claim(data, column, user_audit_key, ctx);
                }
                _ => {}
            }
        }
    }
}

fn set_from_claim(
    data: &mut HashMap<String, SqlValue>,
    column: &crate::model::Column,
    user_audit_key: Option<&String>,
    ctx: &RequestContext,
) {
    if let Some(key) = user_audit_key {
        if let Some(user) = ctx.claims.get(key) {
            data.insert(column.name.clone(), user.clone());
        }
        // Missing claim: leave the column untouched rather than erroring.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    fn table_with_audit_columns() -> Table {
        Table {
            db_name: "orders".into(),
            schema_name: "".into(),
            graphql_name: "Orders".into(),
            columns: vec![
                Column {
                    name: "created_at".into(),
                    graphql_name: "CreatedAt".into(),
                    data_type: "datetime".into(),
                    is_nullable: false,
                    is_identity: false,
                    is_primary_key: false,
                    metadata: HashMap::from([("populate".to_string(), "created-on".to_string())]),
                },
                Column {
                    name: "updated_at".into(),
                    graphql_name: "UpdatedAt".into(),
                    data_type: "datetime".into(),
                    is_nullable: false,
                    is_identity: false,
                    is_primary_key: false,
                    metadata: HashMap::from([("populate".to_string(), "updated-on".to_string())]),
                },
            ],
            primary_keys: vec!["Id".into()],
            single_links: HashMap::new(),
            multi_links: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn insert_stamps_created_and_updated_with_same_timestamp() {
        let table = table_with_audit_columns();
        let ctx = RequestContext::default();
        let mut data = HashMap::from([("created_at".to_string(), SqlValue::Text("client-supplied".into()))]);
        let now = chrono::Utc::now();
        AuditColumns.apply(&table, MutationKind::Insert, &mut data, &ctx, now);
        assert_eq!(data.get("created_at"), Some(&SqlValue::DateTime(now)));
        assert_eq!(data.get("updated_at"), Some(&SqlValue::DateTime(now)));
    }
}
