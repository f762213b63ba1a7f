//! Tree Sync (C10): diffs a submitted nested object tree against the
//! currently persisted tree and emits an ordered Insert/Update/Delete plan.

use std::collections::HashMap;

use serde_json::Value;

use crate::model::{DbModel, SqlValue, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOpKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct TreeOp {
    pub kind: TreeOpKind,
    pub table: String,
    pub depth: usize,
    pub data: HashMap<String, SqlValue>,
    /// `child_fk_column → parent_graphql_name`: for inserts whose foreign
    /// key depends on a not-yet-persisted parent row.
    pub foreign_key_assignments: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct TreeSyncOptions {
    pub delete_orphans: bool,
    pub max_depth: usize,
}

impl Default for TreeSyncOptions {
    fn default() -> Self {
        TreeSyncOptions { delete_orphans: true, max_depth: 3 }
    }
}

/// Diffs `submitted` against `persisted` (`None` when creating) rooted at
/// `table`, producing an ordered plan: inserts ascending by depth (parents
/// first), updates in any order, deletes descending by depth (children
/// first).
pub fn diff(
    model: &DbModel,
    table: &Table,
    submitted: &Value,
    persisted: Option<&Value>,
    options: &TreeSyncOptions,
) -> Vec<TreeOp> {
    let mut inserts = Vec::new();
    let mut updates = Vec::new();
    let mut deletes = Vec::new();
    diff_node(model, table, submitted, persisted, 0, options, &mut inserts, &mut updates, &mut deletes);

    inserts.sort_by_key(|op: &TreeOp| op.depth);
    deletes.sort_by_key(|op: &TreeOp| std::cmp::Reverse(op.depth));

    let mut plan = Vec::with_capacity(inserts.len() + updates.len() + deletes.len());
    plan.extend(inserts);
    plan.extend(updates);
    plan.extend(deletes);
    plan
}

fn diff_node(
    model: &DbModel,
    table: &Table,
    submitted: &Value,
    persisted: Option<&Value>,
    depth: usize,
    options: &TreeSyncOptions,
    inserts: &mut Vec<TreeOp>,
    updates: &mut Vec<TreeOp>,
    deletes: &mut Vec<TreeOp>,
) {
    if depth > options.max_depth {
        // Silent truncation beyond max depth, as documented.
        return;
    }

    let Some(submitted_obj) = submitted.as_object() else { return };

    let scalar_data = scalar_payload(table, submitted_obj);
    let has_keys = table.primary_keys.iter().all(|pk| {
        submitted_obj
            .get(pk)
            .map(|v| !v.is_null())
            .unwrap_or(false)
    });

    let mut foreign_key_assignments = HashMap::new();

    if has_keys {
        let persisted_obj = persisted.and_then(Value::as_object);
        let changed = persisted_obj
            .map(|p| scalar_differs(table, &scalar_data, p))
            .unwrap_or(true);
        if changed {
            updates.push(TreeOp {
                kind: TreeOpKind::Update,
                table: table.graphql_name.clone(),
                depth,
                data: scalar_data,
                foreign_key_assignments: HashMap::new(),
            });
        }
    } else {
        inserts.push(TreeOp {
            kind: TreeOpKind::Insert,
            table: table.graphql_name.clone(),
            depth,
            data: scalar_data,
            foreign_key_assignments: std::mem::take(&mut foreign_key_assignments),
        });
    }

    for (link_field, link) in &table.multi_links {
        let child_table = model.table_at(link.child_table);
        let Some(submitted_children) = submitted_obj.get(link_field).and_then(Value::as_array) else { continue };

        let persisted_children = persisted
            .and_then(Value::as_object)
            .and_then(|p| p.get(link_field))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut persisted_by_key: HashMap<String, &Value> = HashMap::new();
        for child in &persisted_children {
            if let Some(key) = primary_key_string(child_table, child) {
                persisted_by_key.insert(key, child);
            }
        }
        let mut seen_keys = std::collections::HashSet::new();

        for submitted_child in submitted_children {
            let child_persisted = primary_key_string(child_table, submitted_child)
                .and_then(|k| {
                    seen_keys.insert(k.clone());
                    persisted_by_key.get(&k).copied()
                });

            let before_inserts = inserts.len();
            diff_node(
                model,
                child_table,
                submitted_child,
                child_persisted,
                depth + 1,
                options,
                inserts,
                updates,
                deletes,
            );
            // New child rows whose parent is itself new need the parent's
            // generated id substituted after insert.
            if !has_keys {
                for op in inserts.iter_mut().skip(before_inserts) {
                    op.foreign_key_assignments
                        .entry(link.child_columns.first().cloned().unwrap_or_default())
                        .or_insert_with(|| table.graphql_name.clone());
                }
            }
        }

        if options.delete_orphans {
            for (key, persisted_child) in &persisted_by_key {
                if seen_keys.contains(key) {
                    continue;
                }
                deletes.push(TreeOp {
                    kind: TreeOpKind::Delete,
                    table: child_table.graphql_name.clone(),
                    depth: depth + 1,
                    data: scalar_payload(child_table, persisted_child.as_object().unwrap()),
                    foreign_key_assignments: HashMap::new(),
                });
            }
        }
    }
}

fn scalar_payload(table: &Table, obj: &serde_json::Map<String, Value>) -> HashMap<String, SqlValue> {
    table
        .columns
        .iter()
        .filter_map(|c| obj.get(&c.name).map(|v| (c.name.clone(), SqlValue::from_json(v))))
        .collect()
}

fn scalar_differs(table: &Table, submitted: &HashMap<String, SqlValue>, persisted_obj: &serde_json::Map<String, Value>) -> bool {
    table.columns.iter().any(|c| {
        if table.primary_keys.contains(&c.name) {
            return false;
        }
        let persisted_value = persisted_obj.get(&c.name).map(SqlValue::from_json).unwrap_or(SqlValue::Null);
        submitted.get(&c.name).unwrap_or(&SqlValue::Null) != &persisted_value
    })
}

fn primary_key_string(table: &Table, value: &Value) -> Option<String> {
    let obj = value.as_object()?;
    if table.primary_keys.is_empty() {
        return None;
    }
    let parts: Option<Vec<String>> = table
        .primary_keys
        .iter()
        .map(|pk| obj.get(pk).filter(|v| !v.is_null()).map(|v| v.to_string()))
        .collect();
    parts.map(|p| p.join("|"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Link, LinkKind};
    use std::collections::HashMap as Map;

    fn model() -> (DbModel, Table, Table) {
        let orders = Table {
            db_name: "orders".into(),
            schema_name: "".into(),
            graphql_name: "Orders".into(),
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
            multi_links: Map::from([(
                "items".into(),
                Link {
                    kind: LinkKind::Multi,
                    name: "Items".into(),
                    parent_table: 0,
                    parent_columns: vec!["Id".into()],
                    child_table: 1,
                    child_columns: vec!["OrderId".into()],
                },
            )]),
            metadata: Map::new(),
        };
        let items = Table {
            db_name: "items".into(),
            schema_name: "".into(),
            graphql_name: "Items".into(),
            columns: vec![
                Column { name: "Id".into(), graphql_name: "Id".into(), data_type: "int".into(), is_nullable: false, is_identity: true, is_primary_key: true, metadata: Map::new() },
                Column { name: "OrderId".into(), graphql_name: "OrderId".into(), data_type: "int".into(), is_nullable: false, is_identity: false, is_primary_key: false, metadata: Map::new() },
                Column { name: "Sku".into(), graphql_name: "Sku".into(), data_type: "text".into(), is_nullable: true, is_identity: false, is_primary_key: false, metadata: Map::new() },
            ],
            primary_keys: vec!["Id".into()],
            single_links: Map::new(),
            multi_links: Map::new(),
            metadata: Map::new(),
        };
        let db = DbModel::new(vec![orders.clone(), items.clone()], |_| crate::dialect::TypeCategory::Int, Map::new());
        (db, orders, items)
    }

    #[test]
    fn new_order_with_new_item_produces_inserts_parent_first() {
        let (db, orders, _items) = model();
        let submitted = serde_json::json!({
            "items": [{"Sku": "ABC"}]
        });
        let ops = diff(&db, &orders, &submitted, None, &TreeSyncOptions::default());
        assert_eq!(ops[0].table, "Orders");
        assert_eq!(ops[0].depth, 0);
        assert_eq!(ops[1].table, "Items");
        assert_eq!(ops[1].depth, 1);
        assert_eq!(ops[1].foreign_key_assignments.get("OrderId"), Some(&"Orders".to_string()));
    }

    #[test]
    fn orphaned_item_is_deleted_when_absent_from_submission() {
        let (db, orders, _items) = model();
        let submitted = serde_json::json!({"Id": 1, "items": []});
        let persisted = serde_json::json!({"Id": 1, "items": [{"Id": 9, "OrderId": 1, "Sku": "OLD"}]});
        let ops = diff(&db, &orders, &submitted, Some(&persisted), &TreeSyncOptions::default());
        assert!(ops.iter().any(|op| op.kind == TreeOpKind::Delete && op.table == "Items"));
        let delete_depth = ops.iter().find(|op| op.kind == TreeOpKind::Delete).unwrap().depth;
        assert_eq!(delete_depth, 1);
    }

    #[test]
    fn beyond_max_depth_produces_no_ops() {
        let (db, orders, _items) = model();
        let submitted = serde_json::json!({"items": [{"Sku": "ABC"}]});
        let options = TreeSyncOptions { delete_orphans: true, max_depth: 0 };
        let ops = diff(&db, &orders, &submitted, None, &options);
        assert!(ops.iter().all(|op| op.table != "Items"));
    }
}
