//! End-to-end acceptance tests against an in-memory SQLite database,
//! exercising the full plan -> render -> execute -> assemble pipeline the
//! way a caller (the demo gateway) would, minus the GraphQL parsing layer
//! itself (owned by `async-graphql`, out of scope for this crate).

use std::collections::HashMap;

use gqlsql::dialect::{Dialect, PoolOptions, SqliteDialect, TypeCategory};
use gqlsql::executor::{AnyConnectionPool, Executor};
use gqlsql::filter::{Filter, RelationOp, RelationValue};
use gqlsql::model::{Column, DbModel, Link, LinkKind, SortDirection, SortKey, SqlValue, Table};
use gqlsql::plan::{connect_links, ObjectQuery};
use gqlsql::policy::{PolicyRegistry, RequestContext};
use gqlsql::render::ParameterizedSql;

async fn sqlite_pool() -> AnyConnectionPool {
    AnyConnectionPool::connect_sqlx_any("sqlite::memory:", PoolOptions { max_connections: 1 })
        .await
        .expect("in-memory sqlite pool")
}

async fn exec_ddl(pool: &AnyConnectionPool, sql: &str) {
    let mut conn = pool.acquire().await.unwrap();
    conn.execute(&ParameterizedSql { sql: sql.to_string(), params: Vec::new() }).await.unwrap();
}

fn column(name: &str) -> Column {
    Column {
        name: name.to_string(),
        graphql_name: name.to_string(),
        data_type: "TEXT".to_string(),
        is_nullable: true,
        is_identity: false,
        is_primary_key: false,
        metadata: HashMap::new(),
    }
}

fn id_column() -> Column {
    Column { is_nullable: false, is_identity: true, is_primary_key: true, ..column("Id") }
}

/// `categories(Id) 1--* products(Id, Name, CategoryId, org_id, deleted_at)`,
/// the same two-table shape the unit tests across the crate already use.
fn products_model() -> DbModel {
    let categories = Table {
        db_name: "categories".into(),
        schema_name: "".into(),
        graphql_name: "Categories".into(),
        columns: vec![id_column()],
        primary_keys: vec!["Id".into()],
        single_links: HashMap::new(),
        multi_links: HashMap::from([(
            "products".into(),
            Link {
                kind: LinkKind::Multi,
                name: "Products".into(),
                parent_table: 0,
                parent_columns: vec!["Id".into()],
                child_table: 1,
                child_columns: vec!["CategoryId".into()],
            },
        )]),
        metadata: HashMap::new(),
    };
    let products = Table {
        db_name: "products".into(),
        schema_name: "".into(),
        graphql_name: "Products".into(),
        columns: vec![id_column(), column("Name"), column("CategoryId"), column("org_id"), column("deleted_at")],
        primary_keys: vec!["Id".into()],
        single_links: HashMap::from([(
            "categories".into(),
            Link {
                kind: LinkKind::Single,
                name: "Categories".into(),
                parent_table: 0,
                parent_columns: vec!["Id".into()],
                child_table: 1,
                child_columns: vec!["CategoryId".into()],
            },
        )]),
        multi_links: HashMap::new(),
        metadata: HashMap::from([("soft-delete".to_string(), "deleted_at".to_string()), ("tenant-filter".to_string(), "org_id".to_string())]),
    };
    DbModel::new(vec![categories, products], |_| TypeCategory::String, HashMap::new())
}

async fn seed_products(pool: &AnyConnectionPool) {
    exec_ddl(pool, "CREATE TABLE categories (Id INTEGER PRIMARY KEY)").await;
    exec_ddl(pool, "CREATE TABLE products (Id INTEGER PRIMARY KEY, Name TEXT, CategoryId INTEGER, org_id INTEGER, deleted_at TEXT)").await;
    exec_ddl(pool, "INSERT INTO categories (Id) VALUES (1)").await;
    for (id, name) in [(1, "Laptop"), (2, "Mouse"), (3, "Keyboard"), (4, "Monitor"), (5, "Webcam")] {
        exec_ddl(pool, &format!("INSERT INTO products (Id, Name, CategoryId, org_id) VALUES ({id}, '{name}', 1, 7)")).await;
    }
}

/// Scenario 1: a single-table equality filter narrows to exactly one row.
#[tokio::test]
async fn single_table_filter_narrows_to_one_row() {
    let pool = sqlite_pool().await;
    seed_products(&pool).await;
    let model = products_model();
    let dialect = SqliteDialect;

    let mut query = ObjectQuery::new("Products", "Products");
    query.scalar_columns = vec!["Name".into()];
    query.filter = Some(Filter::Column {
        table: String::new(),
        column: "Name".into(),
        next: Box::new(Filter::Relation { op: RelationOp::Eq, value: RelationValue::Scalar(SqlValue::Text("Laptop".into())) }),
    });
    query.sort = vec![SortKey { column: "Id".into(), direction: SortDirection::Asc }];

    let executor = Executor::new(&dialect, &model, &pool, None);
    let rowsets = executor.run(&query).await.unwrap();
    let rowset = &rowsets["Products"];

    assert_eq!(rowset.rows.len(), 1);
    let name_idx = rowset.column_index["Name"];
    assert_eq!(rowset.rows[0][name_idx], SqlValue::Text("Laptop".into()));
}

/// Scenario 2: a nested link produces two labeled statements and the child
/// rows are scoped to the parent's id.
#[tokio::test]
async fn nested_link_executes_parent_then_child_statement() {
    let pool = sqlite_pool().await;
    seed_products(&pool).await;
    let model = products_model();
    let dialect = SqliteDialect;

    let mut root = ObjectQuery::new("Categories", "Categories");
    root.scalar_columns = vec!["Id".into()];
    root.filter = Some(Filter::Column {
        table: String::new(),
        column: "Id".into(),
        next: Box::new(Filter::Relation { op: RelationOp::Eq, value: RelationValue::Scalar(SqlValue::Int(1)) }),
    });
    let mut child = ObjectQuery::new("Products", "Categories=>Products");
    child.graphql_alias = "Products".into();
    child.scalar_columns = vec!["Name".into()];
    root.links.push(child);
    connect_links(&model, &mut root).unwrap();

    let executor = Executor::new(&dialect, &model, &pool, None);
    let rowsets = executor.run(&root).await.unwrap();

    assert_eq!(rowsets["Categories"].rows.len(), 1);
    let child_rows = &rowsets["Categories=>Products"];
    assert_eq!(child_rows.rows.len(), 5);
}

/// Scenario 3: offset/limit plus `includeTotal` emits two statements and
/// returns the correct page.
#[tokio::test]
async fn pagination_with_total_emits_two_statements() {
    let pool = sqlite_pool().await;
    seed_products(&pool).await;
    let model = products_model();
    let dialect = SqliteDialect;

    let mut query = ObjectQuery::new("Products", "Products");
    query.scalar_columns = vec!["Name".into()];
    query.sort = vec![SortKey { column: "Id".into(), direction: SortDirection::Asc }];
    query.offset = Some(2);
    query.limit = Some(2);
    query.include_total = true;

    let executor = Executor::new(&dialect, &model, &pool, None);
    let rowsets = executor.run(&query).await.unwrap();

    assert!(rowsets.contains_key("Products"));
    assert!(rowsets.contains_key("Products=>count"));
    let page = &rowsets["Products"];
    assert_eq!(page.rows.len(), 2);
    let name_idx = page.column_index["Name"];
    assert_eq!(page.rows[0][name_idx], SqlValue::Text("Keyboard".into()));
    assert_eq!(page.rows[1][name_idx], SqlValue::Text("Monitor".into()));
    let total_idx = rowsets["Products=>count"].column_index.values().next().copied().unwrap();
    assert_eq!(rowsets["Products=>count"].rows[0][total_idx], SqlValue::Int(5));
}

/// Scenario 4: a table with `tenant-filter: org_id` gets the tenant id
/// ANDed onto every query; missing the claim is a policy violation.
#[test]
fn tenant_isolation_adds_filter_and_rejects_missing_claim() {
    let model = products_model();
    let policy = PolicyRegistry::canonical();

    let mut ctx = RequestContext::default();
    ctx.claims.insert("tenant_id".to_string(), SqlValue::Int(7));
    let mut query = ObjectQuery::new("Products", "Products");
    policy.apply_filters(&model, &mut query, &ctx, true).unwrap();
    assert!(query.filter.is_some());

    let mut query_no_tenant = ObjectQuery::new("Products", "Products");
    let empty_ctx = RequestContext::default();
    let err = policy.apply_filters(&model, &mut query_no_tenant, &empty_ctx, true).unwrap_err();
    assert_eq!(err.code(), "policy-violation");
}

/// Scenario 5: deleting a row on a soft-delete table produces an UPDATE,
/// never a DELETE, and scopes to not-already-deleted rows.
#[test]
fn soft_delete_rewrites_delete_into_update() {
    let model = products_model();
    let table = model.table("Products").unwrap();
    let policy = PolicyRegistry::canonical();
    let ctx = RequestContext::default();

    let (kind, data, extra_filter) = policy
        .apply_mutation(table, gqlsql::policy::MutationKind::Delete, HashMap::new(), &ctx)
        .unwrap();

    assert_eq!(kind, gqlsql::policy::MutationKind::Update);
    assert!(data.contains_key("deleted_at"));
    assert!(extra_filter.is_some());

    let dialect = SqliteDialect;
    let id_filter = Filter::Column {
        table: String::new(),
        column: "Id".into(),
        next: Box::new(Filter::Relation { op: RelationOp::Eq, value: RelationValue::Scalar(SqlValue::Int(1)) }),
    };
    let combined = id_filter.and(extra_filter.unwrap());
    let sql = gqlsql::render::render_update(&dialect, &model, table, &data, &combined).unwrap();

    assert!(sql.sql.starts_with("UPDATE"));
    assert!(sql.sql.contains("deleted_at"));
    assert!(sql.sql.contains("IS NULL"));
}

/// Scenario 6: a new order with a new and an orphaned item produces
/// parent-first inserts and a child-first delete.
#[test]
fn tree_sync_orders_inserts_parent_first_and_deletes_orphan() {
    use gqlsql::tree_sync::{diff, TreeOpKind, TreeSyncOptions};

    let orders = Table {
        db_name: "orders".into(),
        schema_name: "".into(),
        graphql_name: "Orders".into(),
        columns: vec![id_column()],
        primary_keys: vec!["Id".into()],
        single_links: HashMap::new(),
        multi_links: HashMap::from([(
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
        metadata: HashMap::new(),
    };
    let items = Table {
        db_name: "items".into(),
        schema_name: "".into(),
        graphql_name: "Items".into(),
        columns: vec![id_column(), column("OrderId")],
        primary_keys: vec!["Id".into()],
        single_links: HashMap::new(),
        multi_links: HashMap::new(),
        metadata: HashMap::new(),
    };
    let model = DbModel::new(vec![orders, items], |_| TypeCategory::Int, HashMap::new());
    let table = model.table("Orders").unwrap();

    let submitted = serde_json::json!({ "items": [{ "Id": null, "OrderId": null }] });
    let persisted = serde_json::json!({ "Id": 9, "items": [{ "Id": 1 }, { "Id": 2 }] });

    let ops = diff(&model, table, &submitted, Some(&persisted), &TreeSyncOptions::default());

    let insert_tables: Vec<&str> = ops.iter().filter(|op| op.kind == TreeOpKind::Insert).map(|op| op.table.as_str()).collect();
    assert!(insert_tables.contains(&"Items"));

    let delete_count = ops.iter().filter(|op| op.kind == TreeOpKind::Delete).count();
    assert_eq!(delete_count, 2, "both persisted items absent from submission are orphans");

    let first_delete_depth = ops.iter().find(|op| op.kind == TreeOpKind::Delete).unwrap().depth;
    let last_insert_depth = ops.iter().rev().find(|op| op.kind == TreeOpKind::Insert).map(|op| op.depth);
    assert!(last_insert_depth.is_none() || first_delete_depth >= last_insert_depth.unwrap());
}
