//! Demo HTTP transport: builds a GraphQL schema dynamically from a live
//! database's introspected shape and serves it over `/graphql` and
//! `/graphiql`. This binary is the thin, disposable half of the crate --
//! schema hosting, request routing, and auth token handling all live here
//! rather than in the library, which only ever sees an already-parsed
//! `GraphQlOperation`.

use std::sync::Arc;

use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputObject, InputValue, Object, ResolverContext, Schema,
    TypeRef,
};
use async_graphql::http::GraphiQLSource;
use async_graphql_axum::GraphQLRequest;
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use tracing::info;

use gqlsql::config::{DialectKind, EngineConfig};
use gqlsql::dialect::{Dialect, MySqlDialect, PoolOptions, PostgresDialect, SqliteDialect, SqlServerDialect};
use gqlsql::executor::AnyConnectionPool;
use gqlsql::gql::sdl::describe_table;
use gqlsql::gql::{GraphQlOperation, OperationKind};
use gqlsql::model::DbModel;
use gqlsql::policy::{PolicyRegistry, RequestContext};

#[derive(Clone)]
struct AppState {
    model: Arc<DbModel>,
    dialect: Arc<dyn Dialect>,
    pool: Arc<AnyConnectionPool>,
    policy: Arc<PolicyRegistry>,
    schema: async_graphql::dynamic::Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).json().init();

    let config = EngineConfig::from_env()?;
    let dialect: Arc<dyn Dialect> = match config.dialect {
        DialectKind::Sqlite => Arc::new(SqliteDialect),
        DialectKind::Postgres => Arc::new(PostgresDialect),
        DialectKind::MySql => Arc::new(MySqlDialect),
        DialectKind::SqlServer => Arc::new(SqlServerDialect),
    };

    let pool = dialect
        .connect(&config.database_url, PoolOptions { max_connections: config.max_pool_connections })
        .await?;

    let metadata_source = std::env::var("METADATA_PATH")
        .ok()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .unwrap_or_default();
    let model = gqlsql::introspect(dialect.as_ref(), &pool, &metadata_source).await?;
    info!(tables = model.tables().count(), "schema introspected");

    let policy = PolicyRegistry::canonical();
    let schema = build_schema(&model)?;

    let state = AppState {
        model: Arc::new(model),
        dialect,
        pool: Arc::new(pool),
        policy: Arc::new(policy),
        schema,
    };

    let app = Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", std::env::var("PORT").unwrap_or_else(|_| "8080".to_string()));
    info!(%addr, "gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn graphiql() -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

async fn graphql_handler(State(state): State<AppState>, req: GraphQLRequest) -> async_graphql_axum::GraphQLResponse {
    let request = req.into_inner().data(state.clone());
    state.schema.execute(request).await.into()
}

/// Builds one dynamic `Query`/`Mutation` pair from `model`: one query field
/// and three mutation fields per table, named the way
/// `gql::sdl::describe_table` names them. Every resolver hands the current
/// field's look-ahead selection straight to `gqlsql::execute`, which does
/// the actual planning and execution; this function only shapes the schema.
fn build_schema(model: &DbModel) -> anyhow::Result<Schema> {
    let mut query = Object::new("Query");
    let mut mutation = Object::new("Mutation");
    let mut objects = Vec::new();
    let mut inputs = Vec::new();

    for table in model.tables() {
        let desc = describe_table(table);

        let mut object = Object::new(desc.object_type.clone());
        for column in &table.columns {
            let name = column.graphql_name.clone();
            object = object.field(Field::new(name.clone(), TypeRef::named(TypeRef::STRING), move |ctx| {
                let name = name.clone();
                FieldFuture::new(async move { Ok(field_from_parent(&ctx, &name)) })
            }));
        }
        for link_name in table.single_links.keys() {
            let (_, link) = table.link(link_name).expect("link listed in single_links");
            let child_type = describe_table(model.table_at(link.child_table)).object_type;
            let field_name = link.name.clone();
            object = object.field(Field::new(field_name.clone(), TypeRef::named(child_type), move |ctx| {
                let field_name = field_name.clone();
                FieldFuture::new(async move { Ok(field_from_parent(&ctx, &field_name)) })
            }));
        }
        for link_name in table.multi_links.keys() {
            let (_, link) = table.link(link_name).expect("link listed in multi_links");
            let child_type = describe_table(model.table_at(link.child_table)).object_type;
            let field_name = link.name.clone();
            object = object.field(Field::new(
                field_name.clone(),
                TypeRef::named_list(child_type),
                move |ctx| {
                    let field_name = field_name.clone();
                    FieldFuture::new(async move { Ok(field_from_parent(&ctx, &field_name)) })
                },
            ));
        }
        objects.push(object);

        let mut paged = Object::new(format!("{}Page", desc.object_type));
        paged = paged
            .field(Field::new("data", TypeRef::named_nn_list_nn(desc.object_type.clone()), |ctx| {
                FieldFuture::new(async move { Ok(field_from_parent(&ctx, "data")) })
            }))
            .field(Field::new("total", TypeRef::named(TypeRef::INT), |ctx| {
                FieldFuture::new(async move { Ok(field_from_parent(&ctx, "total")) })
            }))
            .field(Field::new("offset", TypeRef::named(TypeRef::INT), |ctx| {
                FieldFuture::new(async move { Ok(field_from_parent(&ctx, "offset")) })
            }))
            .field(Field::new("limit", TypeRef::named(TypeRef::INT), |ctx| {
                FieldFuture::new(async move { Ok(field_from_parent(&ctx, "limit")) })
            }));
        objects.push(paged);

        let query_field_name = desc.query_field.clone();
        let paged_type = format!("{}Page", desc.object_type);
        query = query.field(
            Field::new(query_field_name, TypeRef::named_nn(paged_type), move |ctx| {
                FieldFuture::new(async move { execute_root_query(&ctx).await })
            })
            .argument(InputValue::new("filter", TypeRef::named("JSON")))
            .argument(InputValue::new("sort", TypeRef::named("JSON")))
            .argument(InputValue::new("offset", TypeRef::named(TypeRef::INT)))
            .argument(InputValue::new("limit", TypeRef::named(TypeRef::INT))),
        );

        let mut insert_input = InputObject::new(desc.insert_type.clone());
        let mut update_input = InputObject::new(desc.update_type.clone());
        for column in &table.columns {
            if column.is_identity {
                continue;
            }
            insert_input = insert_input.field(InputValue::new(column.graphql_name.clone(), TypeRef::named("JSON")));
            update_input = update_input.field(InputValue::new(column.graphql_name.clone(), TypeRef::named("JSON")));
        }
        inputs.push(insert_input);
        inputs.push(update_input);

        mutation = mutation.field(
            Field::new(desc.mutation_field_insert.clone(), TypeRef::named("JSON"), move |ctx| {
                FieldFuture::new(async move { execute_root_mutation(&ctx).await })
            })
            .argument(InputValue::new("data", TypeRef::named_nn(desc.insert_type.clone()))),
        );
        mutation = mutation.field(
            Field::new(desc.mutation_field_update.clone(), TypeRef::named("JSON"), move |ctx| {
                FieldFuture::new(async move { execute_root_mutation(&ctx).await })
            })
            .argument(InputValue::new("data", TypeRef::named_nn(desc.update_type.clone())))
            .argument(InputValue::new("filter", TypeRef::named_nn("JSON"))),
        );
        mutation = mutation.field(
            Field::new(desc.mutation_field_delete.clone(), TypeRef::named("JSON"), move |ctx| {
                FieldFuture::new(async move { execute_root_mutation(&ctx).await })
            })
            .argument(InputValue::new("filter", TypeRef::named_nn("JSON"))),
        );
    }

    let mut builder = Schema::build("Query", Some("Mutation"), None).register(query).register(mutation);
    for object in objects {
        builder = builder.register(object);
    }
    for input in inputs {
        builder = builder.register(input);
    }
    Ok(builder.finish()?)
}

/// Plucks `key` out of the parent resolver's already-assembled
/// `serde_json::Value` -- every non-root field in this schema is a lookup
/// into the tree `gqlsql::execute` already built, never a fresh query.
fn field_from_parent(ctx: &ResolverContext<'_>, key: &str) -> Option<FieldValue<'static>> {
    let parent = ctx.parent_value.try_downcast_ref::<Value>().ok()?;
    let value = parent.get(key)?.clone();
    json_to_field_value(value)
}

fn json_to_field_value(value: Value) -> Option<FieldValue<'static>> {
    if value.is_null() {
        return None;
    }
    Some(FieldValue::owned_any(value))
}

async fn execute_root_query(ctx: &ResolverContext<'_>) -> async_graphql::Result<Option<FieldValue<'static>>> {
    let state = ctx.ctx.data::<AppState>()?;
    let selection = ctx.ctx.field();
    let operation = GraphQlOperation { kind: OperationKind::Query, root_selections: vec![selection], variables: Value::Null };
    let request_ctx = request_context(ctx.ctx);

    let result = gqlsql::execute(&state.model, state.dialect.as_ref(), &state.pool, &state.policy, &request_ctx, &operation, None)
        .await
        .map_err(|e| async_graphql::Error::new(e.to_string()))?;

    let alias = ctx.ctx.field().name().to_string();
    let value = result.get(&alias).cloned().unwrap_or(Value::Null);
    Ok(json_to_field_value(value))
}

async fn execute_root_mutation(ctx: &ResolverContext<'_>) -> async_graphql::Result<Option<FieldValue<'static>>> {
    let state = ctx.ctx.data::<AppState>()?;
    let selection = ctx.ctx.field();
    let operation = GraphQlOperation { kind: OperationKind::Mutation, root_selections: vec![selection], variables: Value::Null };
    let request_ctx = request_context(ctx.ctx);

    let result = gqlsql::execute(&state.model, state.dialect.as_ref(), &state.pool, &state.policy, &request_ctx, &operation, None)
        .await
        .map_err(|e| async_graphql::Error::new(e.to_string()))?;

    let alias = ctx.ctx.field().name().to_string();
    let value = result.get(&alias).cloned().unwrap_or(Value::Null);
    Ok(json_to_field_value(value))
}

/// Reads tenant/role claims injected by auth middleware (out of scope for
/// this crate) off the request's `async_graphql::Data`, defaulting to an
/// empty context when none was attached -- matching how the teacher's
/// `graphql_handler` attaches `AuthUser` only when a bearer token verifies.
fn request_context(ctx: &async_graphql::Context<'_>) -> RequestContext {
    ctx.data_opt::<RequestContext>().cloned().unwrap_or_default()
}
