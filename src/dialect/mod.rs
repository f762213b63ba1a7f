//! Dialect (C1): pure, stateless, thread-safe descriptions of one
//! database's SQL syntax and type system. Every method here is a text
//! transform with no I/O — connection opening lives on the same trait
//! (`connect`) but is kept separate in spirit: the executor never needs to
//! know which dialect it is talking to, only that it implements
//! [`crate::executor::Connection`].

mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Int,
    BigInt,
    Short,
    Float,
    Decimal,
    Boolean,
    DateTime,
    DateTimeOffset,
    Time,
    String,
    Json,
    Binary,
    Unknown,
}

impl TypeCategory {
    /// Name of the GraphQL filter-input type for this category (e.g.
    /// `StringFilterInput`), or an error if the category has no mapping.
    pub fn filter_input_type(self) -> Result<&'static str> {
        Ok(match self {
            TypeCategory::Int => "IntFilterInput",
            TypeCategory::BigInt => "BigIntFilterInput",
            TypeCategory::Short => "ShortFilterInput",
            TypeCategory::Float => "FloatFilterInput",
            TypeCategory::Decimal => "DecimalFilterInput",
            TypeCategory::Boolean => "BooleanFilterInput",
            TypeCategory::DateTime => "DateTimeFilterInput",
            TypeCategory::DateTimeOffset => "DateTimeOffsetFilterInput",
            TypeCategory::Time => "TimeFilterInput",
            TypeCategory::String => "StringFilterInput",
            TypeCategory::Json => "JsonFilterInput",
            TypeCategory::Binary => "BinaryFilterInput",
            TypeCategory::Unknown => {
                return Err(Error::invalid_input(
                    "",
                    "dialect-unsupported-type: no filter input mapping for this column type",
                ));
            }
        })
    }

    /// Name of the GraphQL insert-input scalar type for this category.
    pub fn insert_input_type(self) -> Result<&'static str> {
        Ok(match self {
            TypeCategory::Int => "Int",
            TypeCategory::BigInt => "BigInt",
            TypeCategory::Short => "Int",
            TypeCategory::Float => "Float",
            TypeCategory::Decimal => "Decimal",
            TypeCategory::Boolean => "Boolean",
            TypeCategory::DateTime | TypeCategory::DateTimeOffset => "DateTime",
            TypeCategory::Time => "String",
            TypeCategory::String => "String",
            TypeCategory::Json => "JSON",
            TypeCategory::Binary => "String",
            TypeCategory::Unknown => {
                return Err(Error::invalid_input(
                    "",
                    "dialect-unsupported-type: no insert input mapping for this column type",
                ));
            }
        })
    }
}

/// Pool connection options, dialect-agnostic. Concrete dialects map this
/// onto their own pool builder's options.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions { max_connections: 10 }
    }
}

/// Capability contract for one SQL dialect. Implementations are zero-field
/// unit structs; all methods are pure string transforms except `connect`.
pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn quote_id(&self, s: &str) -> String;

    fn quote_string(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Render an `OFFSET`/`LIMIT` fragment. Must be syntactically valid for
    /// `limit = Some(0)`, `offset > 0` with no limit, and neither present.
    /// `has_order_by` tells the dialect whether it must inject its own
    /// ordering sentinel before paginating.
    fn render_pagination(&self, offset: Option<i64>, limit: Option<i64>, has_order_by: bool) -> String;

    /// Ordering sentinel emitted when pagination is requested but no sort
    /// was supplied (e.g. `ORDER BY (SELECT NULL)`).
    fn order_by_sentinel(&self) -> &'static str {
        "ORDER BY (SELECT NULL)"
    }

    fn render_like_contains(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE {param}")
    }

    fn render_like_starts_with(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE {param}")
    }

    fn render_like_ends_with(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE {param}")
    }

    fn render_boolean_literal(&self, value: bool) -> String;

    fn render_datetime_literal(&self, value: &chrono::DateTime<chrono::Utc>) -> String {
        self.quote_string(&value.to_rfc3339())
    }

    fn param_placeholder(&self, index: usize) -> String;

    fn introspect_sql(&self) -> &'static str;

    /// One row per (child_column, parent_column) pair making up a foreign
    /// key, ordered by `(child_table, parent_table, ordinal)` so adjacent
    /// rows for the same constraint can be grouped by the caller. Composite
    /// foreign keys between the same pair of tables are not distinguished
    /// from each other; this is a known simplification for the introspection
    /// path, not a rendering limitation.
    fn foreign_key_sql(&self) -> &'static str;

    fn type_mapper(&self, native_type: &str) -> TypeCategory;

    fn connect(
        &self,
        url: &str,
        opts: PoolOptions,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<crate::executor::AnyConnectionPool>> + Send>>;
}

pub fn for_kind(kind: crate::config::DialectKind) -> Arc<dyn Dialect> {
    use crate::config::DialectKind;
    match kind {
        DialectKind::Sqlite => Arc::new(SqliteDialect),
        DialectKind::Postgres => Arc::new(PostgresDialect),
        DialectKind::MySql => Arc::new(MySqlDialect),
        DialectKind::SqlServer => Arc::new(SqlServerDialect),
    }
}

/// Wraps a LIKE pattern's literal segments so only the bound parameter value
/// carries user input; callers pass the *already-escaped* pattern text when
/// the dialect needs `%` wrapped around a bind placeholder via concatenation
/// rather than pre-formatting. Shared by all four dialects since LIKE escaping
/// of `%`/`_`/`\` in the value itself is dialect-independent.
pub fn escape_like_value(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
