use super::{Dialect, PoolOptions, TypeCategory};
use crate::error::Result;
use crate::executor::AnyConnectionPool;

pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_id(&self, s: &str) -> String {
        format!("\"{}\"", s.replace('"', "\"\""))
    }

    fn render_pagination(&self, offset: Option<i64>, limit: Option<i64>, has_order_by: bool) -> String {
        let mut sql = String::new();
        if (offset.is_some() || limit.is_some()) && !has_order_by {
            sql.push_str(self.order_by_sentinel());
            sql.push(' ');
        }
        if let Some(l) = limit {
            sql.push_str(&format!("LIMIT {l} "));
        }
        if let Some(o) = offset {
            sql.push_str(&format!("OFFSET {o}"));
        }
        sql.trim().to_string()
    }

    fn render_like_contains(&self, column: &str, param: &str) -> String {
        format!("{column} ILIKE '%' || {param} || '%'")
    }

    fn render_like_starts_with(&self, column: &str, param: &str) -> String {
        format!("{column} ILIKE {param} || '%'")
    }

    fn render_like_ends_with(&self, column: &str, param: &str) -> String {
        format!("{column} ILIKE '%' || {param}")
    }

    fn render_boolean_literal(&self, value: bool) -> String {
        if value { "TRUE".to_string() } else { "FALSE".to_string() }
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn introspect_sql(&self) -> &'static str {
        "SELECT c.table_name, c.column_name, c.data_type, \
         c.is_nullable = 'NO' AS not_null, \
         (c.column_default LIKE 'nextval%') AS is_identity, \
         COALESCE(pk.is_pk, false) AS pk \
         FROM information_schema.columns c \
         LEFT JOIN ( \
           SELECT kcu.table_name, kcu.column_name, true AS is_pk \
           FROM information_schema.table_constraints tc \
           JOIN information_schema.key_column_usage kcu \
             ON tc.constraint_name = kcu.constraint_name \
           WHERE tc.constraint_type = 'PRIMARY KEY' \
         ) pk ON pk.table_name = c.table_name AND pk.column_name = c.column_name \
         WHERE c.table_schema = 'public' \
         ORDER BY c.table_name, c.ordinal_position"
    }

    fn foreign_key_sql(&self) -> &'static str {
        "SELECT tc.table_name AS child_table, ccu.table_name AS parent_table, \
         kcu.column_name AS child_column, ccu.column_name AS parent_column \
         FROM information_schema.table_constraints tc \
         JOIN information_schema.key_column_usage kcu ON tc.constraint_name = kcu.constraint_name \
         JOIN information_schema.constraint_column_usage ccu ON tc.constraint_name = ccu.constraint_name \
         WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = 'public' \
         ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position"
    }

    fn type_mapper(&self, native_type: &str) -> TypeCategory {
        match native_type.to_ascii_lowercase().as_str() {
            "smallint" | "smallserial" => TypeCategory::Short,
            "integer" | "serial" => TypeCategory::Int,
            "bigint" | "bigserial" => TypeCategory::BigInt,
            "real" | "double precision" => TypeCategory::Float,
            "numeric" | "decimal" | "money" => TypeCategory::Decimal,
            "boolean" => TypeCategory::Boolean,
            "timestamp without time zone" | "timestamp" => TypeCategory::DateTime,
            "timestamp with time zone" | "timestamptz" => TypeCategory::DateTimeOffset,
            "time" | "time without time zone" | "time with time zone" => TypeCategory::Time,
            "character varying" | "varchar" | "text" | "char" | "character" | "uuid" => TypeCategory::String,
            "jsonb" | "json" => TypeCategory::Json,
            "bytea" => TypeCategory::Binary,
            _ => TypeCategory::Unknown,
        }
    }

    fn connect(
        &self,
        url: &str,
        opts: PoolOptions,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<AnyConnectionPool>> + Send>> {
        let url = url.to_string();
        Box::pin(async move { AnyConnectionPool::connect_sqlx_any(&url, opts).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_placeholders_are_one_indexed_dollar_signs() {
        let d = PostgresDialect;
        assert_eq!(d.param_placeholder(0), "$1");
        assert_eq!(d.param_placeholder(2), "$3");
    }

    #[test]
    fn contains_uses_concatenation_not_preformatted_value() {
        let d = PostgresDialect;
        assert_eq!(d.render_like_contains("name", "$1"), "name ILIKE '%' || $1 || '%'");
    }
}
