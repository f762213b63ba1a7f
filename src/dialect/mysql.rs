use super::{Dialect, PoolOptions, TypeCategory};
use crate::error::Result;
use crate::executor::AnyConnectionPool;

pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_id(&self, s: &str) -> String {
        format!("`{}`", s.replace('`', "``"))
    }

    fn render_pagination(&self, offset: Option<i64>, limit: Option<i64>, has_order_by: bool) -> String {
        let mut sql = String::new();
        if (offset.is_some() || limit.is_some()) && !has_order_by {
            sql.push_str(self.order_by_sentinel());
            sql.push(' ');
        }
        match (limit, offset) {
            (Some(l), Some(o)) => sql.push_str(&format!("LIMIT {o}, {l}")),
            (Some(l), None) => sql.push_str(&format!("LIMIT {l}")),
            // MySQL has no OFFSET-without-LIMIT syntax; use the documented
            // "practically unbounded" row count.
            (None, Some(o)) => sql.push_str(&format!("LIMIT {o}, 18446744073709551615")),
            (None, None) => {}
        }
        sql.trim().to_string()
    }

    fn order_by_sentinel(&self) -> &'static str {
        "ORDER BY (SELECT 1)"
    }

    // MySQL's `||` is logical OR unless PIPES_AS_CONCAT is set, so wildcard
    // wrapping goes through CONCAT() rather than the `||`/`+` operator the
    // other three dialects use.
    fn render_like_contains(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE CONCAT('%', {param}, '%')")
    }

    fn render_like_starts_with(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE CONCAT({param}, '%')")
    }

    fn render_like_ends_with(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE CONCAT('%', {param})")
    }

    fn render_boolean_literal(&self, value: bool) -> String {
        if value { "1".to_string() } else { "0".to_string() }
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn introspect_sql(&self) -> &'static str {
        "SELECT c.table_name, c.column_name, c.data_type, \
         c.is_nullable = 'NO' AS not_null, \
         c.extra LIKE '%auto_increment%' AS is_identity, \
         c.column_key = 'PRI' AS pk \
         FROM information_schema.columns c \
         WHERE c.table_schema = DATABASE() \
         ORDER BY c.table_name, c.ordinal_position"
    }

    fn foreign_key_sql(&self) -> &'static str {
        "SELECT table_name AS child_table, referenced_table_name AS parent_table, \
         column_name AS child_column, referenced_column_name AS parent_column \
         FROM information_schema.key_column_usage \
         WHERE table_schema = DATABASE() AND referenced_table_name IS NOT NULL \
         ORDER BY table_name, constraint_name, ordinal_position"
    }

    fn type_mapper(&self, native_type: &str) -> TypeCategory {
        match native_type.to_ascii_lowercase().as_str() {
            "tinyint" | "smallint" => TypeCategory::Short,
            "int" | "mediumint" => TypeCategory::Int,
            "bigint" => TypeCategory::BigInt,
            "float" | "double" => TypeCategory::Float,
            "decimal" | "numeric" => TypeCategory::Decimal,
            "bool" | "boolean" => TypeCategory::Boolean,
            "datetime" => TypeCategory::DateTime,
            "timestamp" => TypeCategory::DateTimeOffset,
            "time" => TypeCategory::Time,
            "varchar" | "char" | "text" | "longtext" | "mediumtext" | "tinytext" => TypeCategory::String,
            "json" => TypeCategory::Json,
            "blob" | "longblob" | "mediumblob" | "tinyblob" | "binary" | "varbinary" => TypeCategory::Binary,
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
    fn pagination_uses_offset_comma_limit_form() {
        let d = MySqlDialect;
        assert_eq!(d.render_pagination(Some(2), Some(2), true), "LIMIT 2, 2");
    }

    #[test]
    fn contains_wraps_param_in_concat() {
        let d = MySqlDialect;
        assert_eq!(d.render_like_contains("name", "?"), "name LIKE CONCAT('%', ?, '%')");
    }

    #[test]
    fn ends_with_wraps_leading_wildcard_only() {
        let d = MySqlDialect;
        assert_eq!(d.render_like_ends_with("name", "?"), "name LIKE CONCAT('%', ?)");
    }
}
