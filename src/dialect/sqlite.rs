use super::{Dialect, PoolOptions, TypeCategory};
use crate::error::Result;
use crate::executor::AnyConnectionPool;

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
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
        match (limit, offset) {
            (Some(l), Some(o)) => sql.push_str(&format!("LIMIT {l} OFFSET {o}")),
            (Some(l), None) => sql.push_str(&format!("LIMIT {l}")),
            (None, Some(o)) => sql.push_str(&format!("LIMIT -1 OFFSET {o}")),
            (None, None) => {}
        }
        sql.trim().to_string()
    }

    fn render_like_contains(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE '%' || {param} || '%'")
    }

    fn render_like_starts_with(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE {param} || '%'")
    }

    fn render_like_ends_with(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE '%' || {param}")
    }

    fn render_boolean_literal(&self, value: bool) -> String {
        if value { "1".to_string() } else { "0".to_string() }
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn introspect_sql(&self) -> &'static str {
        "SELECT m.name AS table_name, p.name AS column_name, p.type AS data_type, \
         p.\"notnull\" AS not_null, p.pk AS pk \
         FROM sqlite_master m JOIN pragma_table_info(m.name) p \
         WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%' \
         ORDER BY m.name, p.cid"
    }

    fn foreign_key_sql(&self) -> &'static str {
        "SELECT m.name AS child_table, fk.\"table\" AS parent_table, \
         fk.\"from\" AS child_column, fk.\"to\" AS parent_column \
         FROM sqlite_master m JOIN pragma_foreign_key_list(m.name) fk \
         WHERE m.type = 'table' \
         ORDER BY m.name, fk.\"table\", fk.id, fk.seq"
    }

    fn type_mapper(&self, native_type: &str) -> TypeCategory {
        match native_type.to_ascii_uppercase().as_str() {
            t if t.contains("INT") => TypeCategory::Int,
            t if t.contains("CHAR") || t.contains("TEXT") || t.contains("CLOB") => TypeCategory::String,
            t if t.contains("BLOB") => TypeCategory::Binary,
            t if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") => TypeCategory::Float,
            t if t.contains("DECIMAL") || t.contains("NUMERIC") => TypeCategory::Decimal,
            t if t.contains("BOOL") => TypeCategory::Boolean,
            t if t.contains("DATETIME") || t.contains("TIMESTAMP") => TypeCategory::DateTime,
            t if t.contains("DATE") => TypeCategory::DateTime,
            t if t.contains("JSON") => TypeCategory::Json,
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
    fn pagination_with_no_order_by_injects_sentinel() {
        let d = SqliteDialect;
        let sql = d.render_pagination(Some(2), Some(2), false);
        assert!(sql.starts_with("ORDER BY (SELECT NULL)"));
        assert!(sql.contains("LIMIT 2 OFFSET 2"));
    }

    #[test]
    fn limit_zero_is_syntactically_valid() {
        let d = SqliteDialect;
        assert_eq!(d.render_pagination(None, Some(0), true), "LIMIT 0");
    }

    #[test]
    fn offset_without_limit_uses_sqlite_limit_sentinel() {
        let d = SqliteDialect;
        assert_eq!(d.render_pagination(Some(5), None, true), "LIMIT -1 OFFSET 5");
    }

    #[test]
    fn contains_wraps_param_with_wildcards_via_concatenation() {
        let d = SqliteDialect;
        assert_eq!(d.render_like_contains("name", "?"), "name LIKE '%' || ? || '%'");
    }

    #[test]
    fn starts_with_wraps_trailing_wildcard_only() {
        let d = SqliteDialect;
        assert_eq!(d.render_like_starts_with("name", "?"), "name LIKE ? || '%'");
    }
}
