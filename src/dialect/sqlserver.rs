use super::{Dialect, PoolOptions, TypeCategory};
use crate::error::Result;
use crate::executor::AnyConnectionPool;

pub struct SqlServerDialect;

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "sqlserver"
    }

    fn quote_id(&self, s: &str) -> String {
        format!("[{}]", s.replace(']', "]]"))
    }

    fn render_pagination(&self, offset: Option<i64>, limit: Option<i64>, has_order_by: bool) -> String {
        if offset.is_none() && limit.is_none() {
            return String::new();
        }
        let mut sql = String::new();
        if !has_order_by {
            sql.push_str(self.order_by_sentinel());
            sql.push(' ');
        }
        let offset = offset.unwrap_or(0);
        sql.push_str(&format!("OFFSET {offset} ROWS"));
        if let Some(l) = limit {
            sql.push_str(&format!(" FETCH NEXT {l} ROWS ONLY"));
        }
        sql
    }

    fn render_like_contains(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE '%' + {param} + '%'")
    }

    fn render_like_starts_with(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE {param} + '%'")
    }

    fn render_like_ends_with(&self, column: &str, param: &str) -> String {
        format!("{column} LIKE '%' + {param}")
    }

    fn render_boolean_literal(&self, value: bool) -> String {
        if value { "1".to_string() } else { "0".to_string() }
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("@p{index}")
    }

    fn introspect_sql(&self) -> &'static str {
        "SELECT t.name AS table_name, c.name AS column_name, ty.name AS data_type, \
         c.is_nullable AS is_nullable, c.is_identity AS is_identity, \
         CAST(ISNULL(pk.is_pk, 0) AS BIT) AS pk \
         FROM sys.tables t \
         JOIN sys.columns c ON c.object_id = t.object_id \
         JOIN sys.types ty ON ty.user_type_id = c.user_type_id \
         LEFT JOIN ( \
           SELECT ic.object_id, ic.column_id, 1 AS is_pk \
           FROM sys.index_columns ic \
           JOIN sys.indexes i ON i.object_id = ic.object_id AND i.index_id = ic.index_id \
           WHERE i.is_primary_key = 1 \
         ) pk ON pk.object_id = c.object_id AND pk.column_id = c.column_id \
         ORDER BY t.name, c.column_id"
    }

    fn foreign_key_sql(&self) -> &'static str {
        "SELECT tp.name AS child_table, tr.name AS parent_table, \
         cp.name AS child_column, cr.name AS parent_column \
         FROM sys.foreign_keys fk \
         JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id \
         JOIN sys.tables tp ON tp.object_id = fkc.parent_object_id \
         JOIN sys.tables tr ON tr.object_id = fkc.referenced_object_id \
         JOIN sys.columns cp ON cp.object_id = fkc.parent_object_id AND cp.column_id = fkc.parent_column_id \
         JOIN sys.columns cr ON cr.object_id = fkc.referenced_object_id AND cr.column_id = fkc.referenced_column_id \
         ORDER BY tp.name, fk.name, fkc.constraint_column_id"
    }

    fn type_mapper(&self, native_type: &str) -> TypeCategory {
        match native_type.to_ascii_lowercase().as_str() {
            "tinyint" | "smallint" => TypeCategory::Short,
            "int" => TypeCategory::Int,
            "bigint" => TypeCategory::BigInt,
            "real" | "float" => TypeCategory::Float,
            "decimal" | "numeric" | "money" | "smallmoney" => TypeCategory::Decimal,
            "bit" => TypeCategory::Boolean,
            "datetime" | "datetime2" | "smalldatetime" | "date" => TypeCategory::DateTime,
            "datetimeoffset" => TypeCategory::DateTimeOffset,
            "time" => TypeCategory::Time,
            "varchar" | "nvarchar" | "char" | "nchar" | "text" | "ntext" | "uniqueidentifier" => {
                TypeCategory::String
            }
            "varbinary" | "binary" | "image" => TypeCategory::Binary,
            _ => TypeCategory::Unknown,
        }
    }

    fn connect(
        &self,
        url: &str,
        opts: PoolOptions,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<AnyConnectionPool>> + Send>> {
        let url = url.to_string();
        Box::pin(async move { AnyConnectionPool::connect_tiberius(&url, opts).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_emits_offset_fetch_next() {
        let d = SqlServerDialect;
        assert_eq!(
            d.render_pagination(Some(2), Some(2), true),
            "OFFSET 2 ROWS FETCH NEXT 2 ROWS ONLY"
        );
    }

    #[test]
    fn pagination_without_sort_injects_sentinel() {
        let d = SqlServerDialect;
        let sql = d.render_pagination(None, Some(5), false);
        assert!(sql.starts_with("ORDER BY (SELECT NULL)"));
        assert!(sql.ends_with("FETCH NEXT 5 ROWS ONLY"));
    }

    #[test]
    fn no_pagination_requested_emits_nothing() {
        let d = SqlServerDialect;
        assert_eq!(d.render_pagination(None, None, true), "");
    }
}
