//! Core data model: columns, tables, links, and the immutable `DbModel`
//! built once from introspection at startup.
//!
//! Tables are stored in a vector and referenced by index everywhere else
//! (links, lookups) rather than by pointer or name, which is what lets two
//! tables reference each other without Rust fighting a cycle.

use std::collections::HashMap;

use crate::dialect::TypeCategory;

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub graphql_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_identity: bool,
    pub is_primary_key: bool,
    pub metadata: HashMap<String, String>,
}

impl Column {
    pub fn populate_kind(&self) -> Option<&str> {
        self.metadata.get("populate").map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Single,
    Multi,
}

/// A foreign-key-derived relationship. `parent_table`/`child_table` are
/// indices into `DbModel::tables`; the FK lives on the child side.
#[derive(Debug, Clone)]
pub struct Link {
    pub kind: LinkKind,
    pub name: String,
    pub parent_table: usize,
    pub parent_columns: Vec<String>,
    pub child_table: usize,
    pub child_columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Table {
    pub db_name: String,
    pub schema_name: String,
    pub graphql_name: String,
    pub columns: Vec<Column>,
    pub primary_keys: Vec<String>,
    pub single_links: HashMap<String, Link>,
    pub multi_links: HashMap<String, Link>,
    pub metadata: HashMap<String, String>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn link(&self, name: &str) -> Option<(LinkKind, &Link)> {
        if let Some(l) = self.single_links.get(&name.to_ascii_lowercase()) {
            return Some((LinkKind::Single, l));
        }
        if let Some(l) = self.multi_links.get(&name.to_ascii_lowercase()) {
            return Some((LinkKind::Multi, l));
        }
        None
    }

    pub fn qualified_name(&self) -> String {
        if self.schema_name.is_empty() {
            self.db_name.clone()
        } else {
            format!("{}.{}", self.schema_name, self.db_name)
        }
    }
}

/// Built once from the introspection source; immutable afterward. Table
/// lookups are case-insensitive by table name.
#[derive(Debug, Clone)]
pub struct DbModel {
    tables: Vec<Table>,
    by_name: HashMap<String, usize>,
    pub type_mapper: fn(&str) -> TypeCategory,
    pub metadata: HashMap<String, String>,
}

impl DbModel {
    pub fn new(
        tables: Vec<Table>,
        type_mapper: fn(&str) -> TypeCategory,
        metadata: HashMap<String, String>,
    ) -> Self {
        let by_name = tables
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.graphql_name.to_ascii_lowercase(), idx))
            .collect();
        DbModel {
            tables,
            by_name,
            type_mapper,
            metadata,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&idx| &self.tables[idx])
    }

    pub fn table_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn table_at(&self, idx: usize) -> &Table {
        &self.tables[idx]
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub column: String,
    pub direction: SortDirection,
}

/// A value bound into a parameter slot. Kept as a small closed set rather
/// than `serde_json::Value` so the renderer and executor share one vocabulary
/// with the driver layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(chrono::DateTime<chrono::Utc>),
    Decimal(rust_decimal::Decimal),
    Uuid(uuid::Uuid),
}

impl SqlValue {
    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => SqlValue::Null,
            serde_json::Value::Bool(b) => SqlValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else {
                    // Parsed from the number's decimal text rather than through
                    // `f64` so fractional literals (decimal-column arguments)
                    // keep their exact digits instead of a binary-float rounding.
                    match n.to_string().parse::<rust_decimal::Decimal>() {
                        Ok(d) => SqlValue::Decimal(d),
                        Err(_) => SqlValue::Float(n.as_f64().unwrap_or_default()),
                    }
                }
            }
            serde_json::Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}
