//! SDL projection: string-based type/field name descriptions the demo
//! binary feeds into a dynamically constructed `async-graphql::dynamic`
//! schema. No runtime reflection or derive-macro entity generation — names
//! are computed straight from the introspected `Table`, per Design Notes.

use crate::model::Table;

#[derive(Debug, Clone)]
pub struct TableTypeDescription {
    pub object_type: String,
    pub filter_type: String,
    pub insert_type: String,
    pub update_type: String,
    pub query_field: String,
    pub mutation_field_insert: String,
    pub mutation_field_update: String,
    pub mutation_field_delete: String,
}

/// Derives every GraphQL type/field name the dynamic schema builder needs
/// for one table, from its `graphql_name` alone.
pub fn describe_table(table: &Table) -> TableTypeDescription {
    let name = &table.graphql_name;
    let singular = singularize(name);
    TableTypeDescription {
        object_type: name.clone(),
        filter_type: format!("{singular}Filter"),
        insert_type: format!("{singular}InsertInput"),
        update_type: format!("{singular}UpdateInput"),
        query_field: lower_first(name),
        mutation_field_insert: format!("insert{singular}"),
        mutation_field_update: format!("update{singular}"),
        mutation_field_delete: format!("delete{singular}"),
    }
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Best-effort inverse of `introspect::pluralize`, used only for naming
/// mutation input types (`"Products"` -> `"Product"`), never for SQL.
fn singularize(plural: &str) -> String {
    if let Some(stem) = plural.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if let Some(stem) = plural.strip_suffix("ses") {
        return stem.to_string();
    }
    if let Some(stem) = plural.strip_suffix('s') {
        if !stem.ends_with('s') {
            return stem.to_string();
        }
    }
    plural.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn table(name: &str) -> Table {
        Table {
            db_name: name.to_lowercase(),
            schema_name: "".into(),
            graphql_name: name.into(),
            columns: vec![],
            primary_keys: vec![],
            single_links: HashMap::new(),
            multi_links: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn describes_mutation_field_names_from_singularized_table_name() {
        let desc = describe_table(&table("Categories"));
        assert_eq!(desc.query_field, "categories");
        assert_eq!(desc.mutation_field_insert, "insertCategory");
        assert_eq!(desc.filter_type, "CategoryFilter");
    }
}
