//! Schema Model (C2): metadata rule parsing plus introspection-to-`DbModel`
//! construction.

pub mod introspect;

use std::collections::HashMap;

use regex::Regex;

use crate::error::{Error, Result};

/// One parsed `schema.table.column { key: value; ... }` rule.
#[derive(Debug, Clone)]
pub struct MetadataRule {
    pub table_glob: String,
    pub column_glob: Option<String>,
    pub is_root: bool,
    pub entries: Vec<(String, String)>,
}

impl MetadataRule {
    fn table_regex(&self) -> Regex {
        glob_to_regex(&self.table_glob)
    }

    fn column_regex(&self) -> Option<Regex> {
        self.column_glob.as_deref().map(glob_to_regex)
    }

    pub fn matches_table(&self, table_name: &str) -> bool {
        !self.is_root && self.table_regex().is_match(table_name)
    }

    pub fn matches_column(&self, table_name: &str, column_name: &str) -> bool {
        if self.is_root || !self.table_regex().is_match(table_name) {
            return false;
        }
        match self.column_regex() {
            Some(re) => re.is_match(column_name),
            None => false,
        }
    }
}

fn glob_to_regex(glob: &str) -> Regex {
    let mut pattern = String::from("^");
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str("[^.]*"),
            c if "\\.+?()|[]{}^$".contains(c) => {
                pattern.push('\\');
                pattern.push(c);
            }
            c => pattern.push(c),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).expect("glob-derived pattern is always valid regex")
}

/// Parses and holds the metadata rule text described in spec §6:
/// `schema.table.column { key: value; key: value }`, `*` wildcards,
/// `:root` targeting the model itself.
pub struct MetadataLoader {
    rules: Vec<MetadataRule>,
}

impl MetadataLoader {
    pub fn parse(source: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for (line_no, raw_line) in source.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let Some(open) = line.find('{') else {
                return Err(Error::invalid_input(
                    "metadata",
                    format!("malformed metadata rule at line {}: missing '{{'", line_no + 1),
                ));
            };
            let Some(close) = line.rfind('}') else {
                return Err(Error::invalid_input(
                    "metadata",
                    format!("malformed metadata rule at line {}: missing '}}'", line_no + 1),
                ));
            };
            let selector = line[..open].trim();
            let body = &line[open + 1..close];

            let (is_root, table_glob, column_glob) = if selector == ":root" {
                (true, String::new(), None)
            } else {
                let mut segments = selector.splitn(3, '.');
                let _schema = segments.next();
                let table = segments.next().unwrap_or("*").to_string();
                let column = segments.next().map(|s| s.to_string());
                (false, table, column)
            };

            let mut entries = Vec::new();
            for entry in body.split(';') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                let Some((key, value)) = entry.split_once(':') else {
                    return Err(Error::invalid_input(
                        "metadata",
                        format!("malformed metadata entry at line {}: '{}'", line_no + 1, entry),
                    ));
                };
                entries.push((key.trim().to_string(), value.trim().to_string()));
            }

            rules.push(MetadataRule { table_glob, column_glob, is_root, entries });
        }
        Ok(MetadataLoader { rules })
    }

    /// Metadata for the model (`:root`). Later rules override earlier ones
    /// for the same key.
    pub fn root_metadata(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for rule in self.rules.iter().filter(|r| r.is_root) {
            for (k, v) in &rule.entries {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    pub fn table_metadata(&self, table_name: &str) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for rule in self.rules.iter().filter(|r| r.column_glob.is_none() && r.matches_table(table_name)) {
            for (k, v) in &rule.entries {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }

    pub fn column_metadata(&self, table_name: &str, column_name: &str) -> HashMap<String, String> {
        let mut out = HashMap::new();
        for rule in self.rules.iter().filter(|r| r.matches_column(table_name, column_name)) {
            for (k, v) in &rule.entries {
                out.insert(k.clone(), v.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_root_and_table_rules_with_override() {
        let src = ":root { tenant-context-key: org_id }\n\
                   schema.products { soft-delete: deleted_at }\n\
                   schema.*.id { populate: created-on }\n";
        let loader = MetadataLoader::parse(src).unwrap();
        assert_eq!(loader.root_metadata().get("tenant-context-key").unwrap(), "org_id");
        assert_eq!(loader.table_metadata("products").get("soft-delete").unwrap(), "deleted_at");
        assert_eq!(loader.column_metadata("orders", "id").get("populate").unwrap(), "created-on");
        assert!(loader.column_metadata("orders", "name").is_empty());
    }

    #[test]
    fn later_rule_overrides_earlier_for_same_key() {
        let src = "schema.products { soft-delete: a }\nschema.products { soft-delete: b }\n";
        let loader = MetadataLoader::parse(src).unwrap();
        assert_eq!(loader.table_metadata("products").get("soft-delete").unwrap(), "b");
    }
}
