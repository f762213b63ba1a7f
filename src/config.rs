//! Environment-driven engine configuration.
//!
//! Mirrors the reference application's `Config::from_env`: `.env` is loaded
//! opportunistically (missing file is not an error), then every setting is
//! read from the process environment with a sensible default. The engine
//! itself never reads `std::env` outside of this module — embedders that
//! want a different configuration source can build an `EngineConfig`
//! directly instead of calling `from_env`.

use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub database_url: String,
    pub dialect: DialectKind,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub request_deadline: Option<Duration>,
    pub tenant_context_key: String,
    pub max_pool_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectKind {
    Sqlite,
    Postgres,
    MySql,
    SqlServer,
}

impl DialectKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DialectKind::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "mysql" | "mariadb" => Ok(DialectKind::MySql),
            "mssql" | "sqlserver" | "sql-server" => Ok(DialectKind::SqlServer),
            other => anyhow::bail!("unknown DB_DIALECT '{other}'"),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment, loading a `.env`
    /// file first if one is present (mirrors the teacher application's
    /// startup sequence).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set")?;

        let dialect = match std::env::var("DB_DIALECT") {
            Ok(raw) => DialectKind::parse(&raw)?,
            Err(_) => DialectKind::Sqlite,
        };

        let default_page_size = env_u32("DEFAULT_PAGE_SIZE", 25)?;
        let max_page_size = env_u32("MAX_PAGE_SIZE", 100)?;
        let max_pool_connections = env_u32("MAX_POOL_CONNECTIONS", 10)?;

        let request_deadline = match std::env::var("REQUEST_DEADLINE_MS") {
            Ok(raw) => Some(Duration::from_millis(
                raw.parse::<u64>()
                    .with_context(|| format!("invalid REQUEST_DEADLINE_MS '{raw}'"))?,
            )),
            Err(_) => None,
        };

        let tenant_context_key = std::env::var("TENANT_CONTEXT_KEY")
            .unwrap_or_else(|_| "tenant_id".to_string());

        Ok(EngineConfig {
            database_url,
            dialect,
            default_page_size,
            max_page_size,
            request_deadline,
            tenant_context_key,
            max_pool_connections,
        })
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("invalid {key} '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_kind_parses_known_aliases() {
        assert_eq!(DialectKind::parse("postgresql").unwrap(), DialectKind::Postgres);
        assert_eq!(DialectKind::parse("MSSQL").unwrap(), DialectKind::SqlServer);
        assert!(DialectKind::parse("oracle").is_err());
    }
}
