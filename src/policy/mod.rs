//! Policy Layer (C5): filter transformers, mutation transformers, and audit
//! modules, each a plain sequence ordered by priority and wired at startup
//! rather than looked up through a registry/service locator.

pub mod audit;
pub mod auto_filter;
pub mod soft_delete;
pub mod tenant;

use std::collections::HashMap;

use crate::error::Result;
use crate::filter::Filter;
use crate::model::{DbModel, SqlValue, Table};
use crate::plan::ObjectQuery;

/// Caller-supplied request context: claims (tenant id, roles, user id, ...)
/// plus per-request overrides like `include_deleted`.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub claims: HashMap<String, SqlValue>,
    pub include_deleted_globally: bool,
    pub include_deleted_tables: Vec<String>,
}

impl RequestContext {
    pub fn includes_deleted(&self, table: &str) -> bool {
        self.include_deleted_globally
            || self
                .include_deleted_tables
                .iter()
                .any(|t| t.eq_ignore_ascii_case(table))
    }
}

pub trait FilterTransformer: Send + Sync {
    fn priority(&self) -> i32;
    fn applies_to(&self, table: &Table, is_root: bool, ctx: &RequestContext) -> bool;
    fn additional_filter(&self, model: &DbModel, table: &Table, ctx: &RequestContext) -> Result<Option<Filter>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

pub struct MutationTransformResult {
    pub kind: MutationKind,
    pub data: HashMap<String, SqlValue>,
    pub additional_filter: Option<Filter>,
}

pub trait MutationTransformer: Send + Sync {
    fn priority(&self) -> i32;
    fn applies_to(&self, table: &Table, kind: MutationKind, ctx: &RequestContext) -> bool;
    fn transform(
        &self,
        table: &Table,
        kind: MutationKind,
        data: HashMap<String, SqlValue>,
        ctx: &RequestContext,
    ) -> Result<MutationTransformResult>;
}

pub trait AuditModule: Send + Sync {
    fn priority(&self) -> i32;
    fn apply(
        &self,
        table: &Table,
        kind: MutationKind,
        data: &mut HashMap<String, SqlValue>,
        ctx: &RequestContext,
        now: chrono::DateTime<chrono::Utc>,
    );
}

/// Ordered sequences of policies, sorted by priority once at construction.
/// Composition order per spec §4.5: tenant ⇒ auto-filter ⇒ soft-delete ⇒ domain.
pub struct PolicyRegistry {
    filter_transformers: Vec<Box<dyn FilterTransformer>>,
    mutation_transformers: Vec<Box<dyn MutationTransformer>>,
    audit_modules: Vec<Box<dyn AuditModule>>,
}

impl PolicyRegistry {
    pub fn new(
        mut filter_transformers: Vec<Box<dyn FilterTransformer>>,
        mut mutation_transformers: Vec<Box<dyn MutationTransformer>>,
        mut audit_modules: Vec<Box<dyn AuditModule>>,
    ) -> Self {
        filter_transformers.sort_by_key(|t| t.priority());
        mutation_transformers.sort_by_key(|t| t.priority());
        audit_modules.sort_by_key(|t| t.priority());
        PolicyRegistry {
            filter_transformers,
            mutation_transformers,
            audit_modules,
        }
    }

    /// Canonical stack: tenant isolation, auto-filter, soft-delete, in that
    /// priority order.
    pub fn canonical() -> Self {
        PolicyRegistry::new(
            vec![
                Box::new(tenant::TenantIsolation),
                Box::new(auto_filter::AutoFilter),
                Box::new(soft_delete::SoftDeleteFilter),
            ],
            vec![Box::new(soft_delete::SoftDeleteMutation)],
            vec![Box::new(audit::AuditColumns)],
        )
    }

    /// Applies every applicable filter transformer to `query` and recurses
    /// into `links`, ANDing each transformer's additional filter onto the
    /// node's existing filter.
    pub fn apply_filters(&self, model: &DbModel, query: &mut ObjectQuery, ctx: &RequestContext, is_root: bool) -> Result<()> {
        let table = model
            .table(&query.table)
            .ok_or_else(|| crate::error::Error::internal(&query.path, format!("unknown table '{}'", query.table)))?;

        for transformer in &self.filter_transformers {
            if transformer.applies_to(table, is_root, ctx) {
                if let Some(extra) = transformer.additional_filter(model, table, ctx)? {
                    query.filter = Some(match query.filter.take() {
                        Some(existing) => existing.and(extra),
                        None => extra,
                    });
                }
            }
        }

        for child in &mut query.links {
            self.apply_filters(model, child, ctx, false)?;
        }
        Ok(())
    }

    pub fn apply_mutation(
        &self,
        table: &Table,
        mut kind: MutationKind,
        mut data: HashMap<String, SqlValue>,
        ctx: &RequestContext,
    ) -> Result<(MutationKind, HashMap<String, SqlValue>, Option<Filter>)> {
        let mut combined_filter: Option<Filter> = None;
        for transformer in &self.mutation_transformers {
            if transformer.applies_to(table, kind, ctx) {
                let result = transformer.transform(table, kind, data, ctx)?;
                kind = result.kind;
                data = result.data;
                if let Some(extra) = result.additional_filter {
                    combined_filter = Some(match combined_filter.take() {
                        Some(existing) => existing.and(extra),
                        None => extra,
                    });
                }
            }
        }
        Ok((kind, data, combined_filter))
    }

    pub fn apply_audit(
        &self,
        table: &Table,
        kind: MutationKind,
        data: &mut HashMap<String, SqlValue>,
        ctx: &RequestContext,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        for module in &self.audit_modules {
            module.apply(table, kind, data, ctx, now);
        }
    }
}
