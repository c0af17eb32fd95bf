//! Palisade - permission engine for the business dashboard
//!
//! Role-based access control with per-user grant/revoke overrides, wildcard
//! permission matching, derived view gating, and a retention-capped audit
//! trail. The engine consumes `User` snapshots and answers permission
//! queries; rendering, transport, and persistence live with its callers.

pub mod audit;
pub mod catalog;
pub mod errors;
pub mod evaluator;
pub mod loader;
pub mod manager;
pub mod policy;
pub mod roles;
pub mod settings;
pub mod types;
pub mod views;

use std::sync::Arc;

use parking_lot::RwLock;

use audit::AuditLog;
use catalog::PermissionCatalog;
use evaluator::PolicyEvaluator;
use manager::CustomRoleManager;
use roles::RoleRegistry;
use views::DerivedViewResolver;

/// Compiled policy state, produced by the loader from KDL policy files.
/// The catalog is immutable for the life of the process; the role registry
/// grows custom roles at runtime through the manager.
#[derive(Debug)]
pub struct EngineState {
    pub catalog: PermissionCatalog,
    pub roles: RoleRegistry,
}

/// Shared handles over one engine instance. Constructed once at startup and
/// handed to collaborators by dependency injection; queries run lock-free of
/// writers, mutations serialize through the registry write lock.
pub struct PolicyEngine {
    catalog: Arc<PermissionCatalog>,
    roles: Arc<RwLock<RoleRegistry>>,
    audit: Arc<AuditLog>,
    origin: Option<String>,
}

impl PolicyEngine {
    pub fn new(state: EngineState, audit_retention: usize) -> Self {
        Self {
            catalog: Arc::new(state.catalog),
            roles: Arc::new(RwLock::new(state.roles)),
            audit: Arc::new(AuditLog::new(audit_retention)),
            origin: None,
        }
    }

    /// Label stamped into the `origin` column of audit entries produced by
    /// managers from this engine.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn evaluator(&self) -> PolicyEvaluator {
        PolicyEvaluator::new(self.catalog.clone(), self.roles.clone())
    }

    pub fn views(&self) -> DerivedViewResolver {
        DerivedViewResolver::new(self.evaluator())
    }

    pub fn manager(&self) -> CustomRoleManager {
        let manager =
            CustomRoleManager::new(self.catalog.clone(), self.roles.clone(), self.audit.clone());
        match &self.origin {
            Some(origin) => manager.with_origin(origin.clone()),
            None => manager,
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Snapshot of all roles, priority descending.
    pub fn roles(&self) -> Vec<roles::Role> {
        self.roles.read().roles().into_iter().cloned().collect()
    }
}
