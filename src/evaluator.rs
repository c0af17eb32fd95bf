use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::PermissionCatalog;
use crate::roles::RoleRegistry;
use crate::types::{is_well_formed_key, Pattern, User};

/// Boolean permission queries, the seam consumers depend on. Constructed
/// once per session and passed to collaborators; UI code never reaches for
/// ambient state.
pub trait PermissionQuery {
    /// True if the user holds `permission`. Total: malformed permission
    /// strings and unknown roles yield `false`, never an error.
    fn evaluate(&self, user: &User, permission: &str) -> bool;

    fn evaluate_any(&self, user: &User, permissions: &[&str]) -> bool {
        permissions.iter().any(|p| self.evaluate(user, p))
    }

    fn evaluate_all(&self, user: &User, permissions: &[&str]) -> bool {
        permissions.iter().all(|p| self.evaluate(user, p))
    }
}

/// Realize a pattern list against a full key set. Used for reporting and UI
/// enumeration; membership checks go through pattern matching directly.
pub fn expand<'a, I>(patterns: &[Pattern], all_keys: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    all_keys
        .into_iter()
        .filter(|key| patterns.iter().any(|p| p.matches(key)))
        .cloned()
        .collect()
}

/// Computes effective permissions from an immutable catalog and the shared
/// role registry. Queries take a read lock only; they are side-effect-free
/// and safe to run concurrently from any number of callers.
#[derive(Clone)]
pub struct PolicyEvaluator {
    catalog: Arc<PermissionCatalog>,
    roles: Arc<RwLock<RoleRegistry>>,
}

impl PolicyEvaluator {
    pub fn new(catalog: Arc<PermissionCatalog>, roles: Arc<RwLock<RoleRegistry>>) -> Self {
        Self { catalog, roles }
    }

    /// The user's realized permission set:
    /// `expand(role ∪ grant) \ expand(revoke)` over the catalog keys.
    pub fn effective_permissions(&self, user: &User) -> BTreeSet<String> {
        let registry = self.roles.read();
        let role_patterns = registry
            .role(&user.role)
            .map(|r| r.permissions.clone())
            .unwrap_or_default();

        let all_keys = self.catalog.permission_keys();
        let mut effective = expand(&role_patterns, &all_keys);
        effective.extend(expand(&user.overrides.grant, &all_keys));
        for revoked in expand(&user.overrides.revoke, &all_keys) {
            effective.remove(&revoked);
        }
        effective
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }
}

impl PermissionQuery for PolicyEvaluator {
    fn evaluate(&self, user: &User, permission: &str) -> bool {
        if !is_well_formed_key(permission) {
            return false;
        }

        let registry = self.roles.read();
        let Some(role) = registry.role(&user.role) else {
            return false;
        };

        // Revoke dominates grant, grant dominates role-default. Evaluated
        // per query against the raw pattern lists, never pre-expanded.
        let role_hit = role.permissions.iter().any(|p| p.matches(permission));
        let grant_hit = user.overrides.grant.iter().any(|p| p.matches(permission));
        let revoke_hit = user.overrides.revoke.iter().any(|p| p.matches(permission));

        (role_hit || grant_hit) && !revoke_hit
    }
}
