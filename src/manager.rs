use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;

use crate::audit::{ActorInfo, AuditAction, AuditDraft, AuditEntry, AuditLog};
use crate::catalog::PermissionCatalog;
use crate::errors::PolicyError;
use crate::roles::{Role, RolePatch, RoleRegistry};
use crate::types::{Actor, Pattern, User};

/// Roles at or above this priority form the owner tier: only an owner-tier
/// actor may assign such a role or modify a user who holds one.
pub const OWNER_TIER_PRIORITY: i32 = 100;

/// Definition of a new custom role as supplied by the team-management UI.
#[derive(Debug, Clone)]
pub struct RoleDraft {
    pub id: String,
    pub label: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub priority: i32,
    pub permissions: Vec<Pattern>,
}

/// Orchestrates every policy mutation: custom role lifecycle, per-user
/// overrides, and role assignment. Every mutation takes the registry's
/// write lock and holds it across its audit append, so entry order in the
/// log matches the order the mutations landed. An audit append failure
/// never rolls back the mutation, it surfaces to the caller as
/// `AuditWriteFailure`.
pub struct CustomRoleManager {
    catalog: Arc<PermissionCatalog>,
    roles: Arc<RwLock<RoleRegistry>>,
    audit: Arc<AuditLog>,
    origin: Option<String>,
}

impl CustomRoleManager {
    pub fn new(
        catalog: Arc<PermissionCatalog>,
        roles: Arc<RwLock<RoleRegistry>>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            catalog,
            roles,
            audit,
            origin: None,
        }
    }

    /// Label recorded in the `origin` column of audit entries.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Create a custom role. Patterns are accepted without catalog
    /// validation; the id must be unique across system and custom roles.
    pub fn create_role(&self, draft: RoleDraft, actor: &Actor) -> Result<Role, PolicyError> {
        let mut registry = self.roles.write();
        let role = registry.create_role(Role {
            id: draft.id,
            label: draft.label,
            description: draft.description,
            icon: draft.icon,
            color: draft.color,
            priority: draft.priority,
            permissions: draft.permissions,
            is_system: false,
        })?;
        tracing::info!(role = %role.id, actor = %actor.id, "Created custom role");

        self.record(
            AuditDraft::new(AuditAction::RoleCreate, actor_info(actor))
                .target(role.id.clone(), role.label.clone())
                .details(json!({
                    "role_id": role.id,
                    "role_label": role.label,
                    "permissions_count": role.permissions.len(),
                })),
        )?;
        Ok(role)
    }

    /// Patch a custom role. System roles refuse mutation; owner-tier custom
    /// roles may only be touched by owner-tier actors. The tier check
    /// covers the post-patch priority too, so a patch cannot promote a role
    /// into the owner tier without owner approval.
    pub fn update_role(
        &self,
        id: &str,
        patch: RolePatch,
        actor: &Actor,
    ) -> Result<Role, PolicyError> {
        let mut registry = self.roles.write();
        if let Some(existing) = registry.role(id) {
            let patched_priority = patch.priority.unwrap_or(existing.priority);
            if (tier(existing.priority) || tier(patched_priority))
                && !self.actor_is_owner_tier(&registry, actor)
            {
                tracing::warn!(role = id, actor = %actor.id, "Refused owner-tier role update");
                return Err(PolicyError::UnauthorizedMutation(format!(
                    "only an owner-tier actor may modify role `{id}` at this tier"
                )));
            }
        }
        let role = registry.update_role(id, patch)?;
        tracing::info!(role = %role.id, actor = %actor.id, "Updated custom role");

        self.record(
            AuditDraft::new(AuditAction::RoleUpdate, actor_info(actor))
                .target(role.id.clone(), role.label.clone())
                .details(json!({
                    "role_id": role.id,
                    "permissions_count": role.permissions.len(),
                })),
        )?;
        Ok(role)
    }

    /// Grant `permission` to the user, clearing any revoke of it.
    pub fn grant_permission(
        &self,
        user: &mut User,
        permission: &str,
        actor: &Actor,
    ) -> Result<AuditEntry, PolicyError> {
        let pattern = Pattern::parse(permission)?;
        let _registry = self.roles.write();
        user.overrides.add_grant(pattern);
        tracing::info!(user = %user.id, permission, actor = %actor.id, "Granted permission");

        self.record(
            AuditDraft::new(AuditAction::PermissionGrant, actor_info(actor))
                .target(user.id.clone(), user.id.clone())
                .details(json!({ "permission": permission })),
        )
    }

    /// Revoke `permission` from the user, clearing any grant of it. Revoke
    /// dominates whatever the role would allow.
    pub fn revoke_permission(
        &self,
        user: &mut User,
        permission: &str,
        actor: &Actor,
    ) -> Result<AuditEntry, PolicyError> {
        let pattern = Pattern::parse(permission)?;
        let _registry = self.roles.write();
        user.overrides.add_revoke(pattern);
        tracing::info!(user = %user.id, permission, actor = %actor.id, "Revoked permission");

        self.record(
            AuditDraft::new(AuditAction::PermissionRevoke, actor_info(actor))
                .target(user.id.clone(), user.id.clone())
                .details(json!({ "permission": permission })),
        )
    }

    /// Return a permission override to the default state (neither granted
    /// nor revoked). Not audited: the team-management flow only records
    /// grant and revoke transitions.
    pub fn clear_override(&self, user: &mut User, permission: &str) -> Result<(), PolicyError> {
        let pattern = Pattern::parse(permission)?;
        user.overrides.clear(&pattern);
        Ok(())
    }

    /// Assign a different role to the user. The target role must exist, and
    /// owner-tier roles (current or new) require an owner-tier actor.
    pub fn change_role(
        &self,
        user: &mut User,
        new_role: &str,
        actor: &Actor,
    ) -> Result<AuditEntry, PolicyError> {
        let old_role = user.role.clone();
        let registry = self.roles.write();
        let target = registry
            .role(new_role)
            .ok_or_else(|| PolicyError::UnknownRole(new_role.to_string()))?;
        let current_tier = registry
            .role(&old_role)
            .map(|r| tier(r.priority))
            .unwrap_or(false);
        if (tier(target.priority) || current_tier) && !self.actor_is_owner_tier(&registry, actor) {
            tracing::warn!(
                user = %user.id,
                new_role,
                actor = %actor.id,
                "Refused owner-tier role assignment"
            );
            return Err(PolicyError::UnauthorizedMutation(format!(
                "only an owner-tier actor may assign role `{new_role}`"
            )));
        }

        user.role = new_role.to_string();
        tracing::info!(user = %user.id, old_role, new_role, actor = %actor.id, "Changed role");

        self.record(
            AuditDraft::new(AuditAction::RoleChange, actor_info(actor))
                .target(user.id.clone(), user.id.clone())
                .details(json!({ "old_role": old_role, "new_role": new_role })),
        )
    }

    fn actor_is_owner_tier(&self, registry: &RoleRegistry, actor: &Actor) -> bool {
        registry
            .role(&actor.role)
            .map(|r| tier(r.priority))
            .unwrap_or(false)
    }

    fn record(&self, draft: AuditDraft) -> Result<AuditEntry, PolicyError> {
        self.audit.append(draft.origin(self.origin.clone()))
    }
}

fn tier(priority: i32) -> bool {
    priority >= OWNER_TIER_PRIORITY
}

fn actor_info(actor: &Actor) -> ActorInfo {
    ActorInfo {
        id: actor.id.clone(),
        name: actor.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditFilter;
    use crate::evaluator::{PermissionQuery, PolicyEvaluator};
    use crate::loader::default_state;

    struct Fixture {
        manager: CustomRoleManager,
        evaluator: PolicyEvaluator,
        audit: Arc<AuditLog>,
        roles: Arc<RwLock<RoleRegistry>>,
    }

    fn fixture() -> Fixture {
        let state = default_state();
        let catalog = Arc::new(state.catalog);
        let roles = Arc::new(RwLock::new(state.roles));
        let audit = Arc::new(AuditLog::default());
        Fixture {
            manager: CustomRoleManager::new(catalog.clone(), roles.clone(), audit.clone())
                .with_origin("test"),
            evaluator: PolicyEvaluator::new(catalog, roles.clone()),
            audit,
            roles,
        }
    }

    fn owner_actor() -> Actor {
        Actor::new("u-owner", "Olive Owner", "owner")
    }

    fn manager_actor() -> Actor {
        Actor::new("u-mgr", "Mani Manager", "manager")
    }

    fn draft(id: &str, priority: i32, patterns: &[&str]) -> RoleDraft {
        RoleDraft {
            id: id.into(),
            label: id.into(),
            description: String::new(),
            icon: String::new(),
            color: String::new(),
            priority,
            permissions: patterns.iter().map(|p| Pattern::parse(p).unwrap()).collect(),
        }
    }

    #[test]
    fn test_create_role_appends_audit_entry() {
        let fx = fixture();
        let role = fx
            .manager
            .create_role(draft("auditor", 30, &["reports.*"]), &owner_actor())
            .unwrap();
        assert!(!role.is_system);

        let entries = fx.audit.query(&AuditFilter::default());
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.action, AuditAction::RoleCreate);
        assert_eq!(entry.actor.name, "Olive Owner");
        assert_eq!(entry.details["role_id"], "auditor");
        assert_eq!(entry.details["permissions_count"], 1);
        assert_eq!(entry.origin.as_deref(), Some("test"));
    }

    #[test]
    fn test_create_role_duplicate_system_id() {
        let fx = fixture();
        let err = fx
            .manager
            .create_role(draft("owner", 1, &["business.*"]), &owner_actor())
            .unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateRole(_)));
        // Nothing audited on failure.
        assert!(fx.audit.is_empty());
    }

    #[test]
    fn test_update_role_audits() {
        let fx = fixture();
        fx.manager
            .create_role(draft("auditor", 30, &["reports.*"]), &owner_actor())
            .unwrap();
        fx.manager
            .update_role(
                "auditor",
                RolePatch {
                    priority: Some(35),
                    ..Default::default()
                },
                &owner_actor(),
            )
            .unwrap();

        let updates = fx.audit.query(&AuditFilter {
            action: Some(AuditAction::RoleUpdate),
            ..Default::default()
        });
        assert_eq!(updates.len(), 1);
    }

    #[test]
    fn test_update_owner_tier_custom_role_requires_owner_actor() {
        let fx = fixture();
        fx.manager
            .create_role(draft("co-owner", 100, &["*"]), &owner_actor())
            .unwrap();

        let err = fx
            .manager
            .update_role(
                "co-owner",
                RolePatch {
                    label: Some("Renamed".into()),
                    ..Default::default()
                },
                &manager_actor(),
            )
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnauthorizedMutation(_)));

        assert!(fx
            .manager
            .update_role(
                "co-owner",
                RolePatch {
                    label: Some("Renamed".into()),
                    ..Default::default()
                },
                &owner_actor(),
            )
            .is_ok());
    }

    #[test]
    fn test_promoting_role_into_owner_tier_requires_owner_actor() {
        let fx = fixture();
        fx.manager
            .create_role(draft("helper", 10, &["reports.summary.view"]), &owner_actor())
            .unwrap();

        // A below-tier actor must not be able to lift a role into the owner
        // tier, with or without a permission widening in the same patch.
        let err = fx
            .manager
            .update_role(
                "helper",
                RolePatch {
                    priority: Some(150),
                    permissions: Some(vec![Pattern::parse("*").unwrap()]),
                    ..Default::default()
                },
                &manager_actor(),
            )
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnauthorizedMutation(_)));

        assert_eq!(fx.roles.read().role("helper").unwrap().priority, 10);
        let holder = User::new("u-9", "helper");
        assert!(!fx.evaluator.evaluate(&holder, "settings.billing.manage"));

        // The same patch from an owner-tier actor goes through.
        let promoted = fx
            .manager
            .update_role(
                "helper",
                RolePatch {
                    priority: Some(150),
                    permissions: Some(vec![Pattern::parse("*").unwrap()]),
                    ..Default::default()
                },
                &owner_actor(),
            )
            .unwrap();
        assert_eq!(promoted.priority, 150);
    }

    #[test]
    fn test_concurrent_updates_keep_audit_in_mutation_order() {
        let fx = fixture();
        fx.manager
            .create_role(draft("contested", 20, &["reports.*"]), &owner_actor())
            .unwrap();
        let actor = owner_actor();

        let manager = &fx.manager;
        let actor_ref = &actor;
        std::thread::scope(|s| {
            for patterns in [
                &["business.orders.view"][..],
                &["business.orders.view", "reports.summary.view"][..],
            ] {
                s.spawn(move || {
                    for _ in 0..25 {
                        manager
                            .update_role(
                                "contested",
                                RolePatch {
                                    permissions: Some(
                                        patterns
                                            .iter()
                                            .map(|p| Pattern::parse(p).unwrap())
                                            .collect(),
                                    ),
                                    ..Default::default()
                                },
                                actor_ref,
                            )
                            .unwrap();
                    }
                });
            }
        });

        // The newest role_update entry must describe the permission list the
        // registry actually ended up with.
        let updates = fx.audit.query(&AuditFilter {
            action: Some(AuditAction::RoleUpdate),
            ..Default::default()
        });
        assert_eq!(updates.len(), 50);
        let current = fx.roles.read().role("contested").unwrap().permissions.len();
        assert_eq!(updates[0].details["permissions_count"], current);
    }

    #[test]
    fn test_grant_then_toggle_to_revoke() {
        let fx = fixture();
        let mut user = User::new("u-7", "worker");
        let actor = manager_actor();

        fx.manager
            .grant_permission(&mut user, "ai.generation.create", &actor)
            .unwrap();
        assert!(fx.evaluator.evaluate(&user, "ai.generation.create"));

        fx.manager
            .revoke_permission(&mut user, "ai.generation.create", &actor)
            .unwrap();
        assert!(!fx.evaluator.evaluate(&user, "ai.generation.create"));
        assert!(user.overrides.grant.is_empty());

        let entries = fx.audit.query(&AuditFilter::default());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::PermissionRevoke);
        assert_eq!(entries[1].action, AuditAction::PermissionGrant);
    }

    #[test]
    fn test_grant_rejects_malformed_permission() {
        let fx = fixture();
        let mut user = User::new("u-7", "worker");
        let err = fx
            .manager
            .grant_permission(&mut user, "nodot", &owner_actor())
            .unwrap_err();
        assert!(matches!(err, PolicyError::Validation(_)));
        assert!(user.overrides.is_empty());
    }

    #[test]
    fn test_clear_override_restores_role_default() {
        let fx = fixture();
        let mut user = User::new("u-7", "worker");
        fx.manager
            .revoke_permission(&mut user, "production.printers.control", &owner_actor())
            .unwrap();
        assert!(!fx.evaluator.evaluate(&user, "production.printers.control"));

        fx.manager
            .clear_override(&mut user, "production.printers.control")
            .unwrap();
        assert!(fx.evaluator.evaluate(&user, "production.printers.control"));
    }

    #[test]
    fn test_change_role_audits_old_and_new() {
        let fx = fixture();
        let mut user = User::new("u-7", "viewer");
        fx.manager
            .change_role(&mut user, "worker", &manager_actor())
            .unwrap();
        assert_eq!(user.role, "worker");

        let entries = fx.audit.query(&AuditFilter::default());
        assert_eq!(entries[0].details["old_role"], "viewer");
        assert_eq!(entries[0].details["new_role"], "worker");
    }

    #[test]
    fn test_change_role_unknown_target() {
        let fx = fixture();
        let mut user = User::new("u-7", "viewer");
        let err = fx
            .manager
            .change_role(&mut user, "ghost", &owner_actor())
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownRole(_)));
        assert_eq!(user.role, "viewer");
    }

    #[test]
    fn test_only_owner_tier_assigns_owner_role() {
        let fx = fixture();
        let mut user = User::new("u-7", "worker");

        let err = fx
            .manager
            .change_role(&mut user, "owner", &manager_actor())
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnauthorizedMutation(_)));
        assert_eq!(user.role, "worker");

        fx.manager
            .change_role(&mut user, "owner", &owner_actor())
            .unwrap();
        assert_eq!(user.role, "owner");
    }

    #[test]
    fn test_demoting_owner_requires_owner_actor() {
        let fx = fixture();
        let mut user = User::new("u-1", "owner");
        let err = fx
            .manager
            .change_role(&mut user, "viewer", &manager_actor())
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnauthorizedMutation(_)));
        assert_eq!(user.role, "owner");
    }
}
