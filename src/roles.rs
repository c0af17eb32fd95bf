use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;
use crate::types::Pattern;

/// A named, prioritized bundle of permission patterns. System roles are
/// fixed at load time; custom roles are created and updated at runtime
/// through the [`crate::manager::CustomRoleManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    pub priority: i32,
    pub permissions: Vec<Pattern>,
    pub is_system: bool,
}

impl Role {
    pub fn is_custom(&self) -> bool {
        !self.is_system
    }
}

/// Partial update applied to a custom role. `None` fields are left as-is.
#[derive(Debug, Clone, Default)]
pub struct RolePatch {
    pub label: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub priority: Option<i32>,
    pub permissions: Option<Vec<Pattern>>,
}

/// All known roles, system and custom, keyed by globally unique id.
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: BTreeMap<String, Role>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a role during policy compilation. Duplicate ids across files
    /// are a policy error, not a runtime `DuplicateRole`.
    pub(crate) fn insert_compiled(&mut self, role: Role) -> Result<(), PolicyError> {
        if self.roles.contains_key(&role.id) {
            return Err(PolicyError::InvalidPolicy(format!(
                "duplicate role `{}`",
                role.id
            )));
        }
        self.roles.insert(role.id.clone(), role);
        Ok(())
    }

    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles.get(id)
    }

    /// All roles sorted by priority descending, ties broken by id so the
    /// listing is deterministic.
    pub fn roles(&self) -> Vec<&Role> {
        let mut all: Vec<&Role> = self.roles.values().collect();
        all.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Create a custom role. The id must not collide with any existing role,
    /// system or custom. Permission patterns are accepted without checking
    /// them against the catalog.
    pub fn create_role(&mut self, role: Role) -> Result<Role, PolicyError> {
        if self.roles.contains_key(&role.id) {
            return Err(PolicyError::DuplicateRole(role.id));
        }
        self.roles.insert(role.id.clone(), role.clone());
        Ok(role)
    }

    /// Apply a patch to a custom role. System roles reject mutation outright.
    pub fn update_role(&mut self, id: &str, patch: RolePatch) -> Result<Role, PolicyError> {
        let role = self
            .roles
            .get_mut(id)
            .ok_or_else(|| PolicyError::UnknownRole(id.to_string()))?;
        if role.is_system {
            return Err(PolicyError::UnauthorizedMutation(format!(
                "system role `{id}` is immutable"
            )));
        }

        if let Some(label) = patch.label {
            role.label = label;
        }
        if let Some(description) = patch.description {
            role.description = description;
        }
        if let Some(icon) = patch.icon {
            role.icon = icon;
        }
        if let Some(color) = patch.color {
            role.color = color;
        }
        if let Some(priority) = patch.priority {
            role.priority = priority;
        }
        if let Some(permissions) = patch.permissions {
            role.permissions = permissions;
        }
        Ok(role.clone())
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}
