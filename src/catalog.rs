use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;
use crate::types::is_well_formed_key;

/// Display metadata for a permission module (a namespace grouping).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleMeta {
    pub label: String,
    pub icon: String,
    pub description: String,
    /// Premium modules are hidden from non-premium plans by the UI layer;
    /// the engine only carries the flag.
    #[serde(default)]
    pub premium: bool,
}

/// Display metadata for a single permission key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionMeta {
    pub label: String,
    pub description: String,
}

/// Static registry of every known permission key, grouped into modules.
/// Built once by the loader and immutable afterwards; read operations never
/// fail and unknown keys simply yield `None`.
#[derive(Debug, Clone, Default)]
pub struct PermissionCatalog {
    modules: BTreeMap<String, ModuleMeta>,
    /// Full permission key ("module.resource.action") -> metadata.
    permissions: BTreeMap<String, PermissionMeta>,
}

impl PermissionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module and its permissions. `permissions` carries suffixes
    /// relative to the module name ("orders.view" under "business" becomes
    /// "business.orders.view"). Duplicate module names are rejected.
    pub(crate) fn register_module(
        &mut self,
        name: &str,
        meta: ModuleMeta,
        permissions: Vec<(String, PermissionMeta)>,
    ) -> Result<(), PolicyError> {
        if name.is_empty() || name.contains('.') {
            return Err(PolicyError::InvalidPolicy(format!(
                "invalid module name `{name}` (must be a single non-empty segment)"
            )));
        }
        if self.modules.contains_key(name) {
            return Err(PolicyError::InvalidPolicy(format!(
                "duplicate module `{name}`"
            )));
        }

        for (suffix, perm_meta) in permissions {
            let key = format!("{name}.{suffix}");
            if !is_well_formed_key(&key) {
                return Err(PolicyError::InvalidPolicy(format!(
                    "invalid permission `{suffix}` in module `{name}`"
                )));
            }
            self.permissions.insert(key, perm_meta);
        }
        self.modules.insert(name.to_string(), meta);
        Ok(())
    }

    /// The full set of registered permission keys.
    pub fn permission_keys(&self) -> BTreeSet<String> {
        self.permissions.keys().cloned().collect()
    }

    pub fn permission_meta(&self, key: &str) -> Option<&PermissionMeta> {
        self.permissions.get(key)
    }

    pub fn module_meta(&self, name: &str) -> Option<&ModuleMeta> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &ModuleMeta)> {
        self.modules.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn permission_count(&self) -> usize {
        self.permissions.len()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }
}
