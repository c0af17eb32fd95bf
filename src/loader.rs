use std::path::Path;

use crate::catalog::{ModuleMeta, PermissionCatalog, PermissionMeta};
use crate::errors::PolicyError;
use crate::policy::{parse_kdl_document, ParsedPolicy};
use crate::roles::{Role, RoleRegistry};
use crate::types::Pattern;
use crate::EngineState;

/// Built-in catalog and system roles, compiled from the embedded policy.
const DEFAULT_POLICY: &str = include_str!("../policies/default.kdl");

/// Compile the embedded default policy. Infallible by construction; covered
/// by tests so a bad edit to `policies/default.kdl` fails loudly.
pub fn default_state() -> EngineState {
    compile_policies(vec![
        parse_kdl_document(DEFAULT_POLICY).expect("embedded default policy parses"),
    ])
    .expect("embedded default policy compiles")
}

/// Load all `.kdl` policy files from the given directory and compile them
/// into a single `EngineState`.
pub fn load_policies(dir: &Path) -> Result<EngineState, PolicyError> {
    if !dir.is_dir() {
        return Err(PolicyError::InvalidPolicy(format!(
            "policies directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut all_parsed = Vec::new();
    let mut file_count = 0;

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "kdl")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| PolicyError::PolicyLoad {
                path: path.display().to_string(),
                source,
            })?;
        let parsed = parse_kdl_document(&contents)?;
        all_parsed.push(parsed);
        file_count += 1;
    }

    let state = compile_policies(all_parsed)?;

    tracing::info!(
        files = file_count,
        modules = state.catalog.module_count(),
        permissions = state.catalog.permission_count(),
        roles = state.roles.len(),
        "Loaded permission policies"
    );

    Ok(state)
}

/// Merge and compile parsed policies into a single `EngineState`. Duplicate
/// module names and role ids across files are policy errors; role patterns
/// must be syntactically valid but may reference keys absent from the
/// catalog (permissive by design).
pub fn compile_policies(parsed: Vec<ParsedPolicy>) -> Result<EngineState, PolicyError> {
    let mut catalog = PermissionCatalog::new();
    let mut roles = RoleRegistry::new();

    for policy in parsed {
        for module in policy.modules {
            let permissions = module
                .permissions
                .into_iter()
                .map(|p| {
                    (
                        p.suffix,
                        PermissionMeta {
                            label: p.label,
                            description: p.description,
                        },
                    )
                })
                .collect();
            catalog.register_module(
                &module.name,
                ModuleMeta {
                    label: module.label,
                    icon: module.icon,
                    description: module.description,
                    premium: module.premium,
                },
                permissions,
            )?;
        }

        for node in policy.roles {
            let permissions = node
                .permissions
                .iter()
                .map(|p| Pattern::parse(p))
                .collect::<Result<Vec<_>, _>>()?;
            roles.insert_compiled(Role {
                id: node.id,
                label: node.label,
                description: node.description,
                icon: node.icon,
                color: node.color,
                priority: node.priority,
                permissions,
                is_system: node.system,
            })?;
        }
    }

    Ok(EngineState { catalog, roles })
}
