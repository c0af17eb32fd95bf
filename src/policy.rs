use kdl::KdlDocument;

use crate::errors::PolicyError;

/// A `module` node parsed from a policy document, before catalog assembly.
#[derive(Debug, Clone, Default)]
pub struct ModuleNode {
    pub name: String,
    pub label: String,
    pub icon: String,
    pub description: String,
    pub premium: bool,
    /// (suffix, label, description) triples; suffixes are relative to the
    /// module name.
    pub permissions: Vec<PermissionNode>,
}

#[derive(Debug, Clone, Default)]
pub struct PermissionNode {
    pub suffix: String,
    pub label: String,
    pub description: String,
}

/// A `role` node parsed from a policy document. Patterns stay raw strings
/// here; the loader validates them during compilation.
#[derive(Debug, Clone, Default)]
pub struct RoleNode {
    pub id: String,
    pub label: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub priority: i32,
    pub system: bool,
    pub permissions: Vec<String>,
}

/// Intermediate result from parsing a single KDL file.
#[derive(Debug, Clone, Default)]
pub struct ParsedPolicy {
    pub modules: Vec<ModuleNode>,
    pub roles: Vec<RoleNode>,
}

/// Parse a KDL document string into typed policy structs.
pub fn parse_kdl_document(source: &str) -> Result<ParsedPolicy, PolicyError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| PolicyError::KdlParse(e.to_string()))?;

    let mut policy = ParsedPolicy::default();

    for node in doc.nodes() {
        match node.name().value() {
            "module" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    PolicyError::InvalidPolicy(
                        "module node requires a string argument (e.g. module \"business\")".into(),
                    )
                })?;

                let mut module = ModuleNode {
                    label: string_prop(node, "label").unwrap_or_else(|| name.clone()),
                    icon: string_prop(node, "icon").unwrap_or_default(),
                    description: string_prop(node, "description").unwrap_or_default(),
                    premium: bool_prop(node, "premium").unwrap_or(false),
                    name,
                    permissions: Vec::new(),
                };

                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "permission" => {
                                let suffix = first_string_arg(child).ok_or_else(|| {
                                    PolicyError::InvalidPolicy(format!(
                                        "permission node in module `{}` requires a string argument (e.g. permission \"orders.view\")",
                                        module.name
                                    ))
                                })?;
                                module.permissions.push(PermissionNode {
                                    label: string_prop(child, "label")
                                        .unwrap_or_else(|| suffix.clone()),
                                    description: string_prop(child, "description")
                                        .unwrap_or_default(),
                                    suffix,
                                });
                            }
                            other => {
                                return Err(PolicyError::InvalidPolicy(format!(
                                    "unexpected child `{other}` in module `{}` (expected `permission`)",
                                    module.name
                                )));
                            }
                        }
                    }
                }

                policy.modules.push(module);
            }
            "role" => {
                let id = first_string_arg(node).ok_or_else(|| {
                    PolicyError::InvalidPolicy(
                        "role node requires a string argument (e.g. role \"owner\")".into(),
                    )
                })?;

                let priority = match int_prop(node, "priority") {
                    Some(value) => i32::try_from(value).map_err(|_| {
                        PolicyError::InvalidPolicy(format!(
                            "role `{id}` has out-of-range priority {value}"
                        ))
                    })?,
                    None => 0,
                };

                let mut role = RoleNode {
                    label: string_prop(node, "label").unwrap_or_else(|| id.clone()),
                    description: string_prop(node, "description").unwrap_or_default(),
                    icon: string_prop(node, "icon").unwrap_or_default(),
                    color: string_prop(node, "color").unwrap_or_default(),
                    priority,
                    // Roles defined in policy files are system roles unless
                    // explicitly marked otherwise.
                    system: bool_prop(node, "system").unwrap_or(true),
                    id,
                    permissions: Vec::new(),
                };

                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "permissions" => {
                                role.permissions = dash_list(child);
                            }
                            other => {
                                return Err(PolicyError::InvalidPolicy(format!(
                                    "unexpected child `{other}` in role `{}` (expected `permissions`)",
                                    role.id
                                )));
                            }
                        }
                    }
                }

                policy.roles.push(role);
            }
            other => {
                // Ignore comments and unknown top-level nodes with a warning
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(policy)
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &kdl::KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn string_prop(node: &kdl::KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .map(|e| e.value())
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn bool_prop(node: &kdl::KdlNode, name: &str) -> Option<bool> {
    node.get(name).map(|e| e.value()).and_then(|v| v.as_bool())
}

fn int_prop(node: &kdl::KdlNode, name: &str) -> Option<i64> {
    node.get(name).map(|e| e.value()).and_then(|v| v.as_i64())
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
/// Example KDL:
/// ```kdl
/// permissions {
///     - "business.orders.view"
///     - "production.*"
/// }
/// ```
fn dash_list(node: &kdl::KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(|n| first_string_arg(n))
        .collect()
}
