use serde::{Deserialize, Serialize};

use crate::errors::PolicyError;

/// True if `key` is a well-formed permission key: at least two
/// dot-separated, non-empty segments (e.g. "business.orders.view").
/// Malformed keys never match any pattern and never satisfy any check.
pub fn is_well_formed_key(key: &str) -> bool {
    let mut segments = 0;
    for segment in key.split('.') {
        if segment.is_empty() {
            return false;
        }
        segments += 1;
    }
    segments >= 2
}

/// A permission pattern: a literal key, a `prefix.*` wildcard, or the
/// universal `*`. Validated at construction; the matching grammar lives in
/// [`Pattern::matches`] and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Pattern {
    /// `*` matches every permission.
    Universal,
    /// `prefix.*` matches every permission under `prefix.` (the prefix is
    /// stored without the trailing `.*`).
    Prefix(String),
    /// An exact permission key.
    Literal(String),
}

impl Pattern {
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        if s == "*" {
            return Ok(Pattern::Universal);
        }
        if let Some(prefix) = s.strip_suffix(".*") {
            if prefix.is_empty() || prefix.split('.').any(|seg| seg.is_empty()) {
                return Err(PolicyError::Validation(format!(
                    "wildcard pattern `{s}` has an empty prefix segment"
                )));
            }
            return Ok(Pattern::Prefix(prefix.to_string()));
        }
        if !is_well_formed_key(s) {
            return Err(PolicyError::Validation(format!(
                "literal pattern `{s}` is not a `module.resource.action` key"
            )));
        }
        Ok(Pattern::Literal(s.to_string()))
    }

    /// The three-case matching grammar: exact key, `prefix.*`, or `*`.
    pub fn matches(&self, permission: &str) -> bool {
        match self {
            Pattern::Universal => true,
            Pattern::Prefix(prefix) => permission
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.')),
            Pattern::Literal(key) => key == permission,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        !matches!(self, Pattern::Literal(_))
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Universal => f.write_str("*"),
            Pattern::Prefix(prefix) => write!(f, "{prefix}.*"),
            Pattern::Literal(key) => f.write_str(key),
        }
    }
}

impl TryFrom<String> for Pattern {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Pattern::parse(&value)
    }
}

impl From<Pattern> for String {
    fn from(value: Pattern) -> Self {
        value.to_string()
    }
}

/// Override state of a single pattern for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideState {
    Default,
    Granted,
    Revoked,
}

/// Per-user grant/revoke override lists. The two lists are kept mutually
/// exclusive per pattern; toggling a pattern into one side removes it from
/// the other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideSet {
    #[serde(default)]
    pub grant: Vec<Pattern>,
    #[serde(default)]
    pub revoke: Vec<Pattern>,
}

impl OverrideSet {
    pub fn state_of(&self, pattern: &Pattern) -> OverrideState {
        if self.grant.contains(pattern) {
            OverrideState::Granted
        } else if self.revoke.contains(pattern) {
            OverrideState::Revoked
        } else {
            OverrideState::Default
        }
    }

    /// Move `pattern` into the grant list, clearing any revoke of it.
    pub fn add_grant(&mut self, pattern: Pattern) {
        self.revoke.retain(|p| *p != pattern);
        if !self.grant.contains(&pattern) {
            self.grant.push(pattern);
        }
    }

    /// Move `pattern` into the revoke list, clearing any grant of it.
    pub fn add_revoke(&mut self, pattern: Pattern) {
        self.grant.retain(|p| *p != pattern);
        if !self.revoke.contains(&pattern) {
            self.revoke.push(pattern);
        }
    }

    /// Return `pattern` to the default state (remove it from both lists).
    pub fn clear(&mut self, pattern: &Pattern) {
        self.grant.retain(|p| p != pattern);
        self.revoke.retain(|p| p != pattern);
    }

    pub fn is_empty(&self) -> bool {
        self.grant.is_empty() && self.revoke.is_empty()
    }
}

/// A user snapshot as handed to the engine by the session layer. The engine
/// computes against it; ownership and persistence stay with the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Id of the role assigned to this user.
    pub role: String,
    #[serde(default)]
    pub overrides: OverrideSet,
}

impl User {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            overrides: OverrideSet::default(),
        }
    }
}

/// The authenticated operator performing a mutation, recorded in audit
/// entries. Its role id resolves the privilege tier for guarded mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: role.into(),
        }
    }
}
