use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PolicyError;

/// Default retention cap: the newest 500 entries are kept.
pub const DEFAULT_RETENTION: usize = 500;

/// Kind of policy-affecting mutation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RoleCreate,
    RoleUpdate,
    RoleChange,
    PermissionGrant,
    PermissionRevoke,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RoleCreate => "role_create",
            AuditAction::RoleUpdate => "role_update",
            AuditAction::RoleChange => "role_change",
            AuditAction::PermissionGrant => "permission_grant",
            AuditAction::PermissionRevoke => "permission_revoke",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetInfo {
    pub id: String,
    pub name: String,
}

/// An immutable record of a single policy mutation. Id and timestamp are
/// assigned on append; entries are never edited or individually deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub actor: ActorInfo,
    pub target: Option<TargetInfo>,
    pub details: Value,
    pub origin: Option<String>,
}

/// Everything the caller supplies for an entry; the log fills in id and
/// timestamp.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub action: AuditAction,
    pub actor: ActorInfo,
    pub target: Option<TargetInfo>,
    pub details: Value,
    pub origin: Option<String>,
}

impl AuditDraft {
    pub fn new(action: AuditAction, actor: ActorInfo) -> Self {
        Self {
            action,
            actor,
            target: None,
            details: Value::Null,
            origin: None,
        }
    }

    pub fn target(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.target = Some(TargetInfo {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }
}

/// Query filter; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    /// Only entries at most this many days old.
    pub date_range_days: Option<i64>,
    /// Case-insensitive match over actor/target names, action, and a
    /// serialization of the details map.
    pub text: Option<String>,
}

#[derive(Debug, Default)]
struct AuditLogInner {
    /// Oldest at the front, newest at the back.
    entries: VecDeque<AuditEntry>,
    next_id: u64,
}

/// Append-only, retention-capped log of policy mutations. The mutex keeps
/// append ordering linear; capacity eviction is the only way entries leave.
#[derive(Debug)]
pub struct AuditLog {
    inner: Mutex<AuditLogInner>,
    retention: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl AuditLog {
    pub fn new(retention: usize) -> Self {
        Self {
            inner: Mutex::new(AuditLogInner {
                entries: VecDeque::new(),
                next_id: 1,
            }),
            retention: retention.max(1),
        }
    }

    /// Assign id and timestamp, append, and evict beyond the retention cap,
    /// oldest first. The in-memory log cannot fail; the `Result` is the
    /// contract durable sinks implement against.
    pub fn append(&self, draft: AuditDraft) -> Result<AuditEntry, PolicyError> {
        let mut inner = self.inner.lock();
        let entry = AuditEntry {
            id: inner.next_id,
            timestamp: Utc::now(),
            action: draft.action,
            actor: draft.actor,
            target: draft.target,
            details: draft.details,
            origin: draft.origin,
        };
        inner.next_id += 1;
        inner.entries.push_back(entry.clone());
        while inner.entries.len() > self.retention {
            inner.entries.pop_front();
        }
        Ok(entry)
    }

    /// Filtered copy of the log, newest first.
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let inner = self.inner.lock();
        let cutoff = filter
            .date_range_days
            .map(|days| Utc::now() - Duration::days(days));
        let needle = filter.text.as_ref().map(|t| t.to_lowercase());

        inner
            .entries
            .iter()
            .rev()
            .filter(|entry| filter.action.is_none_or(|a| entry.action == a))
            .filter(|entry| cutoff.is_none_or(|c| entry.timestamp >= c))
            .filter(|entry| {
                let Some(needle) = &needle else { return true };
                entry_matches_text(entry, needle)
            })
            .cloned()
            .collect()
    }

    /// Serialize the filtered set to CSV, one row per entry, newest first.
    pub fn export(&self, filter: &AuditFilter) -> Result<Vec<u8>, PolicyError> {
        let mut out = String::from("Timestamp,Action,Actor,Target,Details,Origin\n");
        for entry in self.query(filter) {
            let details = match &entry.details {
                Value::Null => String::new(),
                other => serde_json::to_string(other)?,
            };
            let row = [
                entry.timestamp.to_rfc3339(),
                entry.action.to_string(),
                entry.actor.name.clone(),
                entry
                    .target
                    .as_ref()
                    .map(|t| t.name.clone())
                    .unwrap_or_default(),
                details,
                entry.origin.clone().unwrap_or_default(),
            ];
            let escaped: Vec<String> = row.iter().map(|f| escape_csv_field(f)).collect();
            out.push_str(&escaped.join(","));
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

fn entry_matches_text(entry: &AuditEntry, needle: &str) -> bool {
    if entry.actor.name.to_lowercase().contains(needle)
        || entry.action.as_str().contains(needle)
    {
        return true;
    }
    if let Some(target) = &entry.target {
        if target.name.to_lowercase().contains(needle) {
            return true;
        }
    }
    entry.details.to_string().to_lowercase().contains(needle)
}

/// RFC-4180-style quoting: fields containing a separator, quote, or newline
/// are wrapped in quotes with embedded quotes doubled.
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
