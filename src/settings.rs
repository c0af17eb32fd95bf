use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audit::DEFAULT_RETENTION;
use crate::errors::PolicyError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub policy: Policy,
    pub audit: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Directory of `.kdl` policy files. When it does not exist, the
    /// embedded default policy is used instead.
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audit {
    /// Newest-N retention cap for the audit log.
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Label written to the `origin` column of audit entries.
    pub origin: Option<String>,
}

fn default_retention() -> usize {
    DEFAULT_RETENTION
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("policies"),
        }
    }
}

impl Default for Audit {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            origin: None,
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, PolicyError> {
        let mut builder = config::Config::builder()
            .set_default(
                "policy.dir",
                Policy::default().dir.to_string_lossy().to_string(),
            )?
            .set_default("audit.retention", Audit::default().retention as i64)?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PALISADE__AUDIT__RETENTION=200, etc.
        builder = builder.add_source(config::Environment::with_prefix("PALISADE").separator("__"));

        let cfg = builder.build()?;
        let s: Settings = cfg.try_deserialize()?;
        Ok(s)
    }
}
