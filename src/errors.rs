use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PolicyError {
    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(palisade::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(palisade::invalid_policy),
        help("Each policy file must contain valid `module` or `role` KDL nodes")
    )]
    InvalidPolicy(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(palisade::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),

    #[error("Invalid permission pattern: {0}")]
    #[diagnostic(
        code(palisade::validation),
        help("A pattern is `*`, a `prefix.*` wildcard, or a full `module.resource.action` key with at least two segments")
    )]
    Validation(String),

    #[error("Role `{0}` already exists")]
    #[diagnostic(
        code(palisade::duplicate_role),
        help("Role ids must be unique across system and custom roles")
    )]
    DuplicateRole(String),

    #[error("Unknown role `{0}`")]
    #[diagnostic(code(palisade::unknown_role))]
    UnknownRole(String),

    #[error("Unauthorized mutation: {0}")]
    #[diagnostic(
        code(palisade::unauthorized),
        help("System roles are immutable, and owner-tier roles may only be assigned or modified by owner-tier actors")
    )]
    UnauthorizedMutation(String),

    #[error("Audit write failure: {0}")]
    #[diagnostic(
        code(palisade::audit_write),
        help("The permission change itself was applied; retry recording the audit entry")
    )]
    AuditWriteFailure(String),

    #[error("Config error: {0}")]
    #[diagnostic(code(palisade::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(palisade::serde))]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    #[diagnostic(code(palisade::io))]
    Io(#[from] std::io::Error),
}
