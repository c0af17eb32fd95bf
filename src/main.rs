use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

use palisade::evaluator::PermissionQuery;
use palisade::settings::Settings;
use palisade::types::{Pattern, User};
use palisade::{loader, PolicyEngine};

#[derive(Parser, Debug)]
#[command(
    name = "palisade",
    version,
    about = "Permission engine: evaluate access, list roles, inspect view gating"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a user would hold a single permission
    Check {
        /// Role id of the user
        #[arg(long)]
        role: String,
        /// Extra granted patterns (repeatable)
        #[arg(long = "grant")]
        grant: Vec<String>,
        /// Revoked patterns (repeatable)
        #[arg(long = "revoke")]
        revoke: Vec<String>,
        /// Permission key to check
        permission: String,
    },
    /// Print the user's effective permission set
    Effective {
        #[arg(long)]
        role: String,
        #[arg(long = "grant")]
        grant: Vec<String>,
        #[arg(long = "revoke")]
        revoke: Vec<String>,
    },
    /// Print tab visibility for the user
    Tabs {
        #[arg(long)]
        role: String,
        #[arg(long = "grant")]
        grant: Vec<String>,
        #[arg(long = "revoke")]
        revoke: Vec<String>,
    },
    /// List all roles, priority descending
    Roles,
}

fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let settings = Settings::load(&cli.config)?;

    let state = if settings.policy.dir.is_dir() {
        loader::load_policies(&settings.policy.dir)?
    } else {
        tracing::info!(
            dir = %settings.policy.dir.display(),
            "Policy directory not found, using the embedded default policy"
        );
        loader::default_state()
    };

    let mut engine = PolicyEngine::new(state, settings.audit.retention);
    if let Some(origin) = settings.audit.origin {
        engine = engine.with_origin(origin);
    }

    match cli.command {
        Command::Check {
            role,
            grant,
            revoke,
            permission,
        } => {
            let user = build_user(&role, &grant, &revoke)?;
            let allowed = engine.evaluator().evaluate(&user, &permission);
            println!("{}", if allowed { "allow" } else { "deny" });
            if !allowed {
                std::process::exit(1);
            }
        }
        Command::Effective {
            role,
            grant,
            revoke,
        } => {
            let user = build_user(&role, &grant, &revoke)?;
            for key in engine.evaluator().effective_permissions(&user) {
                println!("{key}");
            }
        }
        Command::Tabs {
            role,
            grant,
            revoke,
        } => {
            let user = build_user(&role, &grant, &revoke)?;
            for (region, visible) in engine.views().tab_visibility(&user) {
                println!("{region}\t{}", if visible { "visible" } else { "hidden" });
            }
        }
        Command::Roles => {
            for role in engine.roles() {
                println!(
                    "{}\t{}\tpriority={}\t{}",
                    role.id,
                    role.label,
                    role.priority,
                    if role.is_system { "system" } else { "custom" }
                );
            }
        }
    }

    Ok(())
}

fn build_user(role: &str, grant: &[String], revoke: &[String]) -> Result<User> {
    let mut user = User::new("cli", role);
    for pattern in grant {
        user.overrides.add_grant(Pattern::parse(pattern)?);
    }
    for pattern in revoke {
        user.overrides.add_revoke(Pattern::parse(pattern)?);
    }
    Ok(user)
}
