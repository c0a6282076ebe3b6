//! CLI commands

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use reqwest::Method;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use storefront_core::FileStore;
use storefront_http::access::{self, RouteDecision};
use storefront_http::credentials::{CredentialStore, MigrationReport};
use storefront_http::types::RegisterRequest;
use storefront_http::{ApiClient, Session};
use tracing::{info, warn};

use crate::config::Settings;

#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Session(SessionCommands),

    /// Configuration file operations
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Commands that open the credential stores and talk to the backend
#[derive(Subcommand)]
pub enum SessionCommands {
    /// Sign in and store the issued credentials
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account and store the issued credentials
    Register {
        #[arg(long)]
        email: String,

        #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,
    },

    /// Sign out and clear stored credentials
    Logout,

    /// Show the signed-in user, confirming the session with the backend
    Whoami,

    /// Send an authenticated request and print the JSON response
    Call {
        /// HTTP method (GET, POST, PATCH, DELETE, ...)
        method: String,

        /// Path relative to the API base URL, with optional query string
        path: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },

    /// Show how route access control treats a path for the current session
    Route {
        /// Path with optional query string, e.g. /login?redirect=%2Fcart
        path: String,
    },

    /// Move credentials stored under legacy keys to the current keys
    Migrate,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write the default configuration to a file
    Init {
        /// Output file path (defaults to <data dir>/storefront.toml)
        output: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

/// Stores and client opened for a command
struct App {
    session: Session,
    migration: MigrationReport,
}

impl App {
    fn open(settings: &Settings) -> Result<Self> {
        let storage = &settings.storage;
        let cookies = FileStore::open(storage.cookie_file())
            .with_context(|| format!("failed to open {}", storage.cookie_file().display()))?;
        let durable = FileStore::open(storage.durable_file())
            .with_context(|| format!("failed to open {}", storage.durable_file().display()))?;
        let credentials = CredentialStore::new(Arc::new(cookies), Arc::new(durable), storage.ttl());

        // Runs once per process, before any request reads a token.
        let migration = credentials
            .migrate_legacy_keys()
            .context("failed to migrate legacy credential keys")?;

        let mut builder = ApiClient::builder()
            .base_url(settings.api.base_url.clone())
            .timeout(settings.api.timeout())
            .credentials(credentials)
            .on_session_expired(|| {
                warn!("session expired");
                eprintln!("Session expired. Sign in again with `storefront login`.");
            });
        if let Some(user_agent) = &settings.api.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        Ok(Self {
            session: Session::new(builder.build()?),
            migration,
        })
    }
}

impl Commands {
    pub async fn execute(self, settings: Settings) -> Result<()> {
        match self {
            Self::Session(command) => command.execute(&settings).await,
            Self::Config { command } => command.execute(&settings),
        }
    }
}

impl SessionCommands {
    pub async fn execute(self, settings: &Settings) -> Result<()> {
        let app = App::open(settings)?;
        let session = &app.session;

        match self {
            Self::Login { email, password } => {
                let user = session.login(&email, &password).await?;
                println!("Signed in as {} <{}>", user.display_name(), user.email);
            }
            Self::Register {
                email,
                password,
                first_name,
                last_name,
            } => {
                let request = RegisterRequest {
                    email,
                    password,
                    first_name,
                    last_name,
                };
                let user = session.register(&request).await?;
                println!("Registered {} <{}>", user.display_name(), user.email);
            }
            Self::Logout => {
                session.logout().await?;
                println!("Signed out");
            }
            Self::Whoami => match session.check().await? {
                Some(user) => {
                    println!("{} <{}>", user.display_name(), user.email);
                    println!("id:   {}", user.id);
                    println!("role: {}", user.role);
                }
                None => println!("Not signed in"),
            },
            Self::Call { method, path, data } => {
                call(session.client(), &method, &path, data.as_deref()).await?;
            }
            Self::Route { path } => {
                let authenticated = session.client().credentials().has_session();
                match access::evaluate(&path, authenticated) {
                    RouteDecision::Allow => println!("allow {path}"),
                    RouteDecision::Redirect(target) => println!("redirect {path} -> {target}"),
                }
            }
            Self::Migrate => print_migration(&app.migration),
        }

        Ok(())
    }
}

impl ConfigCommands {
    pub fn execute(self, settings: &Settings) -> Result<()> {
        match self {
            Self::Init { output, force } => {
                let config_path =
                    output.unwrap_or_else(|| settings.storage.data_dir.join("storefront.toml"));
                if config_path.exists() && !force {
                    bail!(
                        "{} already exists (use --force to overwrite)",
                        config_path.display()
                    );
                }

                Settings::default().save(&config_path)?;
                info!("Generated configuration at {}", config_path.display());
                println!("Generated configuration at: {}", config_path.display());
                Ok(())
            }
            Self::Show => {
                print!("{}", toml::to_string_pretty(settings)?);
                Ok(())
            }
        }
    }
}

async fn call(client: &ApiClient, method: &str, path: &str, data: Option<&str>) -> Result<()> {
    let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method: {method}"))?;
    if !path.starts_with('/') {
        bail!("path must start with '/': {path}");
    }
    let body = data
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--data is not valid JSON")?;

    let response: Value = client.request(method, path, body).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn print_migration(report: &MigrationReport) {
    if report.is_noop() {
        println!("No legacy credentials found");
        return;
    }
    for key in &report.migrated {
        println!("migrated -> {key}");
    }
    for key in &report.removed {
        println!("removed     {key}");
    }
}
