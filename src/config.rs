use anyhow::{Context, Result};
use chrono::Duration;
use clap::Parser;
use std::{env, str::FromStr};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Hours added to creation time to compute an object's expiry.
    pub expiry_hours: u32,
    /// Largest accepted PUT body, in bytes.
    pub max_object_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Content-addressed blob store")]
pub struct Args {
    /// Host to bind to (overrides HASHFS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides HASHFS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides HASHFS_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Metadata database URL (overrides HASHFS_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Expiry horizon in hours (overrides HASHFS_EXPIRY_HOURS)
    #[arg(long)]
    pub expiry_hours: Option<u32>,

    /// Maximum object size in bytes (overrides HASHFS_MAX_OBJECT_BYTES)
    #[arg(long)]
    pub max_object_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        Self::from_args_with_env(args, |name| env::var(name))
    }

    /// Merge `args` over values read through `lookup`, falling back to defaults.
    pub fn from_args_with_env<F>(args: Args, lookup: F) -> Result<(Self, bool)>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env_host = lookup("HASHFS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parsed(&lookup, "HASHFS_PORT", 8000)?;
        let env_storage =
            lookup("HASHFS_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = lookup("HASHFS_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/hashfs.db".into());
        let env_expiry = env_parsed(&lookup, "HASHFS_EXPIRY_HOURS", 24)?;
        let env_max = env_parsed(&lookup, "HASHFS_MAX_OBJECT_BYTES", 100 * 1024 * 1024)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            expiry_hours: args.expiry_hours.unwrap_or(env_expiry),
            max_object_bytes: args.max_object_bytes.unwrap_or(env_max),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn expiry_horizon(&self) -> Duration {
        Duration::hours(i64::from(self.expiry_hours))
    }
}

fn env_parsed<T, F>(lookup: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match lookup(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
