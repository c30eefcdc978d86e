use crate::core::db::connection::has_scheme;
use crate::core::{DshError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variables consulted, in order, when no DSN is given.
pub const DSN_ENV_VARS: [&str; 3] = ["DSN", "DATABASE", "DATABASE_URL"];

/// Overrides the configuration file location.
pub const CONFIG_ENV_VAR: &str = "DSH_CONFIG";

/// File names looked up, in order, in the `~/.dsh` directory.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["config.toml", "config.json"];

/// Connection names may refer to other names; this bounds the chain.
const MAX_ALIAS_DEPTH: usize = 8;

/// Top-level configuration structure parsed from a TOML (or JSON) file.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// A named connection string.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub conn: String,
}

impl Config {
    /// Looks up a connection by name.
    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|c| c.name == name)
    }
}

/// Loads configuration from the file at the given path.
///
/// Files ending in `.json` are read as JSON, anything else as TOML.
///
/// # Example
///
/// ```no_run
/// let config = dsh::config::load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&content)?,
        _ => toml::from_str(&content)?,
    };
    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Default configuration location: `$DSH_CONFIG`, else the first of
/// `~/.dsh/config.toml` and `~/.dsh/config.json` that exists.
pub fn default_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().and_then(|home| find_config(&home.join(".dsh")))
}

/// Returns the first configuration file present in `dir`.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Loads the default configuration.
///
/// A missing file means "no configuration" and yields `Ok(None)`; a file
/// that exists but does not parse is an error.
pub fn load_default() -> Result<Option<Config>> {
    match default_path() {
        Some(path) if path.exists() => load_config(path).map(Some),
        _ => Ok(None),
    }
}

/// Resolves the connection string a tool should open.
///
/// The first non-empty of `explicit` and the `DSN`, `DATABASE`,
/// `DATABASE_URL` variables (read through `env`) is used. A value with a
/// scheme is returned as is; a value without one names a configured
/// connection, which is resolved the same way.
pub fn resolve_dsn<F>(explicit: Option<&str>, env: F, config: Option<&Config>) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut dsn = explicit
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            DSN_ENV_VARS
                .iter()
                .filter_map(|var| env(var))
                .find(|s| !s.trim().is_empty())
        })
        .ok_or_else(|| DshError::Config("dsn is empty".to_string()))?;

    for _ in 0..MAX_ALIAS_DEPTH {
        if has_scheme(&dsn) {
            return Ok(dsn);
        }
        let name = dsn.trim();
        let conn = config
            .and_then(|c| c.connection(name))
            .map(|c| c.conn.clone())
            .ok_or_else(|| {
                DshError::Config(format!("dsn schema not found and no connection named '{name}'"))
            })?;
        debug!(connection = %name, "Resolved connection name from configuration");
        dsn = conn;
    }
    Err(DshError::Config(format!(
        "connection names nest deeper than {MAX_ALIAS_DEPTH} levels"
    )))
}
