/// Connection String Module
///
/// Parses `scheme://[user[:pass]@]host[:port]/database[?params]` values,
/// resolves the scheme (with its aliases) to an engine, and derives the
/// driver-specific connection target.

use crate::core::{DshError, Result};
use std::fmt;
use url::Url;

/// Supported database engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Engine {
    Sqlite,
    Postgres,
    Mysql,
}

impl Engine {
    /// Resolves a (case-insensitive) scheme, normalizing aliases.
    pub fn from_scheme(scheme: &str) -> Option<Engine> {
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(Engine::Sqlite),
            "postgres" | "postgresql" => Some(Engine::Postgres),
            "mysql" | "mariadb" => Some(Engine::Mysql),
            _ => None,
        }
    }

    /// Canonical scheme name
    pub fn name(self) -> &'static str {
        match self {
            Engine::Sqlite => "sqlite",
            Engine::Postgres => "postgres",
            Engine::Mysql => "mysql",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns true if the value carries a `scheme://` prefix.
pub fn has_scheme(dsn: &str) -> bool {
    dsn.split_once("://")
        .map(|(scheme, _)| {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        })
        .unwrap_or(false)
}

/// A parsed connection string, tagged with its resolved engine.
#[derive(Clone, PartialEq, Eq)]
pub struct Dsn {
    raw: String,
    engine: Engine,
    /// Everything after `scheme://`
    rest: String,
}

/// Where a SQLite connection string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteTarget {
    pub path: String,
    pub read_only: bool,
}

impl Dsn {
    /// Parses a connection string.
    ///
    /// # Errors
    ///
    /// Returns `DshError::Config` for an empty value, a missing scheme, or a
    /// scheme that names no supported engine. These are never retryable.
    pub fn parse(raw: &str) -> Result<Dsn> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DshError::Config("empty DSN".to_string()));
        }
        if !has_scheme(raw) {
            return Err(DshError::Config(format!(
                "DSN scheme not found in '{}'",
                redact(raw)
            )));
        }
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| DshError::Config("DSN scheme not found".to_string()))?;
        let engine = Engine::from_scheme(scheme).ok_or_else(|| {
            DshError::Config(format!("unsupported database scheme '{scheme}'"))
        })?;
        Ok(Dsn {
            raw: raw.to_string(),
            engine,
            rest: rest.to_string(),
        })
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// The connection string as given
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The connection string with its scheme rewritten to the canonical one,
    /// which is what the network drivers expect.
    pub fn driver_url(&self) -> String {
        format!("{}://{}", self.engine.name(), self.rest)
    }

    /// File path and open mode for SQLite connection strings.
    pub fn sqlite_target(&self) -> Result<SqliteTarget> {
        let (path, params) = match self.rest.split_once('?') {
            Some((path, params)) => (path, params),
            None => (self.rest.as_str(), ""),
        };
        if path.is_empty() {
            return Err(DshError::Config("SQLite DSN has no database path".to_string()));
        }
        let read_only = params
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .any(|(key, value)| key == "mode" && value == "ro");
        Ok(SqliteTarget {
            path: path.to_string(),
            read_only,
        })
    }

    /// Connection string safe for logs.
    pub fn redacted(&self) -> String {
        redact(&self.raw)
    }
}

impl fmt::Debug for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dsn")
            .field("engine", &self.engine)
            .field("dsn", &self.redacted())
            .finish()
    }
}

/// Masks the password component of a URL-shaped connection string.
pub fn redact(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("xxxxx")).is_ok() {
                url.to_string()
            } else {
                raw.to_string()
            }
        }
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_aliases_resolve_to_one_engine() {
        assert_eq!(Engine::from_scheme("sqlite"), Some(Engine::Sqlite));
        assert_eq!(Engine::from_scheme("sqlite3"), Some(Engine::Sqlite));
        assert_eq!(Engine::from_scheme("postgres"), Some(Engine::Postgres));
        assert_eq!(Engine::from_scheme("PostgreSQL"), Some(Engine::Postgres));
        assert_eq!(Engine::from_scheme("mysql"), Some(Engine::Mysql));
        assert_eq!(Engine::from_scheme("mariadb"), Some(Engine::Mysql));
        assert_eq!(Engine::from_scheme("oracle"), None);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(matches!(Dsn::parse(""), Err(DshError::Config(_))));
        assert!(matches!(Dsn::parse("   "), Err(DshError::Config(_))));
        assert!(matches!(Dsn::parse("mydb"), Err(DshError::Config(_))));
        let err = Dsn::parse("oracle://scott:tiger@db/orcl").unwrap_err();
        assert!(err.to_string().contains("unsupported database scheme"));
    }

    #[test]
    fn test_sqlite_targets() {
        let dsn = Dsn::parse("sqlite:///var/data/app.db").unwrap();
        assert_eq!(dsn.engine(), Engine::Sqlite);
        assert_eq!(dsn.sqlite_target().unwrap().path, "/var/data/app.db");

        let dsn = Dsn::parse("sqlite3://local.db?mode=ro").unwrap();
        let target = dsn.sqlite_target().unwrap();
        assert_eq!(target.path, "local.db");
        assert!(target.read_only);

        let dsn = Dsn::parse("sqlite://:memory:").unwrap();
        assert_eq!(dsn.sqlite_target().unwrap().path, ":memory:");

        assert!(Dsn::parse("sqlite://").unwrap().sqlite_target().is_err());
    }

    #[test]
    fn test_driver_url_uses_canonical_scheme() {
        let dsn = Dsn::parse("mariadb://root:pw@localhost:3306/shop").unwrap();
        assert_eq!(dsn.driver_url(), "mysql://root:pw@localhost:3306/shop");
        let dsn = Dsn::parse("postgresql://app@db/shop").unwrap();
        assert_eq!(dsn.driver_url(), "postgres://app@db/shop");
    }

    #[test]
    fn test_redaction_hides_password() {
        let redacted = redact("postgres://app:secret@db:5432/shop");
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("app"));
        assert_eq!(redact("sqlite://:memory:"), "sqlite://:memory:");
    }

    #[test]
    fn test_has_scheme() {
        assert!(has_scheme("postgres://x"));
        assert!(!has_scheme("production"));
        assert!(!has_scheme("://x"));
    }
}
