use std::{env, fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::errors::DbError;

/// File read for the database URL when neither environment variable is set.
pub const FALLBACK_URL_FILE: &str = ".mypass";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    MySql,
    Sqlite,
}

impl DbType {
    pub fn from_url(database_url: &str) -> Result<Self, DbError> {
        let scheme = database_url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_lowercase())
            .ok_or_else(|| DbError::Config(format!("no scheme in {}", database_url)))?;

        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(DbType::Postgres),
            "mysql" | "mariadb" => Ok(DbType::MySql),
            "sqlite" => Ok(DbType::Sqlite),
            other => Err(DbError::Config(format!("unsupported database scheme: {}", other))),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConnectionConfig {
    pub db_type: DbType,
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Upper bound for a single query or command, transaction included.
    pub statement_timeout: Duration,
    /// Execute builder output with bound parameters instead of the literal text.
    pub bind_parameters: bool,
}

impl ConnectionConfig {
    pub fn new(database_url: impl Into<String>) -> Result<Self, DbError> {
        let database_url = database_url.into().trim().to_string();
        Ok(Self {
            db_type: DbType::from_url(&database_url)?,
            database_url,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(30),
            bind_parameters: true,
        })
    }

    /// Reads the configuration from the environment (and a `.env` file, if any).
    ///
    /// The URL comes from `DATABASE_URL`, else from the file named by
    /// `DATABASE_URL_FILE`, else from `.mypass` in the working directory.
    pub fn from_env() -> Result<Self, DbError> {
        dotenv::dotenv().ok();

        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => match env::var("DATABASE_URL_FILE") {
                Ok(path) => read_url_file(Path::new(&path))?,
                Err(_) => read_url_file(Path::new(FALLBACK_URL_FILE))?,
            },
        };

        let mut config = Self::new(database_url)?;
        if let Some(max) = env_parse::<u32>("DB_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(secs) = env_parse::<u64>("DB_ACQUIRE_TIMEOUT_SECS")? {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("DB_STATEMENT_TIMEOUT_SECS")? {
            config.statement_timeout = Duration::from_secs(secs);
        }
        if let Some(bind) = env_parse::<bool>("DB_BIND_PARAMETERS")? {
            config.bind_parameters = bind;
        }
        Ok(config)
    }
}

fn read_url_file(path: &Path) -> Result<String, DbError> {
    fs::read_to_string(path)
        .map(|contents| contents.trim().to_string())
        .map_err(|e| DbError::Config(format!("cannot read {}: {}", path.display(), e)))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, DbError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| DbError::Config(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn db_type_from_scheme() {
        assert_eq!(
            DbType::from_url("postgres://u:p@localhost/db").unwrap(),
            DbType::Postgres
        );
        assert_eq!(
            DbType::from_url("postgresql://localhost/db").unwrap(),
            DbType::Postgres
        );
        assert_eq!(
            DbType::from_url("mysql://root@localhost/coffee").unwrap(),
            DbType::MySql
        );
        assert_eq!(
            DbType::from_url("sqlite::memory:").unwrap(),
            DbType::Sqlite
        );
        assert!(matches!(
            DbType::from_url("oracle://host/db"),
            Err(DbError::Config(_))
        ));
        assert!(matches!(DbType::from_url("nonsense"), Err(DbError::Config(_))));
    }

    #[test]
    fn new_applies_defaults_and_trims() {
        let config = ConnectionConfig::new("  mysql://root@localhost/coffee\n").unwrap();
        assert_eq!(config.database_url, "mysql://root@localhost/coffee");
        assert_eq!(config.db_type, DbType::MySql);
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.statement_timeout, Duration::from_secs(30));
        assert!(config.bind_parameters);
    }

    #[test]
    fn url_file_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sqlite://coffee.db").unwrap();

        let url = read_url_file(file.path()).unwrap();
        assert_eq!(url, "sqlite://coffee.db");
    }

    #[test]
    fn missing_url_file_is_config_error() {
        let result = read_url_file(Path::new("/definitely/not/here/.mypass"));
        assert!(matches!(result, Err(DbError::Config(_))));
    }
}
