//! Process configuration, resolved once from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

const DEFAULT_CONCURRENCY: usize = 10;
const DEFAULT_FTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct FtpConfig {
    /// `host` or `host:port`.
    pub host: String,
    /// Directory holding the report files.
    pub path: String,
    pub user: String,
    pub password: String,
    pub timeout: Duration,
}

/// Where report files are read from.
#[derive(Debug, Clone)]
pub enum SourceConfig {
    Ftp(FtpConfig),
    Dir(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub source: SourceConfig,
    /// Maximum number of files processed at once.
    pub concurrency: usize,
    pub db_max_connections: u32,
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// - `DATABASE_URL` (required)
    /// - `BCMS_SOURCE_DIR`, or `BCMS_FTP_HOST` with `BCMS_FTP_PATH`,
    ///   `BCMS_FTP_USER`, `BCMS_FTP_PASSWORD`, `BCMS_FTP_TIMEOUT_SECS`
    /// - `BCMS_CONCURRENCY` (default 10), `BCMS_DB_MAX_CONNECTIONS`
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to the report database")?;

        let source = match lookup("BCMS_SOURCE_DIR") {
            Some(dir) => SourceConfig::Dir(PathBuf::from(dir)),
            None => SourceConfig::Ftp(FtpConfig {
                host: lookup("BCMS_FTP_HOST")
                    .context("BCMS_FTP_HOST must be set when BCMS_SOURCE_DIR is not")?,
                path: lookup("BCMS_FTP_PATH").unwrap_or_else(|| "/".to_string()),
                user: lookup("BCMS_FTP_USER").unwrap_or_else(|| "anonymous".to_string()),
                password: lookup("BCMS_FTP_PASSWORD").unwrap_or_default(),
                timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "BCMS_FTP_TIMEOUT_SECS",
                    DEFAULT_FTP_TIMEOUT_SECS,
                )?),
            }),
        };

        let concurrency = parse_or(&lookup, "BCMS_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        if concurrency == 0 {
            bail!("BCMS_CONCURRENCY must be at least 1");
        }
        let db_max_connections =
            parse_or(&lookup, "BCMS_DB_MAX_CONNECTIONS", concurrency as u32)?;

        Ok(Self {
            database_url,
            source,
            concurrency,
            db_max_connections,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has invalid value {raw:?}")),
        None => Ok(default),
    }
}
