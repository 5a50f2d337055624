//! Where report files come from: the switch's FTP drop or a local mirror.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use suppaftp::FtpStream;
use tracing::debug;

use crate::config::FtpConfig;

/// Remote directory holding report files.
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Names of the files currently in the report directory.
    async fn list(&self) -> anyhow::Result<Vec<String>>;

    /// Raw contents of the named file. Columns are byte offsets, so nothing is
    /// decoded here.
    async fn retrieve(&self, file_name: &str) -> anyhow::Result<Vec<u8>>;
}

/// Reads reports over FTP, opening one connection per operation so that
/// concurrent workers never share a control channel.
#[derive(Debug, Clone)]
pub struct FtpSource {
    config: FtpConfig,
}

impl FtpSource {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    /// The timeout covers the TCP connect and every later read and write on
    /// the control channel, including the server greeting.
    fn connect(config: &FtpConfig) -> anyhow::Result<FtpStream> {
        let addr = resolve(&config.host)?;
        let stream = TcpStream::connect_timeout(&addr, config.timeout)
            .with_context(|| format!("failed to connect to FTP server {}", config.host))?;
        stream.set_read_timeout(Some(config.timeout))?;
        stream.set_write_timeout(Some(config.timeout))?;
        let mut ftp = FtpStream::connect_with_stream(stream)
            .with_context(|| format!("no FTP greeting from {}", config.host))?;
        ftp.login(&config.user, &config.password)
            .with_context(|| format!("FTP login failed for {}", config.user))?;
        Ok(ftp)
    }

    async fn with_connection<T, F>(&self, op: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream, &FtpConfig) -> anyhow::Result<T> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let mut ftp = Self::connect(&config)?;
            let result = op(&mut ftp, &config);
            if let Err(err) = ftp.quit() {
                debug!(error = %err, "FTP quit failed");
            }
            result
        })
        .await
        .context("FTP worker panicked")?
    }
}

fn resolve(host: &str) -> anyhow::Result<SocketAddr> {
    let target = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:21")
    };
    target
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve FTP host {target}"))?
        .next()
        .with_context(|| format!("no address found for FTP host {target}"))
}

fn remote_path(dir: &str, file_name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{file_name}")
    } else {
        format!("{dir}/{file_name}")
    }
}

#[async_trait]
impl FileSource for FtpSource {
    async fn list(&self) -> anyhow::Result<Vec<String>> {
        self.with_connection(|ftp, config| {
            let entries = ftp
                .nlst(Some(config.path.as_str()))
                .with_context(|| format!("failed to list FTP directory {}", config.path))?;
            // Some servers return full paths from NLST.
            Ok(entries
                .into_iter()
                .filter_map(|entry| entry.rsplit('/').next().map(str::to_string))
                .filter(|name| !name.is_empty())
                .collect())
        })
        .await
    }

    async fn retrieve(&self, file_name: &str) -> anyhow::Result<Vec<u8>> {
        let file_name = file_name.to_string();
        self.with_connection(move |ftp, config| {
            let path = remote_path(&config.path, &file_name);
            let buffer = ftp
                .retr_as_buffer(&path)
                .with_context(|| format!("failed to retrieve {path}"))?;
            Ok(buffer.into_inner())
        })
        .await
    }
}

/// Reads reports from a local directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileSource for DirSource {
    async fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("failed to list {}", self.root.display()))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn retrieve(&self, file_name: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.root.join(file_name);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
    }
}
