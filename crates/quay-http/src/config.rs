use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use thiserror::Error;

/// Immutable configuration for one server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Declared instance count.
    ///
    /// A server is always exactly one loop, scaling beyond that is up to deployment.
    pub workers: usize,
    pub document_root: PathBuf,
    /// Document appended to paths that name a directory.
    pub index_file: String,
    pub cache_capacity: usize,
    /// Servable file extensions, without the leading dot.
    pub allowed_extensions: Vec<String>,
    /// Value of the `Server` response header.
    pub server_name: String,
    pub poll_timeout: Duration,
    /// Connections idle for longer than this are closed, `None` never times out.
    pub idle_timeout: Option<Duration>,
    /// Upper bound of buffered bytes while waiting for a request line.
    pub max_request_line: usize,
}

pub const DEFAULT_EXTENSIONS: &[&str] = &["html", "css", "js", "jpg", "jpeg", "png", "gif", "swf"];

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            workers: 1,
            document_root: PathBuf::from("."),
            index_file: "index.html".to_string(),
            cache_capacity: 20,
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            server_name: "quay".to_string(),
            poll_timeout: Duration::from_millis(500),
            idle_timeout: Some(Duration::from_secs(30)),
            max_request_line: 8192,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.document_root.is_dir() {
            return Err(ConfigError::DocumentRoot(self.document_root.clone()));
        }

        if self.index_file.is_empty() || self.index_file.contains(['/', '\\']) {
            return Err(ConfigError::IndexFile(self.index_file.clone()));
        }

        if self.workers == 0 {
            return Err(ConfigError::Zero("workers"));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Zero("cache capacity"));
        }
        if self.poll_timeout.is_zero() {
            return Err(ConfigError::Zero("poll timeout"));
        }
        if self.max_request_line == 0 {
            return Err(ConfigError::Zero("max request line"));
        }

        if self.allowed_extensions.iter().all(|e| e.is_empty()) {
            return Err(ConfigError::NoExtensions);
        }

        Ok(())
    }
}

/// Invalid server configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("document root {0:?} is not a directory")]
    DocumentRoot(PathBuf),
    #[error("index file {0:?} must be a plain file name")]
    IndexFile(String),
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("no extensions allowed, nothing could be served")]
    NoExtensions,
}
