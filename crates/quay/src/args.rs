use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use anyhow::{Context, Error};
use clap::Parser;
use quay_http::ServerConfig;

/// Serve static files from a document root.
#[derive(Debug, Parser)]
#[command(name = "quay", version, about)]
pub struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0", env = "QUAY_HOST")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "QUAY_PORT")]
    pub port: u16,

    /// Number of server instances the deployment runs, this process always runs one
    #[arg(short, long, default_value_t = 1, env = "QUAY_WORKERS")]
    pub workers: usize,

    /// Document root, defaults to the current directory
    #[arg(short, long, env = "QUAY_ROOT")]
    pub root: Option<PathBuf>,

    /// File served for directory paths
    #[arg(long, default_value = "index.html", env = "QUAY_INDEX")]
    pub index: String,

    /// Maximum number of cached responses
    #[arg(long, default_value_t = 20, env = "QUAY_CACHE_CAPACITY")]
    pub cache_capacity: usize,

    /// Servable file extensions
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "html,css,js,jpg,jpeg,png,gif,swf",
        env = "QUAY_ALLOW"
    )]
    pub allow: Vec<String>,

    /// Value of the Server response header
    #[arg(long, default_value = "quay", env = "QUAY_SERVER_NAME")]
    pub server_name: String,

    #[arg(long, default_value_t = 500)]
    pub poll_timeout_ms: u64,

    /// Close connections idle for this long, 0 disables
    #[arg(long, default_value_t = 30)]
    pub idle_timeout_secs: u64,

    #[arg(long, default_value_t = 8192)]
    pub max_request_line: usize,
}

impl Args {
    pub fn into_config(self) -> Result<ServerConfig, Error> {
        let document_root = match self.root {
            Some(root) => root,
            None => std::env::current_dir().context("failed to get current directory")?,
        };

        let idle_timeout =
            (self.idle_timeout_secs != 0).then(|| Duration::from_secs(self.idle_timeout_secs));

        let config = ServerConfig {
            addr: SocketAddr::new(self.host, self.port),
            workers: self.workers,
            document_root,
            index_file: self.index,
            cache_capacity: self.cache_capacity,
            allowed_extensions: self.allow,
            server_name: self.server_name,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            idle_timeout,
            max_request_line: self.max_request_line,
        };
        config.validate()?;

        Ok(config)
    }
}
