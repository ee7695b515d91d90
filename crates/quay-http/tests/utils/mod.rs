#![allow(dead_code)]

use std::{
    fs,
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    path::Path,
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Error};
use quay_http::{Server, ServerConfig, Shutdown};
use tempfile::TempDir;

pub const INDEX: &str = "0123456789";

pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    thread: JoinHandle<Result<(), Error>>,
}

impl RunningServer {
    pub fn stop(self) -> Result<(), Error> {
        self.shutdown.request();
        self.thread
            .join()
            .map_err(|_| anyhow!("server thread panicked"))?
    }
}

pub struct Response {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(": ")?;
            key.eq_ignore_ascii_case(name).then_some(value)
        })
    }

    /// Header lines except the ones that legitimately differ between responses.
    pub fn stable_headers(&self) -> Vec<&str> {
        self.head
            .lines()
            .filter(|line| !line.starts_with("Date:"))
            .collect()
    }
}

pub fn given_document_root() -> Result<TempDir, Error> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("index.html"), INDEX)?;
    fs::write(dir.path().join("style.css"), "body { color: red; }")?;
    fs::write(dir.path().join("app.exe"), "MZ not a page")?;
    Ok(dir)
}

pub fn given_config(root: &Path) -> ServerConfig {
    ServerConfig {
        addr: "127.0.0.1:0".parse().expect("valid address"),
        document_root: root.to_path_buf(),
        poll_timeout: Duration::from_millis(20),
        ..ServerConfig::default()
    }
}

pub fn given_server(config: &ServerConfig) -> Result<RunningServer, Error> {
    let mut server = Server::bind(config)?;
    let addr = server.local_addr()?;
    let shutdown = server.shutdown_handle();

    let thread = thread::spawn(move || server.run());

    let running = RunningServer {
        addr,
        shutdown,
        thread,
    };
    Ok(running)
}

pub fn when_connected(addr: SocketAddr) -> Result<TcpStream, Error> {
    let stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    Ok(stream)
}

pub fn when_requested(addr: SocketAddr, request: &str) -> Result<Response, Error> {
    let mut stream = when_connected(addr)?;
    stream.write_all(request.as_bytes())?;
    then_response(&mut stream)
}

/// Read until the server closes the connection, and split the response.
pub fn then_response(stream: &mut TcpStream) -> Result<Response, Error> {
    let mut data = Vec::new();
    stream
        .read_to_end(&mut data)
        .context("failed to read response")?;

    let split = data
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .context("response has no header terminator")?;
    let head = String::from_utf8(data[..split].to_vec())?;
    let body = data[split + 4..].to_vec();

    let status = head
        .split(' ')
        .nth(1)
        .context("missing status code")?
        .parse()?;

    let response = Response { status, head, body };
    Ok(response)
}
