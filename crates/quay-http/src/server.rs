use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    time::{Duration, Instant},
};

use anyhow::{Context as _, Error};
use quay_mio::{check_io, net::TcpListener, Interest, Ready, Registry, Selector, Token};
use tracing::{event, instrument, Level};

use crate::{
    config::ServerConfig,
    connection::{Connection, ConnectionState},
    parser::RequestParser,
    responder::Responder,
    shutdown::Shutdown,
};

/// How long a connection whose response is sent waits for the peer to close.
const LINGER_TIMEOUT: Duration = Duration::from_secs(2);

/// Single threaded static file server.
///
/// Owns the listening socket, every open connection, and the response cache. All of it is only
/// ever touched from the thread calling `run`.
pub struct Server<S = Registry> {
    selector: S,
    listener: TcpListener,
    listener_token: Token,
    /// Accepting failed with pending connections left, retry on the next tick.
    retry_accept: bool,
    connections: HashMap<Token, Connection>,

    parser: RequestParser,
    responder: Responder,

    poll_timeout: Duration,
    idle_timeout: Option<Duration>,
    shutdown: Shutdown,

    /// Scratch buffer for ready events.
    ready: Vec<Ready>,
}

impl Server<Registry> {
    /// Bind a server using the platform's native readiness primitive.
    pub fn bind(config: &ServerConfig) -> Result<Self, Error> {
        Self::with_selector(Registry::new()?, config)
    }
}

impl<S> Server<S>
where
    S: Selector,
{
    #[instrument("Server::bind", skip_all)]
    pub fn with_selector(mut selector: S, config: &ServerConfig) -> Result<Self, Error> {
        config.validate()?;

        if config.workers > 1 {
            event!(
                Level::WARN,
                workers = config.workers,
                "running a single event loop, run more instances to use more cores"
            );
        }

        let responder = Responder::new(config)?;

        // Create the socket
        let mut listener = TcpListener::bind(config.addr)
            .with_context(|| format!("failed to bind listener on {}", config.addr))?;

        // Register the socket for ready events
        let listener_token = selector.token();
        selector.register(&mut listener, listener_token, Interest::READABLE)?;

        event!(
            Level::INFO,
            addr = ?listener.local_addr()?,
            root = ?config.document_root,
            "listening"
        );

        let value = Self {
            selector,
            listener,
            listener_token,
            retry_accept: false,
            connections: HashMap::new(),

            parser: RequestParser::new(config.max_request_line),
            responder,

            poll_timeout: config.poll_timeout,
            idle_timeout: config.idle_timeout,
            shutdown: Shutdown::default(),

            ready: Vec::new(),
        };
        Ok(value)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        let addr = self.listener.local_addr()?;
        Ok(addr)
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until shutdown is requested.
    ///
    /// Only fails if polling itself fails, errors on single connections never end the loop.
    #[instrument("quay-event-loop", skip_all)]
    pub fn run(&mut self) -> Result<(), Error> {
        while !self.shutdown.is_requested() {
            if let Err(error) = self.tick() {
                event!(Level::ERROR, ?error, "event loop failed");
                return Err(error);
            }
        }

        event!(Level::INFO, "shutting down");
        self.close_all();

        Ok(())
    }

    /// Run a single poll iteration.
    pub fn tick(&mut self) -> Result<(), Error> {
        let mut ready = std::mem::take(&mut self.ready);
        self.selector.select(&mut ready, Some(self.poll_timeout))?;

        for event in &ready {
            if event.token == self.listener_token {
                self.on_listener_ready();
            } else {
                self.on_connection_ready(event);
            }
        }
        self.ready = ready;

        self.sweep_idle(Instant::now());
        self.release_closed();

        // Released connections may have freed what accepting ran out of
        if self.retry_accept {
            self.on_listener_ready();
        }

        Ok(())
    }

    fn on_listener_ready(&mut self) {
        self.retry_accept = false;

        // Accept any pending streams
        loop {
            let (mut stream, peer) = match check_io(self.listener.accept()) {
                Ok(Some(value)) => value,
                Ok(None) => break,
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => {
                    // Readiness won't be reported again for streams still pending
                    event!(Level::WARN, ?error, "failed to accept connection");
                    self.retry_accept = true;
                    break;
                }
            };

            let token = self.selector.token();
            if let Err(error) = self.selector.register(&mut stream, token, Interest::READABLE) {
                event!(Level::WARN, ?peer, ?error, "failed to register connection");
                continue;
            }

            let connection = Connection::new(stream, token, peer);
            self.connections.insert(token, connection);
        }
    }

    fn on_connection_ready(&mut self, ready: &Ready) {
        let Some(connection) = self.connections.get_mut(&ready.token) else {
            event!(Level::TRACE, token = ready.token.0, "ready event for released connection");
            return;
        };

        let mut result = Ok(());
        if ready.readable {
            result = connection.on_readable(&self.selector, &self.parser, &mut self.responder);
        }
        if ready.writable && result.is_ok() {
            result = connection.on_writable();
        }

        if let Err(error) = result {
            event!(Level::WARN, peer = ?connection.peer(), ?error, "connection failed");
            connection.close();
        } else if ready.error && connection.state() != ConnectionState::Closing {
            event!(Level::DEBUG, peer = ?connection.peer(), "connection reset by peer");
            connection.close();
        }
    }

    fn sweep_idle(&mut self, now: Instant) {
        let idle_timeout = self.idle_timeout;

        for connection in self.connections.values_mut() {
            if connection.state() == ConnectionState::Closing {
                continue;
            }

            if let Some(lingering) = connection.lingering_for(now) {
                if lingering > LINGER_TIMEOUT {
                    event!(Level::DEBUG, peer = ?connection.peer(), "peer did not close");
                    connection.close();
                }
                continue;
            }

            let Some(timeout) = idle_timeout else {
                continue;
            };

            if connection.idle_for(now) > timeout {
                event!(
                    Level::WARN,
                    peer = ?connection.peer(),
                    state = ?connection.state(),
                    "connection timed out"
                );
                connection.close();
            }
        }
    }

    fn release_closed(&mut self) {
        let closed: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.state() == ConnectionState::Closing)
            .map(|(token, _)| *token)
            .collect();

        for token in closed {
            let Some(mut connection) = self.connections.remove(&token) else {
                continue;
            };

            if let Err(error) = self.selector.deregister(connection.stream_mut()) {
                event!(Level::TRACE, ?error, "failed to deregister connection");
            }

            event!(Level::DEBUG, peer = ?connection.peer(), "connection closed");
        }
    }

    fn close_all(&mut self) {
        for connection in self.connections.values_mut() {
            connection.close();
        }
        self.release_closed();

        if let Err(error) = self.selector.deregister(&mut self.listener) {
            event!(Level::TRACE, ?error, "failed to deregister listener");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, net::TcpStream, path::Path, time::Duration};

    use anyhow::{anyhow, Error};
    use quay_mio::{Interest, Ready, Registry, Selector, Source, Token};
    use tracing_test::traced_test;

    use super::Server;
    use crate::config::ServerConfig;

    /// Loses every readiness report for the first token handed out, the listener's, and fails
    /// polls when `broken` is set.
    struct FlakySelector {
        inner: Registry,
        lost: Option<Token>,
        broken: bool,
    }

    impl FlakySelector {
        fn new(broken: bool) -> Result<Self, Error> {
            let value = Self {
                inner: Registry::new()?,
                lost: None,
                broken,
            };
            Ok(value)
        }
    }

    impl Selector for FlakySelector {
        fn token(&mut self) -> Token {
            let token = self.inner.token();
            self.lost.get_or_insert(token);
            token
        }

        fn register<S>(
            &self,
            source: &mut S,
            token: Token,
            interest: Interest,
        ) -> Result<(), Error>
        where
            S: Source + ?Sized,
        {
            self.inner.register(source, token, interest)
        }

        fn reregister<S>(
            &self,
            source: &mut S,
            token: Token,
            interest: Interest,
        ) -> Result<(), Error>
        where
            S: Source + ?Sized,
        {
            self.inner.reregister(source, token, interest)
        }

        fn deregister<S>(&self, source: &mut S) -> Result<(), Error>
        where
            S: Source + ?Sized,
        {
            self.inner.deregister(source)
        }

        fn select(
            &mut self,
            ready: &mut Vec<Ready>,
            timeout: Option<Duration>,
        ) -> Result<(), Error> {
            if self.broken {
                return Err(anyhow!("poll broke"));
            }

            self.inner.select(ready, timeout)?;

            let lost = self.lost;
            ready.retain(|event| Some(event.token) != lost);

            Ok(())
        }
    }

    fn given_config(root: &Path) -> Result<ServerConfig, Error> {
        fs::write(root.join("index.html"), "0123456789")?;

        let config = ServerConfig {
            addr: "127.0.0.1:0".parse()?,
            document_root: root.to_path_buf(),
            poll_timeout: Duration::from_millis(10),
            ..ServerConfig::default()
        };
        Ok(config)
    }

    #[test]
    #[traced_test]
    fn failed_accept_retried_next_tick() -> Result<(), Error> {
        let root = tempfile::tempdir()?;
        let config = given_config(root.path())?;
        let mut server = Server::with_selector(FlakySelector::new(false)?, &config)?;

        let _client = TcpStream::connect(server.local_addr()?)?;
        server.tick()?;
        assert!(server.connections.is_empty());

        // The pending stream is picked up without any new readiness report
        server.retry_accept = true;
        server.tick()?;
        assert_eq!(server.connections.len(), 1);

        Ok(())
    }

    #[test]
    #[traced_test]
    fn poll_failure_ends_loop() -> Result<(), Error> {
        let root = tempfile::tempdir()?;
        let config = given_config(root.path())?;
        let mut server = Server::with_selector(FlakySelector::new(true)?, &config)?;

        assert!(server.run().is_err());
        assert!(logs_contain("event loop failed"));

        Ok(())
    }
}
