use std::{
    io::{ErrorKind, Read, Write},
    net::{Shutdown, SocketAddr},
    time::{Duration, Instant},
};

use anyhow::Error;
use bytes::{Buf, Bytes, BytesMut};
use quay_mio::{check_io, net::TcpStream, Interest, Selector, Token};
use tracing::{event, Level};

use crate::{error::ServeError, parser::RequestParser, responder::Responder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Buffering bytes until a full request line arrives.
    AwaitingRequest,
    /// A response is queued and being flushed.
    ///
    /// Once flushed the write half is shut down, and the connection lingers here discarding
    /// late request bytes until the peer closes.
    AwaitingResponse,
    /// Done, the socket is released at the end of the current tick.
    Closing,
}

/// A single accepted client socket.
pub struct Connection {
    stream: TcpStream,
    token: Token,
    peer: SocketAddr,

    inbound: BytesMut,
    outbound: Bytes,
    state: ConnectionState,
    last_activity: Instant,
    lingering_since: Option<Instant>,
}

impl Connection {
    pub fn new(stream: TcpStream, token: Token, peer: SocketAddr) -> Self {
        event!(Level::DEBUG, ?peer, "connection opened");

        Self {
            stream,
            token,
            peer,

            inbound: BytesMut::new(),
            outbound: Bytes::new(),
            state: ConnectionState::AwaitingRequest,
            last_activity: Instant::now(),
            lingering_since: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// How long the connection has waited for the peer to close after its response was sent.
    pub fn lingering_for(&self, now: Instant) -> Option<Duration> {
        self.lingering_since.map(|since| now.saturating_duration_since(since))
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closing;
    }

    /// Drain readable bytes, and answer once a request line is complete.
    pub fn on_readable<S>(
        &mut self,
        selector: &S,
        parser: &RequestParser,
        responder: &mut Responder,
    ) -> Result<(), Error>
    where
        S: Selector,
    {
        match self.state {
            ConnectionState::AwaitingRequest => {}
            ConnectionState::AwaitingResponse => return self.on_late_readable(),
            ConnectionState::Closing => return Ok(()),
        }

        let closed = self.receive(parser.max_line())?;

        let Some(result) = parser.consume(&mut self.inbound) else {
            if closed {
                event!(Level::DEBUG, peer = ?self.peer, "peer closed before sending a request");
                self.close();
            }

            return Ok(());
        };

        let reply = match result {
            Ok(request) => {
                let reply = responder.respond(&request);
                event!(
                    Level::INFO,
                    peer = ?self.peer,
                    method = %request.method,
                    path = %request.path,
                    status = reply.status.code(),
                    "request"
                );
                reply
            }
            Err(error) => {
                event!(Level::DEBUG, peer = ?self.peer, %error, "malformed request");
                responder.reject(&ServeError::from(error), true)
            }
        };

        self.queue(selector, reply.data)?;

        // Anything past the request line is unread, leaving it in the socket resets the
        // connection on close
        self.on_late_readable()
    }

    /// Discard bytes arriving after the request line was taken.
    fn on_late_readable(&mut self) -> Result<(), Error> {
        let closed = match self.discard() {
            Ok(closed) => closed,
            Err(error) if self.lingering_since.is_some() => {
                event!(Level::DEBUG, peer = ?self.peer, ?error, "read failed while lingering");
                true
            }
            Err(error) => return Err(error),
        };

        if closed && self.lingering_since.is_some() {
            self.close();
        }

        Ok(())
    }

    /// Flush as much of the queued response as the socket takes.
    pub fn on_writable(&mut self) -> Result<(), Error> {
        if self.state != ConnectionState::AwaitingResponse || self.lingering_since.is_some() {
            return Ok(());
        }

        while !self.outbound.is_empty() {
            let written = match check_io(self.stream.write(&self.outbound)) {
                Ok(Some(0)) => return Err(std::io::Error::from(ErrorKind::WriteZero).into()),
                Ok(Some(written)) => written,
                Ok(None) => return Ok(()),
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => return Err(error.into()),
            };

            event!(Level::TRACE, count = written, "sent data");
            self.outbound.advance(written);
            self.last_activity = Instant::now();
        }

        // Send FIN, then wait for the peer to close its side so unread request bytes don't
        // turn it into a reset
        if let Err(error) = self.stream.shutdown(Shutdown::Write) {
            event!(Level::DEBUG, peer = ?self.peer, ?error, "failed to shut down write half");
            self.close();
            return Ok(());
        }
        self.lingering_since = Some(Instant::now());

        self.on_late_readable()
    }

    fn queue<S>(&mut self, selector: &S, data: Bytes) -> Result<(), Error>
    where
        S: Selector,
    {
        self.inbound.clear();
        self.outbound = data;
        self.state = ConnectionState::AwaitingResponse;

        // Reads are still drained and discarded, we only answer one request
        selector.reregister(
            &mut self.stream,
            self.token,
            Interest::READABLE | Interest::WRITABLE,
        )?;

        Ok(())
    }

    /// Read until the socket would block or `limit` is passed, returns if the peer closed its
    /// side.
    fn receive(&mut self, limit: usize) -> Result<bool, Error> {
        let mut buffer = [0; 4096];

        loop {
            match self.read_chunk(&mut buffer)? {
                // Read of zero means the stream has been closed
                Some(0) => return Ok(true),
                Some(len) => {
                    self.inbound.extend_from_slice(&buffer[..len]);

                    // The parser rejects this anyway, don't buffer further
                    if self.inbound.len() > limit {
                        return Ok(false);
                    }
                }
                None => return Ok(false),
            }
        }
    }

    /// Read until the socket would block, dropping the data.
    fn discard(&mut self) -> Result<bool, Error> {
        let mut buffer = [0; 4096];

        loop {
            match self.read_chunk(&mut buffer)? {
                Some(0) => return Ok(true),
                Some(_) => {}
                None => return Ok(false),
            }
        }
    }

    fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<Option<usize>, Error> {
        loop {
            match check_io(self.stream.read(buffer)) {
                Ok(Some(len)) => {
                    if len != 0 {
                        event!(Level::TRACE, count = len, "received data");
                        self.last_activity = Instant::now();
                    }
                    return Ok(Some(len));
                }
                Ok(None) => return Ok(None),
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }
}
