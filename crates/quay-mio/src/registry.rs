use std::{io::ErrorKind, time::Duration};

use anyhow::{Context as _, Error};
use mio::{event::Source, Events, Interest, Poll, Token};
use tracing::{event, Level};

/// Readiness polling primitive.
///
/// Sources are registered under a token with an interest, and `select` reports which tokens
/// became ready. Implementations may be edge-triggered, so callers must drain a source until it
/// would block before expecting another report for it.
pub trait Selector {
    /// Create a new unique token.
    fn token(&mut self) -> Token;

    fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<(), Error>
    where
        S: Source + ?Sized;

    fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<(), Error>
    where
        S: Source + ?Sized;

    fn deregister<S>(&self, source: &mut S) -> Result<(), Error>
    where
        S: Source + ?Sized;

    /// Wait until at least one source is ready, or `timeout` elapses.
    ///
    /// Clears `ready` and fills it with the reported events. A wait interrupted by a signal
    /// reports nothing rather than failing.
    fn select(&mut self, ready: &mut Vec<Ready>, timeout: Option<Duration>) -> Result<(), Error>;
}

/// Readiness reported for a single token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    /// The source reported an error or the peer hung up entirely.
    pub error: bool,
}

/// mio backed selector.
pub struct Registry {
    poll: Poll,
    events: Events,
    next_token: usize,
}

impl Registry {
    pub fn new() -> Result<Self, Error> {
        let poll = Poll::new().context("failed to create poll instance")?;

        let value = Self {
            poll,
            events: Events::with_capacity(128),
            next_token: 0,
        };
        Ok(value)
    }
}

impl Selector for Registry {
    fn token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<(), Error>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().register(source, token, interest)?;
        Ok(())
    }

    fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> Result<(), Error>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().reregister(source, token, interest)?;
        Ok(())
    }

    fn deregister<S>(&self, source: &mut S) -> Result<(), Error>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().deregister(source)?;
        Ok(())
    }

    fn select(&mut self, ready: &mut Vec<Ready>, timeout: Option<Duration>) -> Result<(), Error> {
        ready.clear();

        if let Err(error) = self.poll.poll(&mut self.events, timeout) {
            if error.kind() == ErrorKind::Interrupted {
                event!(Level::TRACE, "poll interrupted");
                return Ok(());
            }

            return Err(Error::new(error).context("failed to poll for readiness"));
        }

        for mio_event in self.events.iter() {
            ready.push(Ready {
                token: mio_event.token(),
                readable: mio_event.is_readable(),
                writable: mio_event.is_writable(),
                error: mio_event.is_error()
                    || (mio_event.is_read_closed() && mio_event.is_write_closed()),
            });
        }

        event!(Level::TRACE, count = ready.len(), "selected");

        Ok(())
    }
}
