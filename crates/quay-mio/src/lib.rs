//! Readiness polling for the quay event loop.
//!
//! The event loop only depends on the [`Selector`] trait. [`Registry`] implements it on top of
//! mio, which picks the best primitive the platform offers (epoll, kqueue, IOCP).

mod registry;

use std::io::ErrorKind;

pub use mio::{event::Source, net, Interest, Token};

pub use self::registry::{Ready, Registry, Selector};

/// Convert a non-blocking I/O result, mapping "would block" to `None`.
pub fn check_io<T>(value: Result<T, std::io::Error>) -> Result<Option<T>, std::io::Error> {
    match value {
        Ok(value) => Ok(Some(value)),
        Err(error) => {
            // WouldBlock just means we've run out of things to handle
            if error.kind() == ErrorKind::WouldBlock {
                Ok(None)
            } else {
                Err(error)
            }
        }
    }
}
