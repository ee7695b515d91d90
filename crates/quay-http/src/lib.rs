//! A non-blocking static file server.
//!
//! One [`Server`] is one thread, one readiness loop, one response cache. Every request is
//! answered with a single response, after which the connection is closed.

mod cache;
mod config;
mod connection;
mod error;
mod mime;
mod parser;
mod request;
mod resolver;
mod responder;
mod response;
mod server;
mod shutdown;

pub use self::{
    cache::{CacheKey, ResponseCache},
    config::{ConfigError, ServerConfig, DEFAULT_EXTENSIONS},
    connection::{Connection, ConnectionState},
    error::ServeError,
    mime::{classify, ContentType, TransferMode},
    parser::{ParseError, RequestParser},
    request::{Method, Request, Version},
    resolver::{PathResolver, ResolveError, Resolved},
    responder::{Reply, Responder},
    response::{Response, Status},
    server::Server,
    shutdown::Shutdown,
};
