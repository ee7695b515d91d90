use std::{fs, num::NonZeroUsize};

use anyhow::{Context as _, Error};
use bytes::Bytes;
use tracing::{event, Level};

use crate::{
    cache::{CacheKey, ResponseCache},
    config::ServerConfig,
    error::ServeError,
    mime,
    request::{Method, Request},
    resolver::PathResolver,
    response::{Response, Status},
};

/// Serialized response ready to be queued on a connection.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: Status,
    pub data: Bytes,
}

/// Turns requests into response bytes, going through the cache where possible.
pub struct Responder {
    resolver: PathResolver,
    cache: ResponseCache,
    server_name: String,
}

impl Responder {
    pub fn new(config: &ServerConfig) -> Result<Self, Error> {
        let resolver = PathResolver::new(
            &config.document_root,
            config.index_file.clone(),
            &config.allowed_extensions,
        )?;
        let capacity =
            NonZeroUsize::new(config.cache_capacity).context("cache capacity must not be zero")?;

        let value = Self {
            resolver,
            cache: ResponseCache::new(capacity),
            server_name: config.server_name.clone(),
        };
        Ok(value)
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn respond(&mut self, request: &Request) -> Reply {
        let Some(method) = Method::from_token(&request.method) else {
            let error = ServeError::UnsupportedMethod(request.method.clone());
            return self.reject(&error, true);
        };

        match self.serve(method, &request.path) {
            Ok(data) => Reply {
                status: Status::Ok,
                data,
            },
            Err(error) => {
                event!(Level::DEBUG, path = %request.path, "{}", error);
                self.reject(&error, method == Method::Get)
            }
        }
    }

    fn serve(&mut self, method: Method, path: &str) -> Result<Bytes, ServeError> {
        let resolved = self.resolver.resolve(path)?;

        let key = CacheKey {
            method,
            path: resolved.path,
        };
        if let Some(data) = self.cache.get(&key) {
            return Ok(data);
        }

        let contents = match fs::read(&key.path) {
            Ok(contents) => contents,
            Err(error) => {
                event!(Level::WARN, path = ?key.path, ?error, "failed to read file");
                return Err(ServeError::PathNotFound);
            }
        };

        let content_type = mime::classify(&resolved.extension);
        let response = Response::with_body(
            Status::Ok,
            &self.server_name,
            content_type.header_value(),
            Bytes::from(contents),
        )
        .header("Connection", "close");

        let data = response.serialize(method == Method::Get);
        self.cache.insert(key, data.clone());

        Ok(data)
    }

    /// Build the response for a request that can't be served.
    pub fn reject(&self, error: &ServeError, include_body: bool) -> Reply {
        let status = error.status();

        let mut response = Response::with_body(
            status,
            &self.server_name,
            "text/plain; charset=utf-8",
            Bytes::from_static(status.reason().as_bytes()),
        );
        if status == Status::MethodNotAllowed {
            response = response.header("Allow", Method::ALLOW);
        }
        response = response.header("Connection", "close");

        Reply {
            status,
            data: response.serialize(include_body),
        }
    }
}
