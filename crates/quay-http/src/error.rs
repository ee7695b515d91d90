use thiserror::Error;

use crate::{parser::ParseError, resolver::ResolveError, response::Status};

/// Why a request was not answered with a file.
///
/// None of these end the event loop, each is answered on its own connection.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("malformed request")]
    MalformedRequest(#[from] ParseError),
    #[error("unsupported method {0:?}")]
    UnsupportedMethod(String),
    #[error("path not found")]
    PathNotFound,
    #[error("path forbidden: {0}")]
    PathForbidden(&'static str),
}

impl ServeError {
    pub fn status(&self) -> Status {
        match self {
            Self::MalformedRequest(_) => Status::BadRequest,
            Self::UnsupportedMethod(_) => Status::MethodNotAllowed,
            // Forbidden paths are answered exactly like missing ones
            Self::PathNotFound | Self::PathForbidden(_) => Status::NotFound,
        }
    }
}

impl From<ResolveError> for ServeError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::NotFound => Self::PathNotFound,
            ResolveError::Forbidden(reason) => Self::PathForbidden(reason),
        }
    }
}
