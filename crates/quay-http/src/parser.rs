use bytes::BytesMut;
use thiserror::Error;

use crate::request::{Request, Version};

/// Extracts request lines from a connection's inbound bytes.
#[derive(Debug, Clone, Copy)]
pub struct RequestParser {
    max_line: usize,
}

impl RequestParser {
    pub fn new(max_line: usize) -> Self {
        Self { max_line }
    }

    pub fn max_line(&self) -> usize {
        self.max_line
    }

    /// Try to take a request line out of `inbound`.
    ///
    /// Returns `None` if no complete line is buffered yet. Once a line is found, the line and
    /// everything buffered after it (headers, body) is cleared from `inbound`.
    pub fn consume(&self, inbound: &mut BytesMut) -> Option<Result<Request, ParseError>> {
        let Some(end) = inbound.iter().position(|b| *b == b'\n') else {
            if inbound.len() > self.max_line {
                inbound.clear();
                return Some(Err(ParseError::TooLong(self.max_line)));
            }

            return None;
        };

        let data = inbound.split().freeze();
        if end > self.max_line {
            return Some(Err(ParseError::TooLong(self.max_line)));
        }

        // CRLF is the required terminator, but a bare LF is accepted the same
        let mut line = &data[..end];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }

        Some(parse_request_line(line))
    }
}

fn parse_request_line(line: &[u8]) -> Result<Request, ParseError> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::Encoding)?;

    let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
    let [method, target, version] = tokens[..] else {
        return Err(ParseError::TokenCount(tokens.len()));
    };

    let version =
        Version::from_token(version).ok_or_else(|| ParseError::UnknownVersion(version.into()))?;

    if !method.bytes().all(is_token_byte) {
        return Err(ParseError::InvalidMethod(method.into()));
    }

    let path = decode_target(target)?;

    let request = Request {
        method: method.to_string(),
        path,
        version,
    };
    Ok(request)
}

/// Bytes allowed in a method token (RFC 9110 `tchar`).
fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}

fn decode_target(target: &str) -> Result<String, ParseError> {
    // Query and fragment have no meaning for a file lookup
    let end = target.find(['?', '#']).unwrap_or(target.len());

    let path = urlencoding::decode(&target[..end]).map_err(|_| ParseError::PathEncoding)?;
    if path.contains('\0') {
        return Err(ParseError::PathEncoding);
    }

    Ok(path.into_owned())
}

/// The request line could not be parsed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("no request line within {0} bytes")]
    TooLong(usize),
    #[error("request line is not valid utf-8")]
    Encoding,
    #[error("expected 3 tokens in request line, found {0}")]
    TokenCount(usize),
    #[error("unknown protocol version {0:?}")]
    UnknownVersion(String),
    #[error("invalid method token {0:?}")]
    InvalidMethod(String),
    #[error("request path is not a valid percent-encoded utf-8 path")]
    PathEncoding,
}
