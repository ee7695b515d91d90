use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
        }
    }
}

/// An HTTP/1.1 response, headers kept in insertion order.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: Status,
    pub headers: Vec<(&'static str, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Start a response with the headers every response carries.
    ///
    /// `Content-Length` always describes `body`, even when the body is later left off the wire.
    pub fn with_body(
        status: Status,
        server: &str,
        content_type: impl Into<String>,
        body: Bytes,
    ) -> Self {
        let date = httpdate::fmt_http_date(SystemTime::now());

        Self::new(status)
            .header("Date", date)
            .header("Server", server)
            .header("Content-Length", body.len().to_string())
            .header("Content-Type", content_type)
            .body(body)
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize the status line, headers and, if requested, the body.
    pub fn serialize(&self, include_body: bool) -> Bytes {
        let mut data = BytesMut::with_capacity(256 + self.body.len());

        data.put(&b"HTTP/1.1 "[..]);
        data.put(self.status.code().to_string().as_bytes());
        data.put_u8(b' ');
        data.put(self.status.reason().as_bytes());
        data.put(&b"\r\n"[..]);

        for (name, value) in &self.headers {
            data.put(name.as_bytes());
            data.put(&b": "[..]);
            data.put(value.as_bytes());
            data.put(&b"\r\n"[..]);
        }
        data.put(&b"\r\n"[..]);

        if include_body {
            data.put(self.body.clone());
        }

        data.freeze()
    }
}
