use crate::_abnf::{METHOD, REQUEST_TARGET};
use crate::{_headers::Headers, _util::ProtocolError};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::fmt::{self, Formatter};

lazy_static! {
    static ref METHOD_RE: Regex = Regex::new(&format!(r"^{}$", *METHOD)).unwrap();
    static ref REQUEST_TARGET_RE: Regex =
        Regex::new(&format!(r"^{}$", *REQUEST_TARGET)).unwrap();
}

/// Request line plus headers. This is the request descriptor handed to
/// routers and handlers.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Request {
    pub method: Vec<u8>,
    pub headers: Headers,
    pub target: Vec<u8>,
    pub http_version: Vec<u8>,
}

impl Request {
    pub fn new(
        method: Vec<u8>,
        headers: Headers,
        target: Vec<u8>,
        http_version: Vec<u8>,
    ) -> Result<Self, ProtocolError> {
        let host_count = headers.iter().filter(|(name, _)| *name == b"host").count();
        if http_version == b"1.1" && host_count == 0 {
            return Err(ProtocolError::LocalProtocolError(
                "Missing mandatory Host: header".into(),
            ));
        }
        if host_count > 1 {
            return Err(ProtocolError::LocalProtocolError(
                "Found multiple Host: headers".into(),
            ));
        }
        if !METHOD_RE.is_match(&method) {
            return Err(ProtocolError::LocalProtocolError(
                "Illegal method characters".into(),
            ));
        }
        if !REQUEST_TARGET_RE.is_match(&target) {
            return Err(ProtocolError::LocalProtocolError(
                "Illegal target characters".into(),
            ));
        }

        Ok(Self {
            method,
            headers,
            target,
            http_version,
        })
    }

    /// The target up to (not including) any query string.
    pub fn path(&self) -> &[u8] {
        match self.target.iter().position(|b| *b == b'?') {
            Some(idx) => &self.target[..idx],
            None => &self.target,
        }
    }

    pub fn query(&self) -> Option<&[u8]> {
        self.target
            .iter()
            .position(|b| *b == b'?')
            .map(|idx| &self.target[idx + 1..])
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &String::from_utf8_lossy(&self.method))
            .field("headers", &self.headers)
            .field("target", &String::from_utf8_lossy(&self.target))
            .field("http_version", &String::from_utf8_lossy(&self.http_version))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub headers: Headers,
    pub http_version: Vec<u8>,
    pub reason: Vec<u8>,
    pub status_code: u16,
}

impl Response {
    /// An HTTP/1.1 response with the standard reason phrase for `status_code`.
    pub fn new(status_code: u16, headers: Headers) -> Self {
        Self {
            headers,
            http_version: b"1.1".to_vec(),
            reason: crate::_util::reason_phrase(status_code).as_bytes().to_vec(),
            status_code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Data {
    pub data: Vec<u8>,
    pub chunk_start: bool,
    pub chunk_end: bool,
}

impl Data {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            chunk_start: false,
            chunk_end: false,
        }
    }
}

/// End of the current message. Carries trailers when the body was chunked.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndOfMessage {
    pub headers: Headers,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionClosed {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Request(Request),
    NormalResponse(Response),
    InformationalResponse(Response),
    Data(Data),
    EndOfMessage(EndOfMessage),
    ConnectionClosed(ConnectionClosed),
    /// The decoder needs more bytes before it can produce another event.
    NeedData(),
    /// The peer finished its message and has already started the next one;
    /// nothing more is decoded until the cycle is recycled.
    Paused(),
}

impl From<Request> for Event {
    fn from(request: Request) -> Self {
        Self::Request(request)
    }
}

impl From<Response> for Event {
    fn from(response: Response) -> Self {
        match response.status_code {
            100..=199 => Self::InformationalResponse(response),
            _ => Self::NormalResponse(response),
        }
    }
}

impl From<Data> for Event {
    fn from(data: Data) -> Self {
        Self::Data(data)
    }
}

impl From<EndOfMessage> for Event {
    fn from(end_of_message: EndOfMessage) -> Self {
        Self::EndOfMessage(end_of_message)
    }
}

impl From<ConnectionClosed> for Event {
    fn from(connection_closed: ConnectionClosed) -> Self {
        Self::ConnectionClosed(connection_closed)
    }
}
