use crate::_body::{BodyError, RequestBody};
use crate::_events::Request;
use crate::_supervisor::ServeError;
use std::future::Future;
use thiserror::Error;

/// Outcome of matching a request against the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route<H> {
    Found(H),
    NotFound,
    /// The path exists but not for this method.
    MethodNotAllowed,
}

/// What a handler answers with. The body is always fully buffered; framing
/// headers are added when it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body.into())
    }

    pub fn with_header(mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        self.headers
            .push((name.as_ref().to_vec(), value.as_ref().to_vec()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// A handler deliberately answering with an error status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {detail}")]
pub struct HttpError {
    pub status: u16,
    pub detail: String,
}

impl HttpError {
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Http(#[from] HttpError),
    /// Reading the request body failed.
    #[error("request body: {0}")]
    Body(ServeError),
    #[error(transparent)]
    Failure(#[from] anyhow::Error),
}

impl From<BodyError> for HandlerError {
    fn from(error: BodyError) -> Self {
        match error {
            BodyError::Read(error) => HandlerError::Body(error),
            consumed @ BodyError::StreamAlreadyConsumed => HandlerError::Failure(consumed.into()),
        }
    }
}

impl From<ServeError> for HandlerError {
    fn from(error: ServeError) -> Self {
        HandlerError::Body(error)
    }
}

/// Renders the reply for an error status in place of the plain-text default.
pub type ErrorHandler = Box<dyn Fn(&HttpError) -> Reply + Send + Sync>;

/// The application side of the connection: picks a handler for each request
/// and runs it. One router is shared by every connection of a server.
pub trait Router: Send + Sync + 'static {
    type Handler: Send + Sync;

    fn route(&self, request: &Request) -> Route<Self::Handler>;

    /// Runs `handler`. The body may be streamed through `body` or ignored, in
    /// which case it is drained before the reply goes out.
    fn invoke<'a>(
        &'a self,
        handler: &'a Self::Handler,
        request: &'a Request,
        body: RequestBody<'a>,
    ) -> impl Future<Output = Result<Reply, HandlerError>> + Send + 'a;

    fn error_handler_for(&self, _status: u16) -> Option<&ErrorHandler> {
        None
    }
}
