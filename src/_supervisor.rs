//! The per-connection loop.
//!
//! A [`Session`] owns the transport and the protocol engine of one accepted
//! connection and walks every request/response cycle through
//! `AwaitingRequest -> Dispatching -> Sending -> (Recycling | Closing)`.
//! Every wait on the peer is bounded by a timeout; whatever goes wrong inside
//! a cycle is turned into an error response when the engine still allows one,
//! and the connection is closed otherwise. Nothing escapes the task.

use crate::_body::{BodyStream, RequestBody};
use crate::_config::{Environment, ServerConfig};
use crate::_connection::{status_forbids_body, Connection};
use crate::_events::{Event, Request, Response};
use crate::_handler::{HandlerError, HttpError, Reply, Route, Router};
use crate::_headers::{normalize_and_validate, Headers};
use crate::_shutdown::{shutdown, ShutdownOutcome};
use crate::_state::State;
use crate::_transport::{is_disconnect, BoxTransport};
use crate::_util::{reason_phrase, LocalProtocolError, ProtocolError};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{error::Elapsed, timeout};
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Error)]
pub enum ServeError {
    /// We tried to do something the protocol state doesn't allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(LocalProtocolError),
    #[error("malformed request ({status}): {message}")]
    Decode { status: u16, message: String },
    #[error("timed out")]
    Timeout,
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl From<ProtocolError> for ServeError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::LocalProtocolError(error) => ServeError::ProtocolViolation(error),
            ProtocolError::RemoteProtocolError(error) => ServeError::Decode {
                status: error.code,
                message: error.message,
            },
        }
    }
}

impl From<Elapsed> for ServeError {
    fn from(_: Elapsed) -> Self {
        ServeError::Timeout
    }
}

impl ServeError {
    /// Status of the error response to attempt, if the peer can still get one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ServeError::ProtocolViolation(_) => Some(500),
            ServeError::Decode { status, .. } => Some(*status),
            ServeError::Timeout => Some(408),
            ServeError::PeerClosed | ServeError::Io(_) => None,
        }
    }

    pub fn is_disconnect(&self) -> bool {
        match self {
            ServeError::PeerClosed => true,
            ServeError::Io(error) => is_disconnect(error),
            _ => false,
        }
    }
}

enum Phase {
    AwaitingRequest,
    Dispatching(Request),
    /// `drain_body` is off once the cycle broke; the rest of the request
    /// isn't read.
    Sending { reply: Reply, drain_body: bool },
    Recycling,
    Closing,
}

/// Validates a reply's headers and framing before anything reaches the wire.
/// An explicit `Content-Length` must match the body unless no body is sent.
fn response_for(reply: &Reply, head_request: bool) -> Result<Response, ProtocolError> {
    let headers = normalize_and_validate(reply.headers.clone(), false)?;
    if headers.contains(b"transfer-encoding") {
        return Err(ProtocolError::LocalProtocolError(
            "replies can't set Transfer-Encoding".into(),
        ));
    }
    if let Some(length) = headers.get(b"content-length") {
        if !head_request
            && !status_forbids_body(reply.status)
            && length != reply.body.len().to_string().as_bytes()
        {
            return Err(ProtocolError::LocalProtocolError(
                format!(
                    "Content-Length {} doesn't match a {} byte body",
                    String::from_utf8_lossy(length),
                    reply.body.len()
                )
                .into(),
            ));
        }
    }
    Ok(Response::new(reply.status, headers))
}

pub struct Session {
    transport: BoxTransport,
    conn: Connection,
    config: Arc<ServerConfig>,
    read_buf: Vec<u8>,
}

impl Session {
    pub fn new(transport: BoxTransport, config: Arc<ServerConfig>) -> Self {
        Self {
            transport,
            conn: Connection::new(Some(config.max_incomplete_event_size)),
            read_buf: vec![0; config.max_recv.max(1)],
            config,
        }
    }

    pub fn our_state(&self) -> State {
        self.conn.our_state()
    }

    pub fn their_state(&self) -> State {
        self.conn.their_state()
    }

    /// Next decoded event, reading from the peer as needed. The whole event
    /// has to arrive within the read timeout.
    pub(crate) async fn next_event(&mut self) -> Result<Event, ServeError> {
        let deadline = self.config.read_timeout;
        timeout(deadline, self.pull_event()).await?
    }

    async fn pull_event(&mut self) -> Result<Event, ServeError> {
        loop {
            match self.conn.next_event()? {
                Event::NeedData() => self.read_from_peer().await?,
                event => return Ok(event),
            }
        }
    }

    async fn read_from_peer(&mut self) -> Result<(), ServeError> {
        if self.conn.they_are_waiting_for_100_continue() {
            debug!("sending 100 Continue");
            self.send(Response::new(100, Headers::default()).into())
                .await?;
        }
        let read = match self.transport.read(&mut self.read_buf).await {
            Ok(read) => read,
            Err(error) if is_disconnect(&error) => {
                // They've stopped listening; same as a close.
                debug!("read failed: {}", error);
                0
            }
            Err(error) => return Err(error.into()),
        };
        self.conn.receive_data(&self.read_buf[..read])?;
        Ok(())
    }

    async fn send(&mut self, event: Event) -> Result<(), ServeError> {
        if matches!(
            event,
            Event::NormalResponse(_) | Event::InformationalResponse(_)
        ) {
            self.conn
                .set_identity_headers(self.config.identity_headers());
        }
        let data = self.conn.send(event)?;
        self.write(&data).await
    }

    async fn send_response(&mut self, response: Response, body: &[u8]) -> Result<(), ServeError> {
        self.conn
            .set_identity_headers(self.config.identity_headers());
        let data = self.conn.send_response(response, body)?;
        self.write(&data).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), ServeError> {
        let transport = &mut self.transport;
        let written = timeout(self.config.write_timeout, async {
            transport.write_all(data).await?;
            transport.flush().await
        })
        .await;
        let error = match written {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(error)) if is_disconnect(&error) => ServeError::PeerClosed,
            Ok(Err(error)) => error.into(),
            Err(elapsed) => elapsed.into(),
        };
        self.conn.send_failed();
        Err(error)
    }

    /// Serves cycles until the connection can't be reused, then shuts it down.
    pub async fn run<R: Router>(mut self, router: &R) -> ShutdownOutcome {
        let mut phase = Phase::AwaitingRequest;
        loop {
            phase = match phase {
                Phase::AwaitingRequest => self.await_request(router).await,
                Phase::Dispatching(request) => self.dispatch(router, request).await,
                Phase::Sending { reply, drain_body } => {
                    self.send_reply(router, reply, drain_body).await
                }
                Phase::Recycling => match self.conn.start_next_cycle() {
                    Ok(()) => Phase::AwaitingRequest,
                    Err(error) => {
                        warn!("couldn't start next cycle: {}", error);
                        Phase::Closing
                    }
                },
                Phase::Closing => break,
            };
        }
        debug!(states = %self.conn.states(), "must close connection");
        shutdown(
            self.transport,
            self.config.drain_timeout,
            self.config.max_recv,
        )
        .await
    }

    async fn await_request<R: Router>(&mut self, router: &R) -> Phase {
        debug_assert_eq!(self.conn.states(), crate::_state::StatePair::IDLE);
        match self.next_event().await {
            Ok(Event::Request(request)) => Phase::Dispatching(request),
            Ok(Event::ConnectionClosed(_)) => {
                debug!("peer closed the connection between requests");
                Phase::Closing
            }
            Ok(other) => {
                warn!("unexpected {:?} while awaiting a request", other);
                Phase::Closing
            }
            Err(error) => self.fail(router, error),
        }
    }

    async fn dispatch<R: Router>(&mut self, router: &R, request: Request) -> Phase {
        info!(
            method = %String::from_utf8_lossy(&request.method),
            target = %String::from_utf8_lossy(&request.target),
            "request"
        );
        let outcome = match router.route(&request) {
            Route::Found(handler) => {
                router
                    .invoke(&handler, &request, RequestBody::new(self))
                    .await
            }
            Route::NotFound => Err(HttpError::new(
                404,
                format!("no route for {}", String::from_utf8_lossy(request.path())),
            )
            .into()),
            Route::MethodNotAllowed => Err(HttpError::new(
                405,
                format!(
                    "{} is not allowed for {}",
                    String::from_utf8_lossy(&request.method),
                    String::from_utf8_lossy(request.path())
                ),
            )
            .into()),
        };

        let reply = match outcome {
            Ok(reply) if !(200..=999).contains(&reply.status) => {
                error!(status = reply.status, "handler returned a non-final status");
                self.error_reply(
                    router,
                    HttpError::new(500, format!("handler returned status {}", reply.status)),
                )
            }
            Ok(reply) => reply,
            Err(HandlerError::Http(error)) => {
                debug!(status = error.status, "{}", error.detail);
                self.error_reply(router, error)
            }
            Err(HandlerError::Body(error)) => return self.fail(router, error),
            Err(HandlerError::Failure(error)) => {
                error!("handler failed: {:#}", error);
                self.error_reply(router, HttpError::new(500, format!("{:#}", error)))
            }
        };
        Phase::Sending {
            reply,
            drain_body: true,
        }
    }

    async fn send_reply<R: Router>(&mut self, router: &R, reply: Reply, drain_body: bool) -> Phase {
        if drain_body && self.their_state() == State::SendingBody {
            debug!("handler didn't consume the request body, draining it");
            if let Err(error) = self.drain_body().await {
                return self.fail(router, error);
            }
        }
        if self.their_state() == State::Error {
            // the handler swallowed a decode error; nothing more can be read
            self.conn.disable_keep_alive();
        }
        if !self.can_respond() {
            warn!(state = ?self.our_state(), "can't send a response in this state");
            return Phase::Closing;
        }

        let head_request = self.conn.request_method() == Some(b"HEAD".as_slice());
        let (response, body) = match response_for(&reply, head_request) {
            Ok(response) => (response, reply.body),
            Err(error) => {
                error!("handler reply rejected: {}", error);
                let fallback = self.error_reply(router, HttpError::new(500, error.to_string()));
                match response_for(&fallback, head_request) {
                    Ok(response) => (response, fallback.body),
                    Err(error) => {
                        error!("error reply rejected: {}", error);
                        return Phase::Closing;
                    }
                }
            }
        };
        let status = response.status_code;
        if let Err(error) = self.send_response(response, &body).await {
            if error.is_disconnect() {
                debug!("peer went away while sending: {}", error);
            } else {
                warn!("failed to send response: {}", error);
            }
            return Phase::Closing;
        }
        debug!(status, states = %self.conn.states(), "response sent");

        if self.conn.states().is_reusable() {
            Phase::Recycling
        } else {
            Phase::Closing
        }
    }

    async fn drain_body(&mut self) -> Result<(), ServeError> {
        let mut stream = BodyStream::new(self);
        while let Some(chunk) = stream.next().await {
            chunk?;
        }
        Ok(())
    }

    fn can_respond(&self) -> bool {
        matches!(self.our_state(), State::Idle | State::SendingHeaders)
    }

    /// Turns a failed cycle into an error reply, or gives up on the
    /// connection when no reply can be sent.
    fn fail<R: Router>(&mut self, router: &R, error: ServeError) -> Phase {
        let status = match error.status() {
            Some(status) if self.can_respond() => status,
            _ => {
                if error.is_disconnect() {
                    debug!("peer went away: {}", error);
                } else {
                    warn!("closing connection: {}", error);
                }
                return Phase::Closing;
            }
        };
        match &error {
            ServeError::Timeout => info!("timed out waiting for the peer"),
            ServeError::ProtocolViolation(_) => error!("{}", error),
            _ => warn!(status, "{}", error),
        }
        // Nothing after a broken cycle is read as a new request.
        self.conn.disable_keep_alive();
        Phase::Sending {
            reply: self.error_reply(router, HttpError::new(status, error.to_string())),
            drain_body: false,
        }
    }

    fn error_reply<R: Router>(&self, router: &R, error: HttpError) -> Reply {
        if let Some(render) = router.error_handler_for(error.status) {
            return render(&error);
        }
        let body = match self.config.environment {
            Environment::Dev => error.detail,
            Environment::Prod => match reason_phrase(error.status) {
                "" => "error".to_string(),
                reason => reason.to_ascii_lowercase(),
            },
        };
        Reply::text(error.status, body)
    }
}

/// Serves one accepted connection to completion.
pub async fn serve_connection<R: Router>(
    transport: BoxTransport,
    id: u64,
    peer: String,
    router: Arc<R>,
    config: Arc<ServerConfig>,
) -> ShutdownOutcome {
    let span = info_span!("conn", id, peer = %peer);
    async move {
        debug!("serving connection");
        let outcome = Session::new(transport, config).run(router.as_ref()).await;
        debug!(?outcome, "connection finished");
        outcome
    }
    .instrument(span)
    .await
}
