mod _abnf;
mod _body;
mod _config;
mod _connection;
mod _events;
mod _handler;
mod _headers;
mod _readers;
mod _receivebuffer;
mod _server;
mod _shutdown;
mod _state;
mod _supervisor;
mod _transport;
mod _util;
mod _writers;

pub use _body::{BodyError, BodyStream, RequestBody};
pub use _config::{Environment, ServerConfig};
pub use _connection::Connection;
pub use _events::{ConnectionClosed, Data, EndOfMessage, Event, Request, Response};
pub use _handler::{ErrorHandler, HandlerError, HttpError, Reply, Route, Router};
pub use _headers::Headers;
pub use _server::Server;
pub use _shutdown::{shutdown, ShutdownOutcome};
pub use _state::{settle, transition, EventType, Side, State, StatePair};
pub use _supervisor::{serve_connection, ServeError, Session};
pub use _transport::{BoxTransport, Transport};
pub use _util::{reason_phrase, LocalProtocolError, ProtocolError, RemoteProtocolError};
