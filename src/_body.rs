use crate::_events::Event;
use crate::_state::State;
use crate::_supervisor::{ServeError, Session};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BodyError {
    /// Each request body can be streamed once.
    #[error("the request body stream was already consumed")]
    StreamAlreadyConsumed,
    #[error(transparent)]
    Read(#[from] ServeError),
}

/// The request body as handed to a handler. Nothing is read from the peer
/// until the handler asks for it.
pub struct RequestBody<'a> {
    session: &'a mut Session,
    consumed: bool,
}

impl<'a> RequestBody<'a> {
    pub(crate) fn new(session: &'a mut Session) -> Self {
        Self {
            session,
            consumed: false,
        }
    }

    /// Starts streaming the body. Fails without touching the connection if a
    /// stream was already started.
    pub fn stream(&mut self) -> Result<BodyStream<'_>, BodyError> {
        if self.consumed {
            return Err(BodyError::StreamAlreadyConsumed);
        }
        self.consumed = true;
        Ok(BodyStream::new(&mut *self.session))
    }

    pub async fn read_all(&mut self) -> Result<Vec<u8>, BodyError> {
        let mut stream = self.stream()?;
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        Ok(body)
    }
}

/// Pulls body chunks as they arrive. Ends at the request's end-of-message.
pub struct BodyStream<'s> {
    session: &'s mut Session,
    finished: bool,
}

impl<'s> BodyStream<'s> {
    pub(crate) fn new(session: &'s mut Session) -> Self {
        Self {
            session,
            finished: false,
        }
    }

    pub async fn next(&mut self) -> Option<Result<Vec<u8>, ServeError>> {
        loop {
            if self.finished || self.session.their_state() != State::SendingBody {
                return None;
            }
            match self.session.next_event().await {
                Ok(Event::Data(data)) if data.data.is_empty() => continue,
                Ok(Event::Data(data)) => return Some(Ok(data.data)),
                Ok(Event::EndOfMessage(_)) => {
                    self.finished = true;
                    return None;
                }
                Ok(other) => {
                    self.finished = true;
                    return Some(Err(ServeError::ProtocolViolation(
                        format!("unexpected {:?} inside a request body", other).into(),
                    )));
                }
                Err(error) => {
                    self.finished = true;
                    return Some(Err(error));
                }
            }
        }
    }
}
