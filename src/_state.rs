//! The connection-level state machine.
//!
//! Each side of the connection is tracked independently: `Local` is this
//! server, `Remote` is the client. A side only moves when it sends an event
//! (event-triggered transitions, [`transition`]) or when the combination of
//! both sides plus the keep-alive flag forces it (state-triggered transitions,
//! [`settle`]). Both functions are pure, so the whole table can be exercised
//! without a socket; [`ConnectionState`] just owns the current pair and the two
//! flags that feed into [`settle`].

use crate::{Event, ProtocolError};
use std::fmt;

#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum Side {
    Local,
    Remote,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum State {
    Idle,
    /// Local only: a request arrived and a response is owed.
    SendingHeaders,
    SendingBody,
    Done,
    MustClose,
    Closed,
    /// The side hit a fatal protocol error. Never reusable.
    Error,
    SwitchedProtocol,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum EventType {
    Request,
    InformationalResponse,
    NormalResponse,
    Data,
    EndOfMessage,
    ConnectionClosed,
    NeedData,
    Paused,
    /// A 101 response accepting a pending `Upgrade:` proposal.
    InformationalResponseSwitchUpgrade,
}

impl From<&Event> for EventType {
    fn from(value: &Event) -> Self {
        match value {
            Event::Request(_) => EventType::Request,
            Event::NormalResponse(_) => EventType::NormalResponse,
            Event::InformationalResponse(_) => EventType::InformationalResponse,
            Event::Data(_) => EventType::Data,
            Event::EndOfMessage(_) => EventType::EndOfMessage,
            Event::ConnectionClosed(_) => EventType::ConnectionClosed,
            Event::NeedData() => EventType::NeedData,
            Event::Paused() => EventType::Paused,
        }
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub struct StatePair {
    pub local: State,
    pub remote: State,
}

impl StatePair {
    pub const IDLE: StatePair = StatePair {
        local: State::Idle,
        remote: State::Idle,
    };

    pub fn new(local: State, remote: State) -> Self {
        Self { local, remote }
    }

    pub fn get(&self, side: Side) -> State {
        match side {
            Side::Local => self.local,
            Side::Remote => self.remote,
        }
    }

    pub fn with(mut self, side: Side, state: State) -> Self {
        match side {
            Side::Local => self.local = state,
            Side::Remote => self.remote = state,
        }
        self
    }

    /// Both sides finished the cycle and may be reset to `Idle`.
    pub fn is_reusable(&self) -> bool {
        self.local == State::Done && self.remote == State::Done
    }
}

impl fmt::Display for StatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local={:?} remote={:?}", self.local, self.remote)
    }
}

/// Event-triggered transition for `side` sending `event_type`. Illegal
/// combinations fail and leave the caller's pair untouched.
pub fn transition(
    pair: StatePair,
    side: Side,
    event_type: EventType,
) -> Result<StatePair, ProtocolError> {
    let state = pair.get(side);
    let next = match (side, state, event_type) {
        (Side::Remote, State::Idle, EventType::Request) => {
            if pair.local != State::Idle {
                return Err(ProtocolError::LocalProtocolError(
                    format!("Received a request while local={:?}", pair.local).into(),
                ));
            }
            // The request obliges us to answer.
            return Ok(StatePair::new(State::SendingHeaders, State::SendingBody));
        }
        (Side::Remote, State::SendingBody, EventType::Data) => State::SendingBody,
        (Side::Remote, State::SendingBody, EventType::EndOfMessage) => State::Done,

        (Side::Local, State::Idle, EventType::NormalResponse) => State::SendingBody,
        (Side::Local, State::SendingHeaders, EventType::InformationalResponse) => {
            State::SendingHeaders
        }
        (Side::Local, State::SendingHeaders, EventType::NormalResponse) => State::SendingBody,
        (Side::Local, State::SendingHeaders, EventType::InformationalResponseSwitchUpgrade) => {
            State::SwitchedProtocol
        }
        (Side::Local, State::SendingBody, EventType::Data) => State::SendingBody,
        (Side::Local, State::SendingBody, EventType::EndOfMessage) => State::Done,

        (
            _,
            State::Idle | State::Done | State::MustClose | State::Closed,
            EventType::ConnectionClosed,
        ) => State::Closed,
        _ => {
            return Err(ProtocolError::LocalProtocolError(
                format!(
                    "Can't handle event type {:?} when side={:?} and state={:?}",
                    event_type, side, state
                )
                .into(),
            ))
        }
    };
    Ok(pair.with(side, next))
}

/// Applies the state-triggered transitions until nothing changes.
pub fn settle(mut pair: StatePair, keep_alive: bool, pending_upgrade: bool) -> StatePair {
    loop {
        let start = pair;

        if !keep_alive {
            for side in [Side::Local, Side::Remote] {
                if pair.get(side) == State::Done {
                    pair = pair.with(side, State::MustClose);
                }
            }
        }

        pair = match (pair.local, pair.remote) {
            (State::SwitchedProtocol, State::Done) if pending_upgrade => {
                pair.with(Side::Remote, State::SwitchedProtocol)
            }
            // An idle side facing an errored peer may still report the error.
            (State::Done | State::Idle, State::Closed) | (State::Done, State::Error) => {
                pair.with(Side::Local, State::MustClose)
            }
            (State::Closed, State::Done | State::Idle) | (State::Error, State::Done) => {
                pair.with(Side::Remote, State::MustClose)
            }
            _ => pair,
        };

        if pair == start {
            return pair;
        }
    }
}

pub struct ConnectionState {
    pub keep_alive: bool,
    pub pending_upgrade: bool,
    pair: StatePair,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionState {
    pub fn new() -> Self {
        ConnectionState {
            keep_alive: true,
            pending_upgrade: false,
            pair: StatePair::IDLE,
        }
    }

    pub fn states(&self) -> StatePair {
        self.pair
    }

    pub fn get(&self, side: Side) -> State {
        self.pair.get(side)
    }

    pub fn process_error(&mut self, side: Side) {
        self.pair = self.pair.with(side, State::Error);
        self.settle();
    }

    pub fn process_keep_alive_disabled(&mut self) {
        self.keep_alive = false;
        self.settle();
    }

    pub fn process_upgrade_proposal(&mut self) {
        self.pending_upgrade = true;
        self.settle();
    }

    pub fn process_event(&mut self, side: Side, event_type: EventType) -> Result<(), ProtocolError> {
        if event_type == EventType::InformationalResponseSwitchUpgrade {
            if !self.pending_upgrade {
                return Err(ProtocolError::LocalProtocolError(
                    "Sent 101 Switching Protocols without a pending Upgrade proposal".into(),
                ));
            }
            if self.pair.remote != State::Done {
                return Err(ProtocolError::LocalProtocolError(
                    "Can't switch protocols before the request body is complete".into(),
                ));
            }
        }
        self.pair = transition(self.pair, side, event_type)?;
        if event_type == EventType::NormalResponse {
            // Answering with a final response declines any upgrade.
            self.pending_upgrade = false;
        }
        self.settle();
        Ok(())
    }

    fn settle(&mut self) {
        self.pair = settle(self.pair, self.keep_alive, self.pending_upgrade);
    }

    pub fn start_next_cycle(&mut self) -> Result<(), ProtocolError> {
        if !self.pair.is_reusable() {
            return Err(ProtocolError::LocalProtocolError(
                format!("Not in a reusable state: {}", self.pair).into(),
            ));
        }
        debug_assert!(self.keep_alive);
        self.pending_upgrade = false;
        self.pair = StatePair::IDLE;
        Ok(())
    }
}
