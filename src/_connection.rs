use crate::_events::*;
use crate::_headers::*;
use crate::_readers::*;
use crate::_receivebuffer::*;
use crate::_state::*;
use crate::_util::*;
use crate::_writers::*;

pub static DEFAULT_MAX_INCOMPLETE_EVENT_SIZE: usize = 16 * 1024;

/// Whether the peer is willing to reuse the connection after this message.
fn keep_alive(headers: &Headers, http_version: &[u8]) -> bool {
    if get_comma_header(headers, b"connection").contains(&b"close".to_vec()) {
        return false;
    }
    http_version >= b"1.1".as_slice()
}

/// Statuses whose responses never carry a body, whatever the headers say.
pub(crate) fn status_forbids_body(status_code: u16) -> bool {
    status_code < 200 || status_code == 204 || status_code == 304
}

/// Picks the body reader for an incoming request. Requests without framing
/// headers have an empty body.
fn request_body_reader(request: &Request) -> Result<Box<dyn Reader + Send>, ProtocolError> {
    if !get_comma_header(&request.headers, b"transfer-encoding").is_empty() {
        return Ok(Box::new(ChunkedReader::new()));
    }
    match request.headers.get(b"content-length") {
        Some(length) => {
            let length = std::str::from_utf8(length)
                .ok()
                .and_then(|length| length.parse::<usize>().ok())
                .ok_or_else(|| ProtocolError::LocalProtocolError("bad Content-Length".into()))?;
            Ok(Box::new(ContentLengthReader::new(length)))
        }
        None => Ok(Box::new(ContentLengthReader::new(0))),
    }
}

/// Server side of one HTTP/1.1 connection, without any I/O.
///
/// Bytes from the peer go in through [`Connection::receive_data`] and come
/// out as events from [`Connection::next_event`]; outgoing events go in
/// through [`Connection::send`] and come out as bytes for the caller to
/// write. Every event in either direction is checked against the state
/// machine first.
pub struct Connection {
    cstate: ConnectionState,
    writer: Option<Box<dyn BodyWriter>>,
    reader: Box<dyn Reader + Send>,
    pending_reader: Option<Box<dyn Reader + Send>>,
    max_incomplete_event_size: usize,
    receive_buffer: ReceiveBuffer,
    receive_buffer_closed: bool,
    their_http_version: Option<Vec<u8>>,
    request_method: Option<Vec<u8>>,
    client_is_waiting_for_100_continue: bool,
    identity_headers: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Connection {
    pub fn new(max_incomplete_event_size: Option<usize>) -> Self {
        Self {
            cstate: ConnectionState::new(),
            writer: None,
            reader: Box::new(RequestHeadReader::default()),
            pending_reader: None,
            max_incomplete_event_size: max_incomplete_event_size
                .unwrap_or(DEFAULT_MAX_INCOMPLETE_EVENT_SIZE),
            receive_buffer: ReceiveBuffer::new(),
            receive_buffer_closed: false,
            their_http_version: None,
            request_method: None,
            client_is_waiting_for_100_continue: false,
            identity_headers: Vec::new(),
        }
    }

    pub fn states(&self) -> StatePair {
        self.cstate.states()
    }

    pub fn our_state(&self) -> State {
        self.cstate.get(Side::Local)
    }

    pub fn their_state(&self) -> State {
        self.cstate.get(Side::Remote)
    }

    pub fn their_http_version(&self) -> Option<&[u8]> {
        self.their_http_version.as_deref()
    }

    pub fn request_method(&self) -> Option<&[u8]> {
        self.request_method.as_deref()
    }

    pub fn keep_alive(&self) -> bool {
        self.cstate.keep_alive
    }

    /// The client sent `Expect: 100-continue` and we have neither answered
    /// nor seen any of its body yet.
    pub fn they_are_waiting_for_100_continue(&self) -> bool {
        self.client_is_waiting_for_100_continue
    }

    /// Headers added to every outgoing response that doesn't set them itself,
    /// typically `Date` and `Server`.
    pub fn set_identity_headers(&mut self, headers: Vec<(Vec<u8>, Vec<u8>)>) {
        self.identity_headers = headers;
    }

    pub fn start_next_cycle(&mut self) -> Result<(), ProtocolError> {
        self.cstate.start_next_cycle()?;
        self.request_method = None;
        self.their_http_version = None;
        self.client_is_waiting_for_100_continue = false;
        self.reader = Box::new(RequestHeadReader::default());
        self.pending_reader = None;
        self.writer = None;
        Ok(())
    }

    /// Unconsumed bytes and whether the peer has closed its side.
    pub fn trailing_data(&self) -> (&[u8], bool) {
        (self.receive_buffer.bytes(), self.receive_buffer_closed)
    }

    /// Feeds bytes read from the peer. An empty slice means end of stream.
    pub fn receive_data(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if data.is_empty() {
            self.receive_buffer_closed = true;
            return Ok(());
        }
        if self.receive_buffer_closed {
            return Err(ProtocolError::LocalProtocolError(
                "received close, then received more data?".into(),
            ));
        }
        self.receive_buffer.add(data);
        Ok(())
    }

    fn process_error(&mut self, side: Side) {
        let before = self.states();
        self.cstate.process_error(side);
        self.respond_to_state_changes(before);
    }

    fn process_event(&mut self, side: Side, event: &Event) -> Result<(), ProtocolError> {
        let before = self.states();
        let mut event_type = EventType::from(event);

        if let (Side::Remote, Event::Request(request)) = (side, event) {
            self.pending_reader = Some(request_body_reader(request)?);
            if !get_comma_header(&request.headers, b"upgrade").is_empty() {
                self.cstate.process_upgrade_proposal();
            }
        }
        if let (Side::Local, Event::InformationalResponse(response)) = (side, event) {
            if response.status_code == 101 {
                event_type = EventType::InformationalResponseSwitchUpgrade;
            }
        }

        self.cstate.process_event(side, event_type)?;

        match event {
            Event::Request(request) => {
                self.request_method = Some(request.method.clone());
                self.their_http_version = Some(request.http_version.clone());
                if !keep_alive(&request.headers, &request.http_version) {
                    self.cstate.process_keep_alive_disabled();
                }
                if has_expect_100_continue(request) {
                    self.client_is_waiting_for_100_continue = true;
                }
            }
            Event::NormalResponse(response) => {
                self.client_is_waiting_for_100_continue = false;
                if !keep_alive(&response.headers, &response.http_version) {
                    self.cstate.process_keep_alive_disabled();
                }
            }
            Event::InformationalResponse(_) => self.client_is_waiting_for_100_continue = false,
            Event::Data(_) | Event::EndOfMessage(_) if side == Side::Remote => {
                self.client_is_waiting_for_100_continue = false
            }
            _ => {}
        }

        if let Event::NormalResponse(response) = event {
            self.install_writer(response)?;
        }
        self.respond_to_state_changes(before);
        Ok(())
    }

    fn install_writer(&mut self, response: &Response) -> Result<(), ProtocolError> {
        if self.our_state() != State::SendingBody {
            return Ok(());
        }
        let length = if status_forbids_body(response.status_code)
            || self.request_method.as_deref() == Some(b"HEAD".as_slice())
        {
            0
        } else {
            match response.headers.get(b"content-length") {
                Some(length) => std::str::from_utf8(length)
                    .ok()
                    .and_then(|length| length.parse::<u64>().ok())
                    .ok_or_else(|| {
                        ProtocolError::LocalProtocolError("bad Content-Length".into())
                    })?,
                None => 0,
            }
        };
        self.writer = Some(Box::new(ContentLengthWriter::new(length)));
        Ok(())
    }

    fn respond_to_state_changes(&mut self, before: StatePair) {
        let after = self.states();
        if after.local != before.local && after.local != State::SendingBody {
            self.writer = None;
        }
        if after.remote != before.remote {
            self.reader = match after.remote {
                State::Idle => Box::new(RequestHeadReader::default()),
                State::SendingBody => match self.pending_reader.take() {
                    Some(reader) => reader,
                    None => Box::new(ContentLengthReader::new(0)),
                },
                _ => Box::new(ClosedReader::default()),
            };
        }
    }

    fn extract_next_receive_event(&mut self) -> Result<Event, ProtocolError> {
        let state = self.their_state();
        if state == State::Done && !self.receive_buffer.is_empty() {
            return Ok(Event::Paused());
        }
        if state == State::SwitchedProtocol {
            return Ok(Event::Paused());
        }
        match self.reader.call(&mut self.receive_buffer)? {
            Some(event) => Ok(event),
            None if self.receive_buffer.is_empty() && self.receive_buffer_closed => {
                self.reader.read_eof()
            }
            None => Ok(Event::NeedData()),
        }
    }

    fn next_event_inner(&mut self) -> Result<Event, ProtocolError> {
        let event = self.extract_next_receive_event()?;
        match event {
            Event::NeedData() => {
                if self.receive_buffer.len() > self.max_incomplete_event_size {
                    return Err(ProtocolError::RemoteProtocolError(
                        ("Receive buffer too long", 431).into(),
                    ));
                }
                if self.receive_buffer_closed {
                    return Err(ProtocolError::RemoteProtocolError(
                        "peer unexpectedly closed connection".into(),
                    ));
                }
            }
            Event::Paused() => {}
            _ => self.process_event(Side::Remote, &event)?,
        }
        Ok(event)
    }

    /// Decodes the next event from buffered bytes. `NeedData` asks for more
    /// input; `Paused` means the peer's next message must wait for
    /// [`Connection::start_next_cycle`]. Any error is fatal to the remote side.
    pub fn next_event(&mut self) -> Result<Event, ProtocolError> {
        if self.their_state() == State::Error {
            return Err(ProtocolError::RemoteProtocolError(
                "Can't receive data when peer state is ERROR".into(),
            ));
        }
        self.next_event_inner().map_err(|error| {
            self.process_error(Side::Remote);
            match error {
                ProtocolError::LocalProtocolError(error) => error.into_remote().into(),
                remote => remote,
            }
        })
    }

    fn encode(&mut self, event: &Event) -> Result<Vec<u8>, ProtocolError> {
        match event {
            Event::NormalResponse(response) | Event::InformationalResponse(response) => {
                match self.our_state() {
                    State::Idle | State::SendingHeaders => write_response(response),
                    state => Err(ProtocolError::LocalProtocolError(
                        format!("Can't send a response when our state is {:?}", state).into(),
                    )),
                }
            }
            Event::Data(_) | Event::EndOfMessage(_) => match self.writer.as_mut() {
                Some(writer) => writer.call(event),
                None => Err(ProtocolError::LocalProtocolError(
                    format!(
                        "Can't send body events when our state is {:?}",
                        self.our_state()
                    )
                    .into(),
                )),
            },
            Event::ConnectionClosed(_) => Ok(Vec::new()),
            other => Err(ProtocolError::LocalProtocolError(
                format!("Servers can't send {:?}", other).into(),
            )),
        }
    }

    fn send_inner(&mut self, event: Event) -> Result<Vec<u8>, ProtocolError> {
        let event = match event {
            Event::NormalResponse(response) => {
                Event::NormalResponse(self.clean_up_response_headers_for_sending(response)?)
            }
            Event::InformationalResponse(response) => {
                Event::InformationalResponse(self.add_identity_headers(response)?)
            }
            other => other,
        };
        let data = self.encode(&event)?;
        self.process_event(Side::Local, &event)?;
        Ok(data)
    }

    /// Converts one outgoing event into bytes. Any failure leaves our side in
    /// `Error`, after which the connection can only be closed.
    pub fn send(&mut self, event: Event) -> Result<Vec<u8>, ProtocolError> {
        if self.our_state() == State::Error {
            return Err(ProtocolError::LocalProtocolError(
                "Can't send data when our state is ERROR".into(),
            ));
        }
        self.send_inner(event).map_err(|error| {
            self.process_error(Side::Local);
            error
        })
    }

    /// Sends a whole response with a fully buffered body. A missing
    /// `Content-Length` is computed from `body`; the body is dropped for HEAD
    /// requests and for statuses that forbid one.
    pub fn send_response(&mut self, response: Response, body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        if response.status_code < 200 {
            return self.send(response.into());
        }
        let mut response = response;
        let forbids_body = status_forbids_body(response.status_code);
        if !forbids_body && !response.headers.contains(b"content-length") {
            response.headers = set_comma_header(
                &response.headers,
                b"content-length",
                vec![body.len().to_string().into_bytes()],
            )
            .map_err(|error| {
                self.process_error(Side::Local);
                error
            })?;
        }
        let is_head = self.request_method.as_deref() == Some(b"HEAD".as_slice());

        let mut out = self.send(response.into())?;
        if !forbids_body && !is_head && !body.is_empty() {
            out.extend(self.send(Data::new(body.to_vec()).into())?);
        }
        out.extend(self.send(EndOfMessage::default().into())?);
        Ok(out)
    }

    /// No further cycle will be served; the next response says so with
    /// `Connection: close`.
    pub fn disable_keep_alive(&mut self) {
        let before = self.states();
        self.cstate.process_keep_alive_disabled();
        self.respond_to_state_changes(before);
    }

    /// The transport failed while writing bytes we produced; the peer's view
    /// of the conversation is now unknown.
    pub fn send_failed(&mut self) {
        self.process_error(Side::Local);
    }

    fn add_identity_headers(&self, response: Response) -> Result<Response, ProtocolError> {
        if self.identity_headers.is_empty() {
            return Ok(response);
        }
        let mut merged: Vec<(Vec<u8>, Vec<u8>)> = self
            .identity_headers
            .iter()
            .filter(|(name, _)| !response.headers.contains(name))
            .cloned()
            .collect();
        merged.extend(
            response
                .headers
                .raw_items()
                .map(|(raw_name, _, value)| (raw_name.clone(), value.clone())),
        );
        Ok(Response {
            headers: normalize_and_validate(merged, false)?,
            ..response
        })
    }

    fn clean_up_response_headers_for_sending(
        &self,
        response: Response,
    ) -> Result<Response, ProtocolError> {
        let mut response = self.add_identity_headers(response)?;
        if !get_comma_header(&response.headers, b"transfer-encoding").is_empty() {
            return Err(ProtocolError::LocalProtocolError(
                "Only Content-Length framing is supported when sending".into(),
            ));
        }
        if !status_forbids_body(response.status_code)
            && !response.headers.contains(b"content-length")
        {
            response.headers =
                set_comma_header(&response.headers, b"content-length", vec![b"0".to_vec()])?;
        }
        if !self.cstate.keep_alive {
            let mut connection = get_comma_header(&response.headers, b"connection");
            connection.retain(|token| token != b"keep-alive" && token != b"close");
            connection.push(b"close".to_vec());
            response.headers = set_comma_header(&response.headers, b"connection", connection)?;
        }
        Ok(response)
    }
}
