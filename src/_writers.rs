use crate::{
    _events::{Event, Response},
    _headers::Headers,
    _util::ProtocolError,
};

fn write_headers(headers: &Headers, out: &mut Vec<u8>) {
    for (raw_name, _, value) in headers.raw_items() {
        out.extend_from_slice(raw_name);
        out.extend_from_slice(b": ");
        out.extend_from_slice(value);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
}

/// Status line plus header block.
pub fn write_response(response: &Response) -> Result<Vec<u8>, ProtocolError> {
    if response.http_version != b"1.1" {
        return Err(ProtocolError::LocalProtocolError(
            "I only send HTTP/1.1".into(),
        ));
    }
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(b"HTTP/1.1 ");
    out.extend_from_slice(response.status_code.to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(&response.reason);
    out.extend_from_slice(b"\r\n");
    write_headers(&response.headers, &mut out);
    Ok(out)
}

/// Frames body events for the current outgoing message.
pub trait BodyWriter: Send {
    fn call(&mut self, event: &Event) -> Result<Vec<u8>, ProtocolError> {
        match event {
            Event::Data(data) => self.send_data(&data.data),
            Event::EndOfMessage(eom) => self.send_eom(&eom.headers),
            other => Err(ProtocolError::LocalProtocolError(
                format!("can't frame {:?} as body", other).into(),
            )),
        }
    }

    fn send_data(&mut self, data: &[u8]) -> Result<Vec<u8>, ProtocolError>;
    fn send_eom(&mut self, trailers: &Headers) -> Result<Vec<u8>, ProtocolError>;
}

/// The only framing this server produces: exactly `remaining` more bytes.
pub struct ContentLengthWriter {
    remaining: u64,
}

impl ContentLengthWriter {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }
}

impl BodyWriter for ContentLengthWriter {
    fn send_data(&mut self, data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let len = data.len() as u64;
        if len > self.remaining {
            return Err(ProtocolError::LocalProtocolError(
                "Too much data for declared Content-Length".into(),
            ));
        }
        self.remaining -= len;
        Ok(data.to_vec())
    }

    fn send_eom(&mut self, trailers: &Headers) -> Result<Vec<u8>, ProtocolError> {
        if self.remaining != 0 {
            return Err(ProtocolError::LocalProtocolError(
                "Too little data for declared Content-Length".into(),
            ));
        }
        if !trailers.is_empty() {
            return Err(ProtocolError::LocalProtocolError(
                "Content-Length and trailers don't mix".into(),
            ));
        }
        Ok(Vec::new())
    }
}
