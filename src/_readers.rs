use crate::{
    _abnf::{CHUNK_HEADER, HEADER_FIELD, KNOWN_METHODS, REQUEST_LINE},
    _events::{ConnectionClosed, Data, EndOfMessage, Event, Request},
    _headers::normalize_and_validate,
    _receivebuffer::ReceiveBuffer,
    _util::ProtocolError,
};
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    static ref HEADER_FIELD_RE: Regex = Regex::new(&format!(r"^{}$", *HEADER_FIELD)).unwrap();
    static ref OBS_FOLD_RE: Regex = Regex::new(r"^[ \t]+").unwrap();
    static ref REQUEST_LINE_RE: Regex = Regex::new(&REQUEST_LINE).unwrap();
    static ref CHUNK_HEADER_RE: Regex = Regex::new(&CHUNK_HEADER).unwrap();
}

/// Joins obsolete folded continuation lines onto the line before them.
fn obsolete_line_fold(lines: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, ProtocolError> {
    let mut out: Vec<Vec<u8>> = vec![];
    for line in lines {
        match OBS_FOLD_RE.find(&line) {
            Some(fold) => match out.last_mut() {
                Some(last) => {
                    last.push(b' ');
                    last.extend_from_slice(&line[fold.end()..]);
                }
                None => {
                    return Err(ProtocolError::LocalProtocolError(
                        "continuation line at start of headers".into(),
                    ))
                }
            },
            None => out.push(line),
        }
    }
    Ok(out)
}

fn decode_header_lines(lines: Vec<Vec<u8>>) -> Result<Vec<(Vec<u8>, Vec<u8>)>, ProtocolError> {
    let mut out = vec![];
    for line in obsolete_line_fold(lines)? {
        let matches = HEADER_FIELD_RE.captures(&line).ok_or_else(|| {
            ProtocolError::LocalProtocolError(
                format!("illegal header line {:?}", String::from_utf8_lossy(&line)).into(),
            )
        })?;
        out.push((
            matches["field_name"].to_vec(),
            matches["field_value"].to_vec(),
        ));
    }
    Ok(out)
}

/// One step of incremental decoding. `Ok(None)` means more bytes are needed.
pub trait Reader {
    fn call(&mut self, buf: &mut ReceiveBuffer) -> Result<Option<Event>, ProtocolError>;

    /// What the peer closing the connection means at this point.
    fn read_eof(&self) -> Result<Event, ProtocolError> {
        Ok(ConnectionClosed::default().into())
    }
}

/// Waits for a request line and header block while the remote side is idle.
#[derive(Clone, Default)]
pub struct RequestHeadReader {}

impl Reader for RequestHeadReader {
    fn call(&mut self, buf: &mut ReceiveBuffer) -> Result<Option<Event>, ProtocolError> {
        let lines = match buf.maybe_extract_lines() {
            Some(lines) => lines,
            None => {
                if buf.is_next_line_obviously_invalid_request_line() {
                    return Err(ProtocolError::LocalProtocolError(
                        "illegal request line".into(),
                    ));
                }
                return Ok(None);
            }
        };
        let (request_line, header_lines) = match lines.split_first() {
            Some(split) => split,
            None => {
                return Err(ProtocolError::LocalProtocolError(
                    "no request line received".into(),
                ))
            }
        };
        let matches = REQUEST_LINE_RE.captures(request_line).ok_or_else(|| {
            ProtocolError::LocalProtocolError(
                format!(
                    "illegal request line {:?}",
                    String::from_utf8_lossy(request_line)
                )
                .into(),
            )
        })?;

        let method = matches["method"].to_vec();
        if !KNOWN_METHODS.contains(&method.as_slice()) {
            return Err(ProtocolError::LocalProtocolError(
                (
                    format!("unrecognized method {:?}", String::from_utf8_lossy(&method)),
                    405,
                )
                    .into(),
            ));
        }
        if method == b"CONNECT" {
            return Err(ProtocolError::LocalProtocolError(
                "unexpected upgrade attempt: CONNECT is not supported".into(),
            ));
        }

        let headers = normalize_and_validate(decode_header_lines(header_lines.to_vec())?, true)?;

        Ok(Some(
            Request::new(
                method,
                headers,
                matches["target"].to_vec(),
                matches["http_version"].to_vec(),
            )?
            .into(),
        ))
    }
}

#[derive(Clone)]
pub struct ContentLengthReader {
    length: usize,
    remaining: usize,
}

impl ContentLengthReader {
    pub fn new(length: usize) -> Self {
        Self {
            length,
            remaining: length,
        }
    }
}

impl Reader for ContentLengthReader {
    fn call(&mut self, buf: &mut ReceiveBuffer) -> Result<Option<Event>, ProtocolError> {
        if self.remaining == 0 {
            return Ok(Some(EndOfMessage::default().into()));
        }
        Ok(buf.maybe_extract_at_most(self.remaining).map(|data| {
            self.remaining -= data.len();
            Data::new(data).into()
        }))
    }

    fn read_eof(&self) -> Result<Event, ProtocolError> {
        Err(ProtocolError::RemoteProtocolError(
            format!(
                "peer closed connection without sending complete message body \
                 (received {} bytes, expected {})",
                self.length - self.remaining,
                self.length
            )
            .into(),
        ))
    }
}

#[derive(Clone, Default)]
pub struct ChunkedReader {
    bytes_in_chunk: usize,
    bytes_to_discard: usize,
    reading_trailer: bool,
}

impl ChunkedReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_chunk_size(line: &[u8]) -> Result<usize, ProtocolError> {
        let illegal = || {
            ProtocolError::LocalProtocolError(
                format!("illegal chunk header: {:?}", String::from_utf8_lossy(line)).into(),
            )
        };
        let matches = CHUNK_HEADER_RE.captures(line).ok_or_else(illegal)?;
        let digits = std::str::from_utf8(&matches["chunk_size"]).map_err(|_| illegal())?;
        usize::from_str_radix(digits, 16).map_err(|_| illegal())
    }
}

impl Reader for ChunkedReader {
    fn call(&mut self, buf: &mut ReceiveBuffer) -> Result<Option<Event>, ProtocolError> {
        if self.reading_trailer {
            return match buf.maybe_extract_lines() {
                Some(lines) => Ok(Some(
                    EndOfMessage {
                        headers: normalize_and_validate(decode_header_lines(lines)?, true)?,
                    }
                    .into(),
                )),
                None => Ok(None),
            };
        }
        // the CRLF that closes the previous chunk
        if self.bytes_to_discard > 0 {
            match buf.maybe_extract_at_most(self.bytes_to_discard) {
                Some(discarded) => self.bytes_to_discard -= discarded.len(),
                None => return Ok(None),
            }
            if self.bytes_to_discard > 0 {
                return Ok(None);
            }
        }
        let chunk_start = if self.bytes_in_chunk == 0 {
            let chunk_header = match buf.maybe_extract_next_line() {
                Some(line) => line,
                None => return Ok(None),
            };
            self.bytes_in_chunk = Self::parse_chunk_size(&chunk_header)?;
            if self.bytes_in_chunk == 0 {
                self.reading_trailer = true;
                return self.call(buf);
            }
            true
        } else {
            false
        };

        Ok(buf.maybe_extract_at_most(self.bytes_in_chunk).map(|data| {
            self.bytes_in_chunk -= data.len();
            let chunk_end = self.bytes_in_chunk == 0;
            if chunk_end {
                self.bytes_to_discard = 2;
            }
            Data {
                data,
                chunk_start,
                chunk_end,
            }
            .into()
        }))
    }

    fn read_eof(&self) -> Result<Event, ProtocolError> {
        Err(ProtocolError::RemoteProtocolError(
            "peer closed connection without sending complete message body \
             (incomplete chunked read)"
                .into(),
        ))
    }
}

/// Installed once the remote has nothing more to say this cycle. Any byte that
/// shows up is a protocol violation.
#[derive(Clone, Default)]
pub struct ClosedReader {}

impl Reader for ClosedReader {
    fn call(&mut self, buf: &mut ReceiveBuffer) -> Result<Option<Event>, ProtocolError> {
        if !buf.is_empty() {
            return Err(ProtocolError::LocalProtocolError("unexpected data".into()));
        }
        Ok(None)
    }
}
