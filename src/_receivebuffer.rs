use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::cmp::min;

lazy_static! {
    // Tolerates bare-LF line endings from sloppy clients.
    static ref BLANK_LINE_RE: Regex = Regex::new(r"\n\r?\n").unwrap();
}

/// Bytes received from the peer that no reader has consumed yet.
///
/// The two search cursors remember how far a previous unsuccessful scan got,
/// so a header block trickling in one byte per read is scanned in linear
/// rather than quadratic time. Any extraction resets them.
#[derive(Debug, Default)]
pub struct ReceiveBuffer {
    data: Vec<u8>,
    next_line_search: usize,
    blank_line_search: usize,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn extract(&mut self, count: usize) -> Vec<u8> {
        let out = self.data.drain(..min(count, self.data.len())).collect();
        self.next_line_search = 0;
        self.blank_line_search = 0;
        out
    }

    pub fn maybe_extract_at_most(&mut self, count: usize) -> Option<Vec<u8>> {
        if count == 0 || self.data.is_empty() {
            return None;
        }
        Some(self.extract(count))
    }

    /// Next line including its CRLF terminator.
    pub fn maybe_extract_next_line(&mut self) -> Option<Vec<u8>> {
        // back up one byte in case the previous scan stopped between CR and LF
        let start = self.next_line_search.saturating_sub(1);
        let found = self.data[start..]
            .windows(2)
            .position(|window| window == b"\r\n");
        match found {
            Some(idx) => Some(self.extract(start + idx + 2)),
            None => {
                self.next_line_search = self.data.len();
                None
            }
        }
    }

    /// A complete header block (everything up to a blank line), split into
    /// lines with their terminators removed. A leading blank line yields an
    /// empty block.
    pub fn maybe_extract_lines(&mut self) -> Option<Vec<Vec<u8>>> {
        if self.data.starts_with(b"\n") {
            self.extract(1);
            return Some(vec![]);
        }
        if self.data.starts_with(b"\r\n") {
            self.extract(2);
            return Some(vec![]);
        }
        let end = match BLANK_LINE_RE.find(&self.data[self.blank_line_search..]) {
            Some(found) => self.blank_line_search + found.end(),
            None => {
                self.blank_line_search = self.data.len().saturating_sub(2);
                return None;
            }
        };
        let block = self.extract(end);
        let mut lines: Vec<Vec<u8>> = block
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
            .collect();
        // the blank line and the empty remainder after the final LF
        lines.truncate(lines.len().saturating_sub(2));
        Some(lines)
    }

    /// Request lines never start with whitespace or control bytes, so there is
    /// no point waiting for the rest of one that does.
    pub fn is_next_line_obviously_invalid_request_line(&self) -> bool {
        matches!(self.data.first(), Some(&first) if first < 0x21)
    }
}

impl From<Vec<u8>> for ReceiveBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }
}
