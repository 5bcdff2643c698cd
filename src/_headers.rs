use crate::{
    _abnf::{FIELD_NAME, FIELD_VALUE},
    _events::Request,
    _util::ProtocolError,
};
use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    static ref CONTENT_LENGTH_RE: Regex = Regex::new(r"^[0-9]+$").unwrap();
    static ref FIELD_NAME_RE: Regex = Regex::new(&format!(r"^{}$", FIELD_NAME)).unwrap();
    static ref FIELD_VALUE_RE: Regex = Regex::new(&format!(r"^{}$", *FIELD_VALUE)).unwrap();
}

/// Header list that remembers both the name as it was written and its
/// lowercased form, in original order. Lookups go through the lowercased name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Headers(Vec<(Vec<u8>, Vec<u8>, Vec<u8>)>);

impl Headers {
    /// `(lowercased name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        self.0
            .iter()
            .map(|(_, name, value)| (name.as_slice(), value.as_slice()))
    }

    pub fn raw_items(&self) -> impl Iterator<Item = &(Vec<u8>, Vec<u8>, Vec<u8>)> + '_ {
        self.0.iter()
    }

    /// First value for `name`, which is matched case-insensitively.
    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        let name = name.to_ascii_lowercase();
        self.iter()
            .find(|(found, _)| *found == name.as_slice())
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &[u8]) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(Vec<u8>, Vec<u8>)>> for Headers {
    /// Builds headers without validation. Use [`normalize_and_validate`] for
    /// anything that came off the wire.
    fn from(headers: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Headers(
            headers
                .into_iter()
                .map(|(name, value)| {
                    let lowered = name.to_ascii_lowercase();
                    (name, lowered, value)
                })
                .collect(),
        )
    }
}

pub(crate) fn trim_ows(value: &[u8]) -> &[u8] {
    let start = value
        .iter()
        .position(|b| *b != b' ' && *b != b'\t')
        .unwrap_or(value.len());
    let end = value
        .iter()
        .rposition(|b| *b != b' ' && *b != b'\t')
        .map_or(start, |idx| idx + 1);
    &value[start..end]
}

/// Lowercases names, validates them (unless `parsed`, in which case the
/// reader's regex already did), and enforces the framing rules: a single
/// consistent Content-Length, at most one Transfer-Encoding which must be
/// `chunked`.
pub fn normalize_and_validate(
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    parsed: bool,
) -> Result<Headers, ProtocolError> {
    let mut new_headers = vec![];
    let mut seen_content_length: Option<Vec<u8>> = None;
    let mut saw_transfer_encoding = false;
    for (raw_name, value) in headers {
        if !parsed {
            if !FIELD_NAME_RE.is_match(&raw_name) {
                return Err(ProtocolError::LocalProtocolError(
                    format!("Illegal header name {:?}", String::from_utf8_lossy(&raw_name)).into(),
                ));
            }
            if !FIELD_VALUE_RE.is_match(&value) {
                return Err(ProtocolError::LocalProtocolError(
                    format!("Illegal header value {:?}", String::from_utf8_lossy(&value)).into(),
                ));
            }
        }
        let name = raw_name.to_ascii_lowercase();
        match name.as_slice() {
            b"content-length" => {
                let lengths: Vec<&[u8]> = value.split(|&b| b == b',').map(trim_ows).collect();
                let length = match lengths.as_slice() {
                    [only] => only.to_vec(),
                    _ => {
                        return Err(ProtocolError::LocalProtocolError(
                            "conflicting Content-Length headers".into(),
                        ))
                    }
                };
                if !CONTENT_LENGTH_RE.is_match(&length) {
                    return Err(ProtocolError::LocalProtocolError("bad Content-Length".into()));
                }
                if let Some(seen) = &seen_content_length {
                    if *seen != length {
                        return Err(ProtocolError::LocalProtocolError(
                            "conflicting Content-Length headers".into(),
                        ));
                    }
                } else {
                    seen_content_length = Some(length.clone());
                    new_headers.push((raw_name, name, length));
                }
            }
            b"transfer-encoding" => {
                // "A server that receives a request message with a transfer coding
                // it does not understand SHOULD respond with 501 (Not
                // Implemented)."
                // https://tools.ietf.org/html/rfc7230#section-3.3.1
                if saw_transfer_encoding {
                    return Err(ProtocolError::LocalProtocolError(
                        ("multiple Transfer-Encoding headers", 501).into(),
                    ));
                }
                // "All transfer-coding names are case-insensitive"
                // -- https://tools.ietf.org/html/rfc7230#section-4
                let value = trim_ows(&value).to_ascii_lowercase();
                if value != b"chunked" {
                    return Err(ProtocolError::LocalProtocolError(
                        ("Only Transfer-Encoding: chunked is supported", 501).into(),
                    ));
                }
                saw_transfer_encoding = true;
                new_headers.push((raw_name, name, value));
            }
            _ => new_headers.push((raw_name, name, value)),
        }
    }

    Ok(Headers(new_headers))
}

/// Splits every `name` header on commas, trimmed and lowercased, dropping empty
/// members. `name` must already be lowercase.
pub fn get_comma_header(headers: &Headers, name: &[u8]) -> Vec<Vec<u8>> {
    let mut out = vec![];
    for (found_name, found_value) in headers.iter() {
        if found_name != name {
            continue;
        }
        for member in found_value.split(|&b| b == b',') {
            let member = trim_ows(member);
            if !member.is_empty() {
                out.push(member.to_ascii_lowercase());
            }
        }
    }
    out
}

/// Replaces every `name` header with one header per entry of `new_values`,
/// keeping the original spelling of the first replaced name if there was one.
pub fn set_comma_header(
    headers: &Headers,
    name: &[u8],
    new_values: Vec<Vec<u8>>,
) -> Result<Headers, ProtocolError> {
    let mut spelled = None;
    let mut new_headers = vec![];
    for (raw_name, found_name, found_value) in headers.raw_items() {
        if found_name.as_slice() == name {
            spelled.get_or_insert_with(|| raw_name.clone());
        } else {
            new_headers.push((raw_name.clone(), found_value.clone()));
        }
    }
    let spelled = spelled.unwrap_or_else(|| title_case(name));
    for new_value in new_values {
        new_headers.push((spelled.clone(), new_value));
    }
    normalize_and_validate(new_headers, false)
}

fn title_case(name: &[u8]) -> Vec<u8> {
    let mut upper_next = true;
    name.iter()
        .map(|&b| {
            let out = if upper_next { b.to_ascii_uppercase() } else { b };
            upper_next = b == b'-';
            out
        })
        .collect()
}

pub fn has_expect_100_continue(request: &Request) -> bool {
    // https://tools.ietf.org/html/rfc7231#section-5.1.1
    // "A server that receives a 100-continue expectation in an HTTP/1.0 request
    // MUST ignore that expectation."
    if request.http_version.as_slice() < b"1.1".as_slice() {
        return false;
    }
    get_comma_header(&request.headers, b"expect").contains(&b"100-continue".to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(Vec<u8>, Vec<u8>)> {
        items
            .iter()
            .map(|(n, v)| (n.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_normalize_and_validate() {
        let headers = normalize_and_validate(pairs(&[("Foo", "bar")]), false).unwrap();
        assert_eq!(headers.get(b"foo"), Some(b"bar".as_slice()));
        assert_eq!(headers.get(b"FOO"), Some(b"bar".as_slice()));

        // no leading/trailing whitespace in names
        assert!(normalize_and_validate(pairs(&[("foo ", "bar")]), false).is_err());
        assert!(normalize_and_validate(pairs(&[(" foo", "bar")]), false).is_err());
        // no weird characters in values
        assert!(normalize_and_validate(pairs(&[("foo", "bar\x00")]), false).is_err());

        let headers =
            normalize_and_validate(pairs(&[("Content-Length", "1"), ("content-length", "1")]), false)
                .unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get(b"content-length"), Some(b"1".as_slice()));

        assert!(normalize_and_validate(pairs(&[("Content-Length", "asdf")]), false).is_err());
        assert!(normalize_and_validate(pairs(&[("Content-Length", "1x")]), false).is_err());
        assert!(
            normalize_and_validate(pairs(&[("Content-Length", "1"), ("Content-Length", "2")]), false)
                .is_err()
        );
        assert!(normalize_and_validate(pairs(&[("Content-Length", "1 , 1")]), false).is_err());

        let headers =
            normalize_and_validate(pairs(&[("Transfer-Encoding", "CHUNKED")]), false).unwrap();
        assert_eq!(headers.get(b"transfer-encoding"), Some(b"chunked".as_slice()));

        let error = normalize_and_validate(pairs(&[("Transfer-Encoding", "gzip")]), false)
            .unwrap_err();
        assert_eq!(error.code(), 501);
        let error = normalize_and_validate(
            pairs(&[("Transfer-Encoding", "chunked"), ("Transfer-Encoding", "chunked")]),
            false,
        )
        .unwrap_err();
        assert_eq!(error.code(), 501);
    }

    #[test]
    fn test_get_set_comma_header() {
        let headers = normalize_and_validate(
            pairs(&[
                ("Connection", "close"),
                ("whatever", "something"),
                ("connection", "fOo,, , BAR"),
            ]),
            false,
        )
        .unwrap();

        assert_eq!(
            get_comma_header(&headers, b"connection"),
            vec![b"close".to_vec(), b"foo".to_vec(), b"bar".to_vec()]
        );

        let headers =
            set_comma_header(&headers, b"newthing", vec![b"a".to_vec(), b"b".to_vec()]).unwrap();
        assert!(headers.raw_items().any(|(raw, _, _)| raw == b"Newthing"));

        let headers = set_comma_header(&headers, b"connection", vec![b"close".to_vec()]).unwrap();
        assert_eq!(get_comma_header(&headers, b"connection"), vec![b"close".to_vec()]);
        assert!(headers.raw_items().any(|(raw, _, _)| raw == b"Connection"));
        assert_eq!(headers.len(), 4);

        let headers = set_comma_header(&headers, b"newthing", vec![]).unwrap();
        assert!(!headers.contains(b"newthing"));
    }

    #[test]
    fn test_has_expect_100_continue() {
        let request = |version: &[u8], expect: &str| Request {
            method: b"GET".to_vec(),
            target: b"/".to_vec(),
            headers: vec![
                (b"Host".to_vec(), b"example.com".to_vec()),
                (b"Expect".to_vec(), expect.as_bytes().to_vec()),
            ]
            .into(),
            http_version: version.to_vec(),
        };
        assert!(has_expect_100_continue(&request(b"1.1", "100-continue")));
        assert!(has_expect_100_continue(&request(b"1.1", "100-Continue")));
        assert!(!has_expect_100_continue(&request(b"1.1", "")));
        // ignored for HTTP/1.0
        assert!(!has_expect_100_continue(&request(b"1.0", "100-continue")));
    }

    #[test]
    fn test_trim_ows() {
        assert_eq!(trim_ows(b"  a b\t"), b"a b");
        assert_eq!(trim_ows(b"   "), b"");
        assert_eq!(trim_ows(b""), b"");
    }
}
