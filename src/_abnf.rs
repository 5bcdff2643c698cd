use lazy_static::lazy_static;

// RFC 7230 grammar pieces, assembled into the regexes the readers compile.

pub static OWS: &str = "[ \\t]*";
pub static TOKEN: &str = "[-!#$%&'*+.^_`|~0-9a-zA-Z]+";
pub static FIELD_NAME: &str = TOKEN;
pub static VCHAR: &str = "[\\x21-\\x7e]";
pub static VCHAR_OR_OBS_TEXT: &str = "[^\\x00\\s]";
pub static FIELD_VCHAR: &str = VCHAR_OR_OBS_TEXT;

lazy_static! {
    pub static ref FIELD_CONTENT: String = format!("{0}+(?:[ \\t]+{0}+)*", FIELD_VCHAR);
    pub static ref FIELD_VALUE: String = format!("({})?", *FIELD_CONTENT);
    pub static ref HEADER_FIELD: String = format!(
        "(?P<field_name>{field_name}):{ows}(?P<field_value>{field_value}){ows}",
        field_name = FIELD_NAME,
        field_value = *FIELD_VALUE,
        ows = OWS
    );
    pub static ref METHOD: String = TOKEN.to_string();
    pub static ref REQUEST_TARGET: String = format!("{}+", VCHAR);
    pub static ref HTTP_VERSION: String = "HTTP/(?P<http_version>[0-9]\\.[0-9])".to_string();
    pub static ref REQUEST_LINE: String = format!(
        "^(?P<method>{method}) (?P<target>{target}) {version}$",
        method = *METHOD,
        target = *REQUEST_TARGET,
        version = *HTTP_VERSION
    );
    pub static ref HEXDIG: String = "[0-9A-Fa-f]".to_string();
    pub static ref CHUNK_SIZE: String = format!("({}){{1,20}}", *HEXDIG);
    pub static ref CHUNK_EXT: String = ";.*".to_string();
    pub static ref CHUNK_HEADER: String = format!(
        "^(?P<chunk_size>{size})(?P<chunk_ext>{ext})?{ows}\\r\\n$",
        size = *CHUNK_SIZE,
        ext = *CHUNK_EXT,
        ows = OWS
    );
}

/// Methods the decoder will hand to a router. Anything else that is still a
/// well-formed token is answered with 405.
pub static KNOWN_METHODS: &[&[u8]] = &[
    b"GET", b"HEAD", b"POST", b"PUT", b"DELETE", b"OPTIONS", b"PATCH", b"TRACE", b"CONNECT",
];

#[cfg(test)]
mod tests {
    use super::*;
    use regex::bytes::Regex;

    #[test]
    fn test_request_line_grammar() {
        let re = Regex::new(&REQUEST_LINE).unwrap();
        let caps = re.captures(b"GET /x?y=1 HTTP/1.1").unwrap();
        assert_eq!(&caps["method"], b"GET");
        assert_eq!(&caps["target"], b"/x?y=1");
        assert_eq!(&caps["http_version"], b"1.1");

        assert!(!re.is_match(b"GET  /x HTTP/1.1"));
        assert!(!re.is_match(b"GET /x HTTP/1.1 trailing"));
        assert!(!re.is_match(b"G(ET /x HTTP/1.1"));
    }

    #[test]
    fn test_chunk_header_grammar() {
        let re = Regex::new(&CHUNK_HEADER).unwrap();
        assert!(re.is_match(b"1f\r\n"));
        assert!(re.is_match(b"5; name=value\r\n"));
        assert!(!re.is_match(b"zz\r\n"));
    }
}
