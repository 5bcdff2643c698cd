use thiserror::Error;

/// Something *we* tried to do was illegal for the current state, e.g. sending
/// a body before the response headers. `code` is the status a caller should
/// use if it decides to report the problem to the peer.
#[derive(Debug, Error)]
#[error("{message} (status hint {code})")]
pub struct LocalProtocolError {
    pub message: String,
    pub code: u16,
}

impl From<(String, u16)> for LocalProtocolError {
    fn from((message, code): (String, u16)) -> Self {
        LocalProtocolError { message, code }
    }
}

impl From<(&str, u16)> for LocalProtocolError {
    fn from((message, code): (&str, u16)) -> Self {
        LocalProtocolError {
            message: message.to_string(),
            code,
        }
    }
}

impl From<String> for LocalProtocolError {
    fn from(message: String) -> Self {
        (message, 400).into()
    }
}

impl From<&str> for LocalProtocolError {
    fn from(message: &str) -> Self {
        (message, 400).into()
    }
}

impl LocalProtocolError {
    /// Parsing code reports problems as local errors; once they bubble out of
    /// the receive path they are the peer's fault.
    pub(crate) fn into_remote(self) -> RemoteProtocolError {
        RemoteProtocolError {
            message: self.message,
            code: self.code,
        }
    }
}

/// The peer sent something we could not accept. `code` is the status hint
/// used for the best-effort error response.
#[derive(Debug, Error)]
#[error("{message} (status hint {code})")]
pub struct RemoteProtocolError {
    pub message: String,
    pub code: u16,
}

impl From<(String, u16)> for RemoteProtocolError {
    fn from((message, code): (String, u16)) -> Self {
        RemoteProtocolError { message, code }
    }
}

impl From<(&str, u16)> for RemoteProtocolError {
    fn from((message, code): (&str, u16)) -> Self {
        RemoteProtocolError {
            message: message.to_string(),
            code,
        }
    }
}

impl From<String> for RemoteProtocolError {
    fn from(message: String) -> Self {
        (message, 400).into()
    }
}

impl From<&str> for RemoteProtocolError {
    fn from(message: &str) -> Self {
        (message, 400).into()
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("local protocol error: {0}")]
    LocalProtocolError(#[from] LocalProtocolError),
    #[error("remote protocol error: {0}")]
    RemoteProtocolError(#[from] RemoteProtocolError),
}

impl ProtocolError {
    pub fn code(&self) -> u16 {
        match self {
            ProtocolError::LocalProtocolError(error) => error.code,
            ProtocolError::RemoteProtocolError(error) => error.code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ProtocolError::LocalProtocolError(error) => &error.message,
            ProtocolError::RemoteProtocolError(error) => &error.message,
        }
    }
}

/// Standard reason phrase for the status codes this crate emits or is likely
/// to be handed by a router.
pub fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        411 => "Length Required",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_error_reraised_as_remote_keeps_hint() {
        let local: LocalProtocolError = ("illegal request line", 405).into();
        let remote = local.into_remote();
        assert_eq!(remote.code, 405);
        assert_eq!(remote.message, "illegal request line");

        let error: ProtocolError = remote.into();
        assert_eq!(error.code(), 405);
        assert!(error.to_string().contains("illegal request line"));
    }

    #[test]
    fn test_default_hint_is_400() {
        let error: RemoteProtocolError = "garbage".into();
        assert_eq!(error.code, 400);
    }

    #[test]
    fn test_reason_phrase() {
        assert_eq!(reason_phrase(200), "OK");
        assert_eq!(reason_phrase(408), "Request Timeout");
        assert_eq!(reason_phrase(799), "");
    }
}
