use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// A duplex byte stream a connection can be served over.
///
/// Reading, writing and half-closing (`AsyncWriteExt::shutdown`) come from the
/// tokio traits. The only extra capability is asking the next close to abort
/// the connection instead of closing it gracefully.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {
    /// After this, dropping the transport resets the connection (RST) instead
    /// of sending FIN.
    fn reset_on_close(&mut self) -> io::Result<()>;
}

pub type BoxTransport = Box<dyn Transport>;

impl Transport for TcpStream {
    #[allow(deprecated)]
    fn reset_on_close(&mut self) -> io::Result<()> {
        self.set_linger(Some(Duration::ZERO))
    }
}

impl Transport for DuplexStream {
    // In-memory pipes have no notion of a reset; dropping either end already
    // surfaces as EOF on the other.
    fn reset_on_close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Errors that just mean the peer went away.
pub fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}
