use crate::_transport::BoxTransport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// We half-closed and the peer finished its side.
    Graceful,
    /// The half-close itself failed; the peer was already gone.
    PeerGone,
    /// The peer didn't close within the drain timeout and was reset.
    ForcedReset,
}

/// Closes a connection the polite way.
///
/// The write side is shut first, then input is read and discarded until the
/// peer closes too, so unread input never turns our close into a RST ahead of
/// the response. A peer that won't finish within `drain_timeout` gets reset.
pub async fn shutdown(
    mut transport: BoxTransport,
    drain_timeout: Duration,
    max_recv: usize,
) -> ShutdownOutcome {
    if let Err(error) = transport.shutdown().await {
        debug!("half-close failed, peer already gone: {}", error);
        return ShutdownOutcome::PeerGone;
    }

    let mut buf = vec![0; max_recv.max(1)];
    let drained = timeout(drain_timeout, async {
        loop {
            match transport.read(&mut buf).await {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(error) => return Err(error),
            }
        }
    })
    .await;

    match drained {
        Ok(Ok(())) => ShutdownOutcome::Graceful,
        Ok(Err(error)) => {
            // a reset while draining still means they're done with us
            debug!("peer reset while draining: {}", error);
            ShutdownOutcome::Graceful
        }
        Err(_) => {
            debug!("drain timed out, resetting connection");
            if let Err(error) = transport.reset_on_close() {
                debug!("couldn't set zero linger: {}", error);
            }
            ShutdownOutcome::ForcedReset
        }
    }
}
