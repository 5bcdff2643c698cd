use crate::_config::ServerConfig;
use crate::_handler::Router;
use crate::_supervisor::serve_connection;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Accepts TCP connections and serves each on its own task.
pub struct Server<R: Router> {
    config: Arc<ServerConfig>,
    router: Arc<R>,
}

impl<R: Router> Server<R> {
    pub fn new(config: ServerConfig, router: R) -> Self {
        Self {
            config: Arc::new(config),
            router: Arc::new(router),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds `(host, port)` and serves until accepting fails.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        self.serve(listener).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        info!("Listening on {}", listener.local_addr()?);
        let mut next_id: u64 = 0;
        loop {
            let (socket, peer) = listener.accept().await?;
            let id = next_id;
            next_id += 1;
            debug!(id, "Accepted connection from {}", peer);

            if let Err(error) = socket.set_nodelay(true) {
                debug!(id, "couldn't set TCP_NODELAY: {}", error);
            }
            tokio::spawn(serve_connection(
                Box::new(socket),
                id,
                peer.to_string(),
                Arc::clone(&self.router),
                Arc::clone(&self.config),
            ));
        }
    }
}
