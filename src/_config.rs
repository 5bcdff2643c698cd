use anyhow::{anyhow, Context};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Controls how much detail error responses reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Prod,
    /// Error bodies carry the underlying error text.
    Dev,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prod" | "production" => Ok(Environment::Prod),
            "dev" | "development" => Ok(Environment::Dev),
            other => Err(anyhow!("unknown environment {:?}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for each decoded event: a whole request head, or one piece of body.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub drain_timeout: Duration,
    /// Upper bound on a single socket read.
    pub max_recv: usize,
    pub max_incomplete_event_size: usize,
    /// Value of the `Server` header.
    pub identity: String,
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(10),
            max_recv: 64 * 1024,
            max_incomplete_event_size: crate::_connection::DEFAULT_MAX_INCOMPLETE_EVENT_SIZE,
            identity: format!("responds/{}", env!("CARGO_PKG_VERSION")),
            environment: Environment::Prod,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `RESPONDS_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(host) = lookup("RESPONDS_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("RESPONDS_PORT") {
            config.port = port.parse().context("RESPONDS_PORT")?;
        }
        if let Some(secs) = lookup("RESPONDS_TIMEOUT_SECS") {
            let timeout = Duration::from_secs(secs.parse().context("RESPONDS_TIMEOUT_SECS")?);
            config.read_timeout = timeout;
            config.write_timeout = timeout;
        }
        if let Some(secs) = lookup("RESPONDS_DRAIN_TIMEOUT_SECS") {
            config.drain_timeout =
                Duration::from_secs(secs.parse().context("RESPONDS_DRAIN_TIMEOUT_SECS")?);
        }
        if let Some(max_recv) = lookup("RESPONDS_MAX_RECV") {
            config.max_recv = max_recv.parse().context("RESPONDS_MAX_RECV")?;
            if config.max_recv == 0 {
                return Err(anyhow!("RESPONDS_MAX_RECV must be positive"));
            }
        }
        if let Some(environment) = lookup("RESPONDS_ENV") {
            config.environment = environment.parse()?;
        }
        Ok(config)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets both the read and the write timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self.write_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_max_recv(mut self, max_recv: usize) -> Self {
        self.max_recv = max_recv.max(1);
        self
    }

    pub fn with_max_incomplete_event_size(mut self, size: usize) -> Self {
        self.max_incomplete_event_size = size;
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// `Date` and `Server` headers for a response going out now.
    pub fn identity_headers(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        vec![
            (
                b"Date".to_vec(),
                httpdate::fmt_http_date(SystemTime::now()).into_bytes(),
            ),
            (b"Server".to_vec(), self.identity.clone().into_bytes()),
        ]
    }
}
