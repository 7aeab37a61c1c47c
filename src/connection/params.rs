//! Connection parameter parsing and validation.
//!
//! This module handles parsing connection strings and building connection
//! parameters with validation.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConnectionError;
use crate::transport::DEFAULT_PORT;

/// Driver selection mode.
///
/// Only the Arrow Native protocol is implemented by this crate; requesting
/// any other mode is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Arrow Native binary protocol (default port 4445)
    #[default]
    Native,
}

impl FromStr for ConnectionMode {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(ConnectionMode::Native),
            other => Err(ConnectionError::InvalidParameter {
                parameter: "mode".to_string(),
                message: format!("unsupported connection mode '{other}' (expected 'native')"),
            }),
        }
    }
}

/// Connection parameters for establishing an Arrow Native connection.
#[derive(Clone)]
pub struct ConnectionParams {
    /// Server host address
    pub host: String,

    /// Server port (default: 4445)
    pub port: u16,

    /// Opaque authentication token (never logged)
    token: String,

    /// Optional database/catalog name sent during authentication
    pub database: Option<String>,

    /// Driver selection mode
    pub mode: ConnectionMode,

    /// Socket connect/read/write deadline
    pub timeout: Option<Duration>,
}

impl ConnectionParams {
    /// Get the authentication token (for internal use only, never logged).
    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    /// Create a new ConnectionBuilder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }
}

impl FromStr for ConnectionParams {
    type Err = ConnectionError;

    /// Parse a connection string in the format:
    /// `cube://[token@]host[:port][/database][?param=value&...]`
    ///
    /// Recognized query parameters: `token`, `database`, `mode`
    /// (must be `native`), `timeout_ms`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use cubearrow_rs::connection::ConnectionParams;
    /// # use std::str::FromStr;
    /// let params = ConnectionParams::from_str("cube://my-token@localhost:4445")?;
    ///
    /// let params = ConnectionParams::from_str(
    ///     "cube://localhost/analytics?token=my-token&timeout_ms=5000"
    /// )?;
    /// # Ok::<(), cubearrow_rs::error::ConnectionError>(())
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = s.trim();

        let url = url.strip_prefix("cube://").ok_or_else(|| {
            ConnectionError::ParseError("Connection string must start with 'cube://'".to_string())
        })?;

        // Split off query parameters
        let (main_part, query_string) = match url.split_once('?') {
            Some((main, query)) => (main, Some(query)),
            None => (url, None),
        };

        let mut builder = ConnectionBuilder::new();

        // token@host takes precedence over the `token` query parameter
        let (auth_part, host_part) = match main_part.rfind('@') {
            Some(pos) => (Some(&main_part[..pos]), &main_part[pos + 1..]),
            None => (None, main_part),
        };
        if let Some(token) = auth_part {
            builder = builder.token(token);
        }

        // host[:port][/database]
        let (host_port, database) = match host_part.split_once('/') {
            Some((hp, db)) if !db.is_empty() => (hp, Some(db)),
            Some((hp, _)) => (hp, None),
            None => (host_part, None),
        };
        if let Some(db) = database {
            builder = builder.database(db);
        }

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    ConnectionError::ParseError(format!("invalid port '{port}'"))
                })?;
                (host, Some(port))
            }
            None => (host_port, None),
        };
        builder = builder.host(host);
        if let Some(port) = port {
            builder = builder.port(port);
        }

        // Apply query parameters
        if let Some(query) = query_string {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    ConnectionError::ParseError(format!("malformed query parameter '{pair}'"))
                })?;
                match key {
                    "token" => {
                        if auth_part.is_none() {
                            builder = builder.token(value);
                        }
                    }
                    "database" => builder = builder.database(value),
                    "mode" => builder = builder.mode(ConnectionMode::from_str(value)?),
                    "timeout_ms" => {
                        let ms = value.parse::<u64>().map_err(|_| {
                            ConnectionError::ParseError(format!("invalid timeout_ms '{value}'"))
                        })?;
                        builder = builder.timeout(Duration::from_millis(ms));
                    }
                    other => {
                        return Err(ConnectionError::ParseError(format!(
                            "unknown query parameter '{other}'"
                        )));
                    }
                }
            }
        }

        builder.build()
    }
}

// Prevent the token from being displayed in debug output
impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token", &"<redacted>")
            .field("database", &self.database)
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionParams {{ host: {}, port: {}, database: {:?} }}",
            self.host, self.port, self.database
        )
    }
}

/// Builder for constructing ConnectionParams with validation.
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    host: Option<String>,
    port: Option<u16>,
    token: Option<String>,
    database: Option<String>,
    mode: ConnectionMode,
    timeout: Option<Duration>,
}

impl ConnectionBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server host.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Set the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the authentication token.
    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    /// Set the connection mode.
    pub fn mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the socket deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate and build the connection parameters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `host` or `token` is missing or empty,
    /// or if `port` is zero.
    pub fn build(self) -> Result<ConnectionParams, ConnectionError> {
        let host = self.host.filter(|h| !h.is_empty()).ok_or_else(|| {
            ConnectionError::InvalidParameter {
                parameter: "host".to_string(),
                message: "host is required".to_string(),
            }
        })?;

        let token = self.token.filter(|t| !t.is_empty()).ok_or_else(|| {
            ConnectionError::InvalidParameter {
                parameter: "token".to_string(),
                message: "token is required for native mode".to_string(),
            }
        })?;

        let port = self.port.unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(ConnectionError::InvalidParameter {
                parameter: "port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }

        Ok(ConnectionParams {
            host,
            port,
            token,
            database: self.database,
            mode: self.mode,
            timeout: self.timeout,
        })
    }
}
