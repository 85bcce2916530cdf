//! Connection settings.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{Error, Result};
use crate::group::GroupHandle;
use crate::protocol::{DEFAULT_PORT, MAX_PORT, MAX_PRIVATE_NAME};

const DEFAULT_HOST: &str = "localhost";

/// Where and how to connect to a daemon.
///
/// ```
/// use spread_client::ConnectOptions;
///
/// let options = ConnectOptions::new("alice")
///     .host("daemon.local")
///     .port(4803)
///     .group_membership(true);
/// assert_eq!(options.private_name(), "alice");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    host: Option<String>,
    port: u16,
    private_name: String,
    priority: bool,
    group_membership: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: None,
            port: 0,
            private_name: String::new(),
            priority: false,
            group_membership: true,
        }
    }
}

impl ConnectOptions {
    /// Options for a connection asking for `private_name`. Names longer than
    /// the daemon accepts are truncated during the handshake.
    pub fn new(private_name: impl Into<String>) -> Self {
        Self {
            private_name: private_name.into(),
            ..Self::default()
        }
    }

    /// Daemon host; `localhost` when unset.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Daemon port; 0 selects the default port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn private_name(&self) -> &str {
        &self.private_name
    }

    /// Requests a priority session (daemon 3.8.0 or newer).
    pub fn priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    /// Whether membership messages are delivered to this connection.
    pub fn group_membership(mut self, group_membership: bool) -> Self {
        self.group_membership = group_membership;
        self
    }

    pub fn is_priority(&self) -> bool {
        self.priority
    }

    pub fn wants_group_membership(&self) -> bool {
        self.group_membership
    }

    pub fn host_name(&self) -> &str {
        self.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    pub fn effective_port(&self) -> Result<u16> {
        match self.port {
            0 => Ok(DEFAULT_PORT),
            port if port > MAX_PORT => Err(Error::BadPort(port)),
            port => Ok(port),
        }
    }

    /// The private name as sent in the connect frame.
    pub(crate) fn wire_name(&self) -> Vec<u8> {
        let mut name = GroupHandle::new(self.private_name.as_str()).to_latin1();
        name.truncate(MAX_PRIVATE_NAME);
        name
    }

    /// Resolves the daemon address.
    pub fn socket_addrs(&self) -> Result<Vec<SocketAddr>> {
        let port = self.effective_port()?;
        let host = self.host_name();
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| Error::Resolve {
                address: format!("{host}:{port}"),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(Error::Resolve {
                address: format!("{host}:{port}"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses found"),
            });
        }
        Ok(addrs)
    }
}
