//! Protocol constants shared by the handshake, the frame codec and the
//! connection.

use std::fmt;
use std::time::Duration;

/// Port the daemon listens on when none is configured.
pub const DEFAULT_PORT: u16 = 4803;

/// Ports above this are refused before a socket is opened.
pub const MAX_PORT: u16 = 32 * 1024;

/// Longest private name a client may ask for; longer names are truncated.
pub const MAX_PRIVATE_NAME: usize = 10;

/// Width of every group name field on the wire.
pub const MAX_GROUP_NAME: usize = 32;

/// Largest frame (header, group fields and payload) a client may send.
pub const MAX_MESSAGE_LENGTH: usize = 140_000;

/// Width of one authentication method slot in the handshake.
pub const MAX_AUTH_NAME: usize = 30;

/// Number of method slots the client sends during the handshake.
pub const MAX_AUTH_METHODS: usize = 3;

/// Method sent when the application registers nothing else.
pub const DEFAULT_AUTH_NAME: &str = "NULL";

/// Status byte the daemon sends for an accepted session.
pub const ACCEPT_SESSION: u8 = 1;

/// How long the dispatcher blocks on a read before checking its stop signal.
pub const DISPATCH_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Version this client speaks.
pub const PROTOCOL_VERSION: Version = Version::new(4, 4, 0);

/// Oldest daemon this client talks to at all.
pub const MIN_DAEMON_VERSION: Version = Version::new(3, 1, 0);

/// Oldest daemon that understands priority sessions.
pub const MIN_PRIORITY_VERSION: Version = Version::new(3, 8, 0);

/// A `major.minor.patch` protocol version as exchanged in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub(crate) fn to_bytes(self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }

    pub(crate) fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Version of the protocol implemented by this crate.
pub fn protocol_version() -> Version {
    PROTOCOL_VERSION
}
