use std::io;

use crate::auth::AuthError;
use crate::protocol::Version;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure surfaced by the client, from handshake to message decode.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("connection has been closed and cannot be reused")]
    Closed,

    #[error("bad port ({0})")]
    BadPort(u16),

    #[error("failed to resolve daemon address {address}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("connection closed while reading {0}")]
    ConnectionClosed(&'static str),

    #[error("connection attempt rejected={code} ({})", reject_reason(.code))]
    Rejected { code: i32 },

    #[error("old version {0} not supported")]
    UnsupportedVersion(Version),

    #[error("old version {0} does not support priority")]
    PriorityUnsupported(Version),

    #[error("connection rejected: authentication failed")]
    AuthenticationFailed(#[source] AuthError),

    #[error("an authentication method is already registered")]
    AuthAlreadyRegistered,

    #[error("illegal message: message dropped")]
    IllegalMessage,

    #[error("message is too long for a spread message ({size} > {max} bytes)")]
    MessageTooLong { size: usize, max: usize },

    #[error("malformed membership message: {0}")]
    MalformedMembership(&'static str),

    #[error("virtual synchrony set is full (capacity {0})")]
    SynchronySetFull(usize),

    #[error("illegal character in group name {0:?}")]
    IllegalGroupName(String),

    #[error("already joined")]
    AlreadyJoined,

    #[error("no group to leave")]
    NotJoined,

    #[error("tried to receive while there are listeners")]
    ReceiveWhileListening,

    #[error("payload encoding: {0}")]
    Payload(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(io::Error) -> Error {
        move |source| Error::Io { context, source }
    }

    /// Maps a failed exact read, turning EOF into [`Error::ConnectionClosed`].
    pub(crate) fn read(what: &'static str) -> impl FnOnce(io::Error) -> Error {
        move |source| match source.kind() {
            io::ErrorKind::UnexpectedEof => Error::ConnectionClosed(what),
            _ => Error::Io {
                context: what,
                source,
            },
        }
    }
}

/// Human readable name for the session reject codes a daemon sends back.
fn reject_reason(code: &i32) -> &'static str {
    match *code {
        -3 => "quota exceeded",
        -4 => "no name",
        -5 => "illegal name",
        -6 => "name not unique",
        -7 => "version mismatch",
        -8 => "connection closed",
        -9 => "authentication rejected",
        _ => "unknown reason",
    }
}
