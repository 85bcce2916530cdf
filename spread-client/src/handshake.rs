//! Session setup run right after the TCP connection is opened.

use std::io::{Read, Write};

use tracing::debug;

use crate::auth::AuthMethod;
use crate::config::ConnectOptions;
use crate::error::{Error, Result};
use crate::group::GroupHandle;
use crate::protocol::{
    Version, ACCEPT_SESSION, MAX_AUTH_METHODS, MAX_AUTH_NAME, MIN_DAEMON_VERSION,
    MIN_PRIORITY_VERSION, PROTOCOL_VERSION,
};

const MEMBERSHIP_FLAG: u8 = 0x01;
const PRIORITY_FLAG: u8 = 0x10;

/// What the daemon told us about the new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Established {
    pub(crate) mailbox: GroupHandle,
    pub(crate) daemon_version: Version,
}

/// Runs the whole handshake on `stream`.
pub(crate) fn perform_handshake<S: Read + Write>(
    stream: &mut S,
    options: &ConnectOptions,
    auth: &AuthMethod,
) -> Result<Established> {
    send_connect(stream, options)?;
    read_auth_methods(stream)?;
    send_auth_method(stream, auth)?;

    auth.instantiate()
        .authenticate()
        .map_err(Error::AuthenticationFailed)?;

    read_accept(stream)?;
    let daemon_version = read_version(stream, options.is_priority())?;
    let mailbox = read_mailbox(stream)?;

    debug!(%mailbox, %daemon_version, "session accepted");
    Ok(Established {
        mailbox,
        daemon_version,
    })
}

fn send_connect<W: Write>(stream: &mut W, options: &ConnectOptions) -> Result<()> {
    let name = options.wire_name();
    let mut flags = 0;
    if options.wants_group_membership() {
        flags |= MEMBERSHIP_FLAG;
    }
    if options.is_priority() {
        flags |= PRIORITY_FLAG;
    }

    let mut frame = Vec::with_capacity(5 + name.len());
    frame.extend_from_slice(&PROTOCOL_VERSION.to_bytes());
    frame.push(flags);
    frame.push(name.len() as u8);
    frame.extend_from_slice(&name);

    stream
        .write_all(&frame)
        .map_err(Error::io("sending connect frame"))
}

/// Reads the offered methods. The list is not used; the registered method
/// is sent regardless.
fn read_auth_methods<R: Read>(stream: &mut R) -> Result<()> {
    let len = read_byte(stream, "authentication method list")?;
    if len >= 128 {
        return Err(Error::Rejected {
            code: i32::from(len as i8),
        });
    }

    let mut offered = vec![0u8; usize::from(len)];
    stream
        .read_exact(&mut offered)
        .map_err(Error::read("authentication method list"))?;
    debug!(offered = %String::from_utf8_lossy(&offered), "daemon offered authentication");
    Ok(())
}

fn send_auth_method<W: Write>(stream: &mut W, auth: &AuthMethod) -> Result<()> {
    let mut field = [0u8; MAX_AUTH_NAME * MAX_AUTH_METHODS];
    let name = auth.name().as_bytes();
    let len = name.len().min(MAX_AUTH_NAME);
    field[..len].copy_from_slice(&name[..len]);

    stream
        .write_all(&field)
        .map_err(Error::io("sending authentication method"))
}

fn read_accept<R: Read>(stream: &mut R) -> Result<()> {
    let accept = read_byte(stream, "session accept")?;
    if accept != ACCEPT_SESSION {
        return Err(Error::Rejected {
            code: i32::from(accept as i8),
        });
    }
    Ok(())
}

fn read_version<R: Read>(stream: &mut R, priority: bool) -> Result<Version> {
    let mut raw = [0u8; 3];
    stream
        .read_exact(&mut raw)
        .map_err(Error::read("daemon version"))?;
    let version = Version::from_bytes(raw);

    if version < MIN_DAEMON_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    if priority && version < MIN_PRIORITY_VERSION {
        return Err(Error::PriorityUnsupported(version));
    }
    Ok(version)
}

fn read_mailbox<R: Read>(stream: &mut R) -> Result<GroupHandle> {
    let len = read_byte(stream, "private group name")?;
    let mut name = vec![0u8; usize::from(len)];
    stream
        .read_exact(&mut name)
        .map_err(Error::read("private group name"))?;
    Ok(GroupHandle::from_latin1(&name))
}

fn read_byte<R: Read>(stream: &mut R, what: &'static str) -> Result<u8> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte).map_err(Error::read(what))?;
    Ok(byte[0])
}
