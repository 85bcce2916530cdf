//! Group names and joined-group handles.

use std::fmt;

use tracing::debug;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::MAX_GROUP_NAME;
use crate::service::ServiceType;

/// Lowest byte allowed in a group name passed to [`Group::join`].
const MIN_NAME_BYTE: u8 = 36;
/// Highest byte allowed in a group name passed to [`Group::join`].
const MAX_NAME_BYTE: u8 = 126;

/// The name of a group or of a connection's private mailbox.
///
/// Names are ISO-8859-1 and at most [`MAX_GROUP_NAME`] bytes long; longer
/// names are truncated on construction. Two handles are equal when their
/// names are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupHandle {
    name: String,
}

impl GroupHandle {
    pub fn new(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if let Some((index, _)) = name.char_indices().nth(MAX_GROUP_NAME) {
            name.truncate(index);
        }
        Self { name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latin-1 bytes of the name; characters outside the charset become `?`.
    pub fn to_latin1(&self) -> Vec<u8> {
        self.name
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect()
    }

    pub fn from_latin1(bytes: &[u8]) -> Self {
        Self::new(bytes.iter().map(|&b| char::from(b)).collect::<String>())
    }
}

impl fmt::Display for GroupHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&str> for GroupHandle {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for GroupHandle {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// A group this process has joined on some connection.
///
/// A default `Group` is not joined; [`Group::join`] binds it to a connection
/// and [`Group::leave`] releases it again.
#[derive(Default)]
pub struct Group {
    handle: Option<GroupHandle>,
    connection: Option<Connection>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `name` on `connection`.
    ///
    /// Fails with [`Error::AlreadyJoined`] if this handle is currently joined
    /// and with [`Error::IllegalGroupName`] if the name contains a byte
    /// outside the printable range the daemon accepts.
    pub fn join(&mut self, connection: &Connection, name: &str) -> Result<()> {
        if self.connection.is_some() {
            return Err(Error::AlreadyJoined);
        }

        let handle = GroupHandle::new(name);
        validate_name(&handle)?;

        let mut message = Message::new();
        message.add_group(handle.clone());
        message.set_service_type(ServiceType::JOIN);
        connection.multicast(&message)?;

        debug!(group = %handle, "joined group");
        self.handle = Some(handle);
        self.connection = Some(connection.clone());
        Ok(())
    }

    /// Leaves the group joined by [`Group::join`].
    pub fn leave(&mut self) -> Result<()> {
        let (Some(connection), Some(handle)) = (self.connection.as_ref(), self.handle.as_ref())
        else {
            return Err(Error::NotJoined);
        };

        let mut message = Message::new();
        message.add_group(handle.clone());
        message.set_service_type(ServiceType::LEAVE);
        connection.multicast(&message)?;

        debug!(group = %handle, "left group");
        self.connection = None;
        Ok(())
    }

    pub fn is_joined(&self) -> bool {
        self.connection.is_some()
    }

    /// Name of the group, once [`Group::join`] has been called.
    pub fn handle(&self) -> Option<&GroupHandle> {
        self.handle.as_ref()
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("handle", &self.handle)
            .field("joined", &self.is_joined())
            .finish()
    }
}

fn validate_name(handle: &GroupHandle) -> Result<()> {
    let legal = handle
        .to_latin1()
        .iter()
        .all(|b| (MIN_NAME_BYTE..=MAX_NAME_BYTE).contains(b));
    if legal {
        Ok(())
    } else {
        Err(Error::IllegalGroupName(handle.name().to_string()))
    }
}
