//! Outgoing and incoming messages.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::group::GroupHandle;
use crate::membership::MembershipInfo;
use crate::service::{Reliability, ServiceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// How the payload of an outgoing message was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Content {
    Data,
    Object,
    Digest,
}

/// A message sent to, or delivered from, one or more groups.
///
/// Outgoing messages start out reliable, with no groups and an empty
/// payload. Incoming messages are built by the connection when a frame is
/// decoded.
///
/// For regular messages [`Message::message_type`] is the 16-bit type chosen
/// by the sender. For regular membership messages the same field holds the
/// index of this connection's private group in [`Message::groups`], or -1
/// when it is not listed.
#[derive(Debug, Clone)]
pub struct Message {
    direction: Direction,
    content: Content,
    service_type: ServiceType,
    groups: Vec<GroupHandle>,
    sender: Option<GroupHandle>,
    data: Vec<u8>,
    message_type: i16,
    endian_mismatch: bool,
    membership: Option<MembershipInfo>,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// A new, empty, reliable outgoing message.
    pub fn new() -> Self {
        Self {
            direction: Direction::Outgoing,
            content: Content::Data,
            service_type: ServiceType::RELIABLE,
            groups: Vec::new(),
            sender: None,
            data: Vec::new(),
            message_type: 0,
            endian_mismatch: false,
            membership: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn incoming(
        service_type: ServiceType,
        groups: Vec<GroupHandle>,
        sender: GroupHandle,
        data: Vec<u8>,
        message_type: i16,
        endian_mismatch: bool,
        membership: Option<MembershipInfo>,
    ) -> Self {
        Self {
            direction: Direction::Incoming,
            content: Content::Data,
            service_type,
            groups,
            sender: Some(sender),
            data,
            message_type,
            endian_mismatch,
            membership,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }

    pub fn is_outgoing(&self) -> bool {
        self.direction == Direction::Outgoing
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn set_service_type(&mut self, service_type: ServiceType) {
        self.service_type = service_type;
    }

    pub fn is_regular(&self) -> bool {
        self.service_type.is_regular()
    }

    pub fn is_membership(&self) -> bool {
        self.service_type.is_membership()
    }

    pub fn is_reject(&self) -> bool {
        self.service_type.is_reject()
    }

    pub fn is_unreliable(&self) -> bool {
        self.service_type.contains(ServiceType::UNRELIABLE)
    }

    pub fn is_reliable(&self) -> bool {
        self.service_type.contains(ServiceType::RELIABLE)
    }

    pub fn is_fifo(&self) -> bool {
        self.service_type.contains(ServiceType::FIFO)
    }

    pub fn is_causal(&self) -> bool {
        self.service_type.contains(ServiceType::CAUSAL)
    }

    pub fn is_agreed(&self) -> bool {
        self.service_type.contains(ServiceType::AGREED)
    }

    pub fn is_safe(&self) -> bool {
        self.service_type.contains(ServiceType::SAFE)
    }

    pub fn is_self_discard(&self) -> bool {
        self.service_type.contains(ServiceType::SELF_DISCARD)
    }

    pub fn reliability(&self) -> Option<Reliability> {
        self.service_type.reliability()
    }

    /// Sets the delivery guarantee, clearing any other level.
    pub fn set_reliability(&mut self, level: Reliability) {
        self.service_type = self.service_type.with_reliability(level);
    }

    /// When set, the daemon does not deliver the message back to its sender.
    pub fn set_self_discard(&mut self, self_discard: bool) {
        self.service_type.set(ServiceType::SELF_DISCARD, self_discard);
    }

    /// Destination groups of an outgoing message, or the groups an incoming
    /// one was sent to.
    pub fn groups(&self) -> &[GroupHandle] {
        &self.groups
    }

    pub fn add_group(&mut self, group: impl Into<GroupHandle>) {
        self.groups.push(group.into());
    }

    pub fn add_groups<I, G>(&mut self, groups: I)
    where
        I: IntoIterator<Item = G>,
        G: Into<GroupHandle>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
    }

    /// Private group of the sender; `None` for outgoing messages.
    pub fn sender(&self) -> Option<&GroupHandle> {
        self.sender.as_ref()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Replaces the payload with raw bytes.
    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        self.content = Content::Data;
        self.data = data.into();
    }

    /// Replaces the payload with one serialized value.
    pub fn set_object<T: Serialize>(&mut self, value: &T) -> Result<()> {
        self.data = serde_json::to_vec(value)?;
        self.content = Content::Object;
        Ok(())
    }

    /// Reads the payload back as one value written by [`Message::set_object`].
    pub fn object<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.data)?)
    }

    /// Appends a value to a digest payload. The first call discards any
    /// payload that was not itself a digest.
    pub fn digest<T: Serialize>(&mut self, value: &T) -> Result<()> {
        if self.content != Content::Digest {
            self.data.clear();
            self.content = Content::Digest;
        }
        serde_json::to_writer(&mut self.data, value)?;
        self.data.push(b'\n');
        Ok(())
    }

    /// Every value appended with [`Message::digest`], in order.
    pub fn digest_values<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        serde_json::Deserializer::from_slice(&self.data)
            .into_iter::<T>()
            .map(|value| value.map_err(Into::into))
            .collect()
    }

    pub fn message_type(&self) -> i16 {
        self.message_type
    }

    pub fn set_message_type(&mut self, message_type: i16) {
        self.message_type = message_type;
    }

    /// True when the sender's byte order differs from ours. The payload is
    /// delivered untouched; converting it is up to the application.
    pub fn endian_mismatch(&self) -> bool {
        self.endian_mismatch
    }

    pub fn membership_info(&self) -> Option<&MembershipInfo> {
        self.membership.as_ref()
    }

    /// An outgoing copy carrying the same service type, groups, type and
    /// payload. Copying an incoming message is how it gets re-sent.
    pub fn copy(&self) -> Message {
        Message {
            direction: Direction::Outgoing,
            content: self.content,
            service_type: self.service_type,
            groups: self.groups.clone(),
            sender: None,
            data: self.data.clone(),
            message_type: self.message_type,
            endian_mismatch: false,
            membership: None,
        }
    }
}
