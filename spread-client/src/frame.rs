//! Message frames exchanged with the daemon.
//!
//! ```text
//! service type | sender (32) | group count | type hint | data length
//! [original service type, reject frames only]
//! group count x 32-byte group field
//! data
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{
    clear_endian, flip32, get_group_field, get_i32, put_group_field, put_i32, same_endian,
};
use crate::error::{Error, Result};
use crate::group::GroupHandle;
use crate::membership::MembershipInfo;
use crate::message::Message;
use crate::protocol::{MAX_GROUP_NAME, MAX_MESSAGE_LENGTH};
use crate::service::ServiceType;

/// Fixed part of every frame.
pub(crate) const HEADER_LEN: usize = 16 + MAX_GROUP_NAME;

const REJECT_WORD_LEN: usize = 4;

/// Largest body an incoming header may announce.
const MAX_INCOMING_BODY: usize = 4 * MAX_MESSAGE_LENGTH;

/// The fixed header of an incoming frame, already in our byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FrameHeader {
    service_type: i32,
    sender: GroupHandle,
    num_groups: usize,
    hint: i32,
    data_len: usize,
    daemon_endian_mismatch: bool,
}

impl FrameHeader {
    /// Parses the first [`HEADER_LEN`] bytes of a frame.
    pub(crate) fn parse(mut raw: &[u8]) -> Result<Self> {
        let mut service_type = get_i32(&mut raw, "message header")?;
        let sender = get_group_field(&mut raw, "message header")?;
        let mut num_groups = get_i32(&mut raw, "message header")?;
        let hint = get_i32(&mut raw, "message header")?;
        let mut data_len = get_i32(&mut raw, "message header")?;

        let daemon_endian_mismatch = !same_endian(service_type);
        if daemon_endian_mismatch {
            service_type = flip32(service_type);
            num_groups = flip32(num_groups);
            data_len = flip32(data_len);
        }

        let (Ok(num_groups), Ok(data_len)) =
            (usize::try_from(num_groups), usize::try_from(data_len))
        else {
            return Err(Error::IllegalMessage);
        };
        let announced = num_groups
            .checked_mul(MAX_GROUP_NAME)
            .and_then(|groups| groups.checked_add(data_len));
        if !announced.is_some_and(|len| len <= MAX_INCOMING_BODY) {
            return Err(Error::IllegalMessage);
        }

        Ok(Self {
            service_type,
            sender,
            num_groups,
            hint,
            data_len,
            daemon_endian_mismatch,
        })
    }

    fn is_reject(&self) -> bool {
        ServiceType::from_wire(self.service_type).is_reject()
    }

    /// Bytes following the header.
    pub(crate) fn body_len(&self) -> usize {
        let reject = if self.is_reject() { REJECT_WORD_LEN } else { 0 };
        reject + self.num_groups * MAX_GROUP_NAME + self.data_len
    }
}

/// One complete frame as read off the socket, not yet decoded.
#[derive(Debug, Clone)]
pub(crate) struct RawFrame {
    pub(crate) header: FrameHeader,
    pub(crate) body: Bytes,
}

/// Encodes `message` as sent by the connection owning `mailbox`.
pub(crate) fn encode(message: &Message, mailbox: &GroupHandle) -> Result<Bytes> {
    let groups = message.groups();
    let data = message.data();
    let size = HEADER_LEN + groups.len() * MAX_GROUP_NAME + data.len();
    if size > MAX_MESSAGE_LENGTH {
        return Err(Error::MessageTooLong {
            size,
            max: MAX_MESSAGE_LENGTH,
        });
    }

    let mut buf = BytesMut::with_capacity(size);
    put_i32(&mut buf, message.service_type().to_wire());
    put_group_field(&mut buf, mailbox);
    put_i32(&mut buf, groups.len() as i32);
    put_i32(&mut buf, (i32::from(message.message_type()) << 8) & 0x00FF_FF00);
    put_i32(&mut buf, data.len() as i32);
    for group in groups {
        put_group_field(&mut buf, group);
    }
    buf.put_slice(data);

    Ok(buf.freeze())
}

/// Turns a raw frame into a message, decoding membership payloads.
///
/// For regular membership messages the message type is set to the index of
/// `mailbox` in the group list, or -1 when it is absent.
pub(crate) fn decode(frame: RawFrame, mailbox: &GroupHandle) -> Result<Message> {
    let RawFrame { header, mut body } = frame;
    let mut service_type = header.service_type;

    let (endian_mismatch, mut message_type) =
        if ServiceType::from_wire(service_type).is_regular() || header.is_reject() {
            let mismatch = !same_endian(header.hint);
            let hint = if mismatch {
                flip32(header.hint)
            } else {
                header.hint
            };
            let message_type = ((clear_endian(hint) >> 8) & 0xFFFF) as i16;
            (mismatch, message_type)
        } else {
            (false, -1)
        };

    if header.is_reject() {
        let mut original = get_i32(&mut body, "reject service type")?;
        if header.daemon_endian_mismatch {
            original = flip32(original);
        }
        service_type = ServiceType::REJECT.to_wire() | original;
    }

    let mut groups = Vec::with_capacity(header.num_groups);
    for _ in 0..header.num_groups {
        groups.push(get_group_field(&mut body, "group list")?);
    }

    let service_type = ServiceType::from_wire(clear_endian(service_type));

    if body.remaining() < header.data_len {
        return Err(Error::ConnectionClosed("message data"));
    }
    let data = body.split_to(header.data_len).to_vec();

    let membership = if service_type.is_membership() {
        let info = MembershipInfo::decode(
            service_type,
            header.sender.clone(),
            &groups,
            &data,
            header.daemon_endian_mismatch,
        )?;
        if info.cause().is_regular() {
            message_type = groups
                .iter()
                .position(|group| group == mailbox)
                .and_then(|index| i16::try_from(index).ok())
                .unwrap_or(-1);
        }
        Some(info)
    } else {
        None
    };

    Ok(Message::incoming(
        service_type,
        groups,
        header.sender,
        data,
        message_type,
        endian_mismatch,
        membership,
    ))
}
