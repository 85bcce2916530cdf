//! Decoding of daemon generated membership (view change) messages.
//!
//! A regular membership payload looks like this, every integer being a
//! 4-byte word flipped as a unit when the frame was tagged with the other
//! byte order:
//!
//! ```text
//! view id (3 words) | set count | offset of local set | set 0 | set 1 | ...
//! set = member count | member count x 32-byte group field
//! ```
//!
//! The offset of the local set is measured in bytes from the start of set 0.

use bytes::Buf;

use crate::codec::{flip32, get_group_field, get_i32};
use crate::error::{Error, Result};
use crate::group::GroupHandle;
use crate::protocol::MAX_GROUP_NAME;
use crate::service::ServiceType;
use crate::view::{ViewId, VirtualSynchronySet};

/// Why a membership message was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MembershipCause {
    Join,
    Leave,
    Disconnect,
    Network,
    /// Announces that a regular membership change is coming.
    Transition,
    /// This connection left the group; no view follows.
    SelfLeave,
}

impl MembershipCause {
    fn from_service_type(service_type: ServiceType) -> Result<Self> {
        if service_type.contains(ServiceType::REG_MEMB) {
            if service_type.contains(ServiceType::CAUSED_BY_JOIN) {
                Ok(Self::Join)
            } else if service_type.contains(ServiceType::CAUSED_BY_LEAVE) {
                Ok(Self::Leave)
            } else if service_type.contains(ServiceType::CAUSED_BY_DISCONNECT) {
                Ok(Self::Disconnect)
            } else if service_type.contains(ServiceType::CAUSED_BY_NETWORK) {
                Ok(Self::Network)
            } else {
                Err(Error::MalformedMembership("regular membership without a cause"))
            }
        } else if service_type.contains(ServiceType::TRANSITION) {
            Ok(Self::Transition)
        } else if service_type.contains(ServiceType::CAUSED_BY_LEAVE) {
            Ok(Self::SelfLeave)
        } else {
            Err(Error::MalformedMembership("unknown membership class"))
        }
    }

    /// Join, leave, disconnect and network changes install a new view.
    pub fn is_regular(self) -> bool {
        matches!(
            self,
            Self::Join | Self::Leave | Self::Disconnect | Self::Network
        )
    }
}

/// The decoded contents of a membership message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipInfo {
    service_type: ServiceType,
    cause: MembershipCause,
    group: GroupHandle,
    view_id: Option<ViewId>,
    members: Option<Vec<GroupHandle>>,
    sets: Vec<VirtualSynchronySet>,
    local_set: Option<usize>,
}

impl MembershipInfo {
    /// Builds the membership view carried by one incoming frame.
    ///
    /// `group` is the frame's sender field (the group whose view changed),
    /// `members` its group list and `daemon_endian_mismatch` whether the
    /// frame header had to be flipped.
    pub(crate) fn decode(
        service_type: ServiceType,
        group: GroupHandle,
        members: &[GroupHandle],
        payload: &[u8],
        daemon_endian_mismatch: bool,
    ) -> Result<Self> {
        let cause = MembershipCause::from_service_type(service_type)?;

        let mut info = Self {
            service_type,
            cause,
            group,
            view_id: None,
            members: None,
            sets: Vec::new(),
            local_set: None,
        };
        if !cause.is_regular() {
            return Ok(info);
        }

        let mut reader = WordReader {
            buf: payload,
            flip: daemon_endian_mismatch,
        };
        let view_id = ViewId::new(reader.word()?, reader.word()?, reader.word()?);
        let num_sets = reader.count()?;
        let local_offset = reader.word()?;

        let sets_start = reader.buf.remaining();
        let mut sets = Vec::new();
        let mut local_set = None;
        for index in 0..num_sets {
            let offset = sets_start - reader.buf.remaining();
            let member_count = reader.count()?;
            if member_count > reader.buf.remaining() / MAX_GROUP_NAME {
                return Err(Error::MalformedMembership("set larger than payload"));
            }

            let mut set = VirtualSynchronySet::with_capacity(member_count);
            for _ in 0..member_count {
                set.add_member(get_group_field(&mut reader.buf, "synchrony set member")?)?;
            }
            if cause == MembershipCause::Network && i64::from(local_offset) == offset as i64 {
                local_set = Some(index);
            }
            sets.push(set);
        }

        info.view_id = Some(view_id);
        info.members = Some(members.to_vec());
        info.sets = sets;
        info.local_set = local_set;
        Ok(info)
    }

    pub fn cause(&self) -> MembershipCause {
        self.cause
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    /// The group whose membership changed.
    pub fn group(&self) -> &GroupHandle {
        &self.group
    }

    /// Identifier of the new view; `None` for transitional and self-leave
    /// messages.
    pub fn view_id(&self) -> Option<ViewId> {
        self.view_id
    }

    /// Private groups of every member in the new view, in daemon order.
    pub fn members(&self) -> Option<&[GroupHandle]> {
        self.members.as_deref()
    }

    pub fn is_regular_membership(&self) -> bool {
        self.cause.is_regular()
    }

    pub fn is_transition(&self) -> bool {
        self.cause == MembershipCause::Transition
    }

    pub fn is_caused_by_join(&self) -> bool {
        self.cause == MembershipCause::Join
    }

    pub fn is_caused_by_leave(&self) -> bool {
        self.cause == MembershipCause::Leave
    }

    pub fn is_caused_by_disconnect(&self) -> bool {
        self.cause == MembershipCause::Disconnect
    }

    pub fn is_caused_by_network(&self) -> bool {
        self.cause == MembershipCause::Network
    }

    pub fn is_self_leave(&self) -> bool {
        self.cause == MembershipCause::SelfLeave
    }

    /// The member that joined, for a join caused view.
    pub fn joined(&self) -> Option<&GroupHandle> {
        self.changed_member(MembershipCause::Join)
    }

    /// The member that left, for a leave caused view.
    pub fn left(&self) -> Option<&GroupHandle> {
        self.changed_member(MembershipCause::Leave)
    }

    /// The member that disconnected, for a disconnect caused view.
    pub fn disconnected(&self) -> Option<&GroupHandle> {
        self.changed_member(MembershipCause::Disconnect)
    }

    /// Members that came through a network change together with us.
    pub fn stayed(&self) -> Option<&[GroupHandle]> {
        self.my_virtual_synchrony_set().map(VirtualSynchronySet::members)
    }

    /// Every synchrony set of a network caused view.
    pub fn virtual_synchrony_sets(&self) -> Option<&[VirtualSynchronySet]> {
        (self.cause == MembershipCause::Network).then_some(self.sets.as_slice())
    }

    /// The synchrony set this connection belongs to, for a network caused
    /// view.
    pub fn my_virtual_synchrony_set(&self) -> Option<&VirtualSynchronySet> {
        self.local_set.and_then(|index| self.sets.get(index))
    }

    fn changed_member(&self, cause: MembershipCause) -> Option<&GroupHandle> {
        if self.cause != cause {
            return None;
        }
        self.sets.first().and_then(|set| set.members().first())
    }
}

struct WordReader<'a> {
    buf: &'a [u8],
    flip: bool,
}

impl WordReader<'_> {
    fn word(&mut self) -> Result<i32> {
        let word = get_i32(&mut self.buf, "membership payload")
            .map_err(|_| Error::MalformedMembership("payload truncated"))?;
        Ok(if self.flip { flip32(word) } else { word })
    }

    fn count(&mut self) -> Result<usize> {
        usize::try_from(self.word()?).map_err(|_| Error::MalformedMembership("negative count"))
    }
}
