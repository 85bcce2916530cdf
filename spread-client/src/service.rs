//! Service-type bit field carried in the first word of every frame.

use bitflags::bitflags;

bitflags! {
    /// Delivery guarantee and message class bits.
    ///
    /// The low six bits are the reliability levels and are mutually
    /// exclusive; the membership bits describe daemon generated view
    /// changes; `JOIN`, `LEAVE`, `KILL` and `GROUPS` are requests the client
    /// sends on its own behalf.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ServiceType: u32 {
        const UNRELIABLE = 0x0000_0001;
        const RELIABLE = 0x0000_0002;
        const FIFO = 0x0000_0004;
        const CAUSAL = 0x0000_0008;
        const AGREED = 0x0000_0010;
        const SAFE = 0x0000_0020;
        const REGULAR = 0x0000_003f;

        const SELF_DISCARD = 0x0000_0040;

        const CAUSED_BY_JOIN = 0x0000_0100;
        const CAUSED_BY_LEAVE = 0x0000_0200;
        const CAUSED_BY_DISCONNECT = 0x0000_0400;
        const CAUSED_BY_NETWORK = 0x0000_0800;
        const REG_MEMB = 0x0000_1000;
        const TRANSITION = 0x0000_2000;
        const MEMBERSHIP = 0x0000_3f00;

        const JOIN = 0x0001_0000;
        const LEAVE = 0x0002_0000;
        const KILL = 0x0004_0000;
        const GROUPS = 0x0008_0000;

        const REJECT = 0x0040_0000;
    }
}

impl ServiceType {
    /// Bits only the client itself may put on the wire.
    pub const INTERNAL: ServiceType = ServiceType::JOIN
        .union(ServiceType::LEAVE)
        .union(ServiceType::KILL)
        .union(ServiceType::GROUPS);

    /// Wire representation.
    pub fn to_wire(self) -> i32 {
        self.bits() as i32
    }

    /// Keeps every bit, known or not.
    pub fn from_wire(value: i32) -> Self {
        Self::from_bits_retain(value as u32)
    }

    /// A data message with a reliability level that is not a reject notice.
    pub fn is_regular(self) -> bool {
        self.intersects(Self::REGULAR) && !self.contains(Self::REJECT)
    }

    pub fn is_membership(self) -> bool {
        self.intersects(Self::MEMBERSHIP) && !self.contains(Self::REJECT)
    }

    pub fn is_reject(self) -> bool {
        self.contains(Self::REJECT)
    }

    /// The reliability level, if exactly one is set.
    pub fn reliability(self) -> Option<Reliability> {
        Reliability::ALL
            .into_iter()
            .find(|level| self.intersection(Self::REGULAR) == level.flag())
    }

    /// Replaces whatever reliability level is set with `level`.
    pub fn with_reliability(self, level: Reliability) -> Self {
        self.difference(Self::REGULAR).union(level.flag())
    }
}

/// Ordering and delivery guarantee requested for a regular message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reliability {
    Unreliable,
    Reliable,
    Fifo,
    Causal,
    Agreed,
    Safe,
}

impl Reliability {
    pub const ALL: [Reliability; 6] = [
        Reliability::Unreliable,
        Reliability::Reliable,
        Reliability::Fifo,
        Reliability::Causal,
        Reliability::Agreed,
        Reliability::Safe,
    ];

    pub fn flag(self) -> ServiceType {
        match self {
            Reliability::Unreliable => ServiceType::UNRELIABLE,
            Reliability::Reliable => ServiceType::RELIABLE,
            Reliability::Fifo => ServiceType::FIFO,
            Reliability::Causal => ServiceType::CAUSAL,
            Reliability::Agreed => ServiceType::AGREED,
            Reliability::Safe => ServiceType::SAFE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_a_level_clears_the_previous_one() {
        let service = ServiceType::RELIABLE | ServiceType::SELF_DISCARD;
        let safe = service.with_reliability(Reliability::Safe);

        assert!(safe.contains(ServiceType::SAFE));
        assert!(!safe.contains(ServiceType::RELIABLE));
        assert!(safe.contains(ServiceType::SELF_DISCARD));
        assert_eq!(safe.reliability(), Some(Reliability::Safe));
    }

    #[test]
    fn classes_exclude_rejects() {
        let reject = ServiceType::REJECT | ServiceType::AGREED;
        assert!(reject.is_reject());
        assert!(!reject.is_regular());

        let membership = ServiceType::REG_MEMB | ServiceType::CAUSED_BY_JOIN;
        assert!(membership.is_membership());
        assert!(!membership.is_regular());
        assert!(!(membership | ServiceType::REJECT).is_membership());
    }

    #[test]
    fn unknown_bits_survive_the_wire() {
        let raw = 0x0100_0002;
        assert_eq!(ServiceType::from_wire(raw).to_wire(), raw);
    }
}
