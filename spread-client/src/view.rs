//! View identifiers and virtual synchrony sets of membership messages.

use std::fmt;

use crate::error::{Error, Result};
use crate::group::GroupHandle;

/// Identifies one membership view of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId([i32; 3]);

impl ViewId {
    pub fn new(v0: i32, v1: i32, v2: i32) -> Self {
        Self([v0, v1, v2])
    }

    pub fn parts(&self) -> [i32; 3] {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.0[0], self.0[1], self.0[2])
    }
}

/// Members that went through the previous view together.
///
/// The set is filled once while a membership message is decoded and never
/// grows past the capacity it was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualSynchronySet {
    capacity: usize,
    members: Vec<GroupHandle>,
}

impl VirtualSynchronySet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            members: Vec::new(),
        }
    }

    pub(crate) fn add_member(&mut self, member: GroupHandle) -> Result<()> {
        if self.members.len() >= self.capacity {
            return Err(Error::SynchronySetFull(self.capacity));
        }
        self.members.push(member);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn members(&self) -> &[GroupHandle] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_ids_compare_by_value() {
        assert_eq!(ViewId::new(1, 2, 3), ViewId::new(1, 2, 3));
        assert_ne!(ViewId::new(1, 2, 3), ViewId::new(1, 2, 4));
        assert_eq!(ViewId::new(1, 2, 3).to_string(), "1 2 3");
    }

    #[test]
    fn sets_refuse_members_past_capacity() {
        let mut set = VirtualSynchronySet::with_capacity(2);
        set.add_member(GroupHandle::new("#a#d1")).unwrap();
        set.add_member(GroupHandle::new("#b#d1")).unwrap();

        assert!(matches!(
            set.add_member(GroupHandle::new("#c#d1")),
            Err(Error::SynchronySetFull(2))
        ));
        assert_eq!(set.len(), 2);
        assert_eq!(set.members()[1].name(), "#b#d1");
    }
}
