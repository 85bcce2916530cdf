//! Big-endian integer and group-name field codec.
//!
//! Integers travel as 4-byte big-endian words. A producer whose byte order
//! differs from ours tags the service-type word with [`ENDIAN_TYPE`]; the
//! receiver then flips every integer field of that frame. Payload bytes are
//! never touched.

use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::group::GroupHandle;
use crate::protocol::MAX_GROUP_NAME;

/// Tag bits set on a word written in the opposite byte order.
pub const ENDIAN_TYPE: i32 = 0x8000_0080_u32 as i32;

/// True when `word` carries no endian tag, i.e. it was written in our order.
pub fn same_endian(word: i32) -> bool {
    word & ENDIAN_TYPE == 0
}

pub fn clear_endian(word: i32) -> i32 {
    word & !ENDIAN_TYPE
}

pub fn flip32(value: i32) -> i32 {
    value.swap_bytes()
}

pub fn flip16(value: i16) -> i16 {
    value.swap_bytes()
}

pub fn put_i32<B: BufMut>(buf: &mut B, value: i32) {
    buf.put_i32(value);
}

/// Reads one big-endian word, failing instead of panicking on a short buffer.
pub fn get_i32<B: Buf>(buf: &mut B, field: &'static str) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(Error::ConnectionClosed(field));
    }
    Ok(buf.get_i32())
}

/// Writes `group` as a fixed [`MAX_GROUP_NAME`]-byte field, zero filled.
pub fn put_group_field<B: BufMut>(buf: &mut B, group: &GroupHandle) {
    let name = group.to_latin1();
    let len = name.len().min(MAX_GROUP_NAME);
    buf.put_slice(&name[..len]);
    buf.put_bytes(0, MAX_GROUP_NAME - len);
}

/// Reads a fixed-width group field; the name ends at the first zero byte.
pub fn get_group_field<B: Buf>(buf: &mut B, field: &'static str) -> Result<GroupHandle> {
    if buf.remaining() < MAX_GROUP_NAME {
        return Err(Error::ConnectionClosed(field));
    }
    let mut raw = [0u8; MAX_GROUP_NAME];
    buf.copy_to_slice(&mut raw);
    let end = raw.iter().position(|&b| b == 0).unwrap_or(MAX_GROUP_NAME);
    Ok(GroupHandle::from_latin1(&raw[..end]))
}
