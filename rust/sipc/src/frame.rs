//! Outbound framing.

use crate::header::{END_BYTE, Header, MAX_HEADER_LEN, START_BYTE};

/// Bytes framing adds in front of a payload (start byte plus header).
pub const MAX_FRAME_HEADROOM: usize = 1 + MAX_HEADER_LEN;
/// Bytes framing adds after a payload.
pub const FRAME_TAILROOM: usize = 1;

/// Frame `payload` with `header` into a fresh buffer.
///
/// The header's declared length must already match `payload`.
pub fn encode(header: &Header, payload: &[u8]) -> Vec<u8> {
    let (bytes, size) = header.to_bytes();
    let mut out = Vec::with_capacity(1 + size + payload.len() + FRAME_TAILROOM);
    out.push(START_BYTE);
    out.extend_from_slice(&bytes[..size]);
    out.extend_from_slice(payload);
    out.push(END_BYTE);
    out
}

/// A byte buffer with reserved room in front of and behind its contents,
/// so framing can be added without copying the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameBuf {
    buf: Vec<u8>,
    start: usize,
}

impl FrameBuf {
    /// Copy `payload` into a buffer with at least the requested room.
    pub fn with_room(payload: &[u8], headroom: usize, tailroom: usize) -> Self {
        let mut buf = Vec::with_capacity(headroom + payload.len() + tailroom);
        buf.resize(headroom, 0);
        buf.extend_from_slice(payload);
        Self {
            buf,
            start: headroom,
        }
    }

    /// Take ownership of `bytes` without any headroom.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            buf: bytes,
            start: 0,
        }
    }

    #[inline]
    pub fn headroom(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn tailroom(&self) -> usize {
        self.buf.capacity() - self.buf.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    /// Make sure at least `headroom` and `tailroom` bytes are available,
    /// copying into a new allocation only when the current one is short.
    ///
    /// Returns true if the contents moved.
    pub fn ensure_room(&mut self, headroom: usize, tailroom: usize) -> bool {
        if self.headroom() >= headroom && self.tailroom() >= tailroom {
            return false;
        }
        *self = FrameBuf::with_room(self.as_slice(), headroom, tailroom);
        true
    }

    /// Prepend `bytes` into the headroom. Panics if the headroom is short.
    pub fn push_front(&mut self, bytes: &[u8]) {
        assert!(
            bytes.len() <= self.start,
            "push_front of {} bytes with {} bytes of headroom",
            bytes.len(),
            self.start
        );
        self.start -= bytes.len();
        self.buf[self.start..self.start + bytes.len()].copy_from_slice(bytes);
    }

    /// Append `bytes`, growing the allocation if the tailroom is short.
    pub fn put(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Wrap the contents in `START | header | ... | END` in place.
    ///
    /// The header's declared length must match the current contents.
    pub fn frame_in_place(&mut self, header: &Header) {
        let (bytes, size) = header.to_bytes();
        self.ensure_room(1 + size, FRAME_TAILROOM);
        self.push_front(&bytes[..size]);
        self.push_front(&[START_BYTE]);
        self.put(&[END_BYTE]);
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        if self.start > 0 {
            self.buf.drain(..self.start);
        }
        self.buf
    }
}

impl From<Vec<u8>> for FrameBuf {
    fn from(bytes: Vec<u8>) -> Self {
        FrameBuf::from_vec(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_payload_still_carries_delimiters() {
        let frame = encode(&Header::fmt(0, 0), &[]);
        assert_eq!(frame, [START_BYTE, 3, 0, 0, END_BYTE]);
    }

    #[test]
    fn framing_in_place_uses_existing_room() {
        let mut buf = FrameBuf::with_room(b"ping", MAX_FRAME_HEADROOM, FRAME_TAILROOM);
        let before = buf.as_slice().as_ptr();
        assert!(!buf.ensure_room(MAX_FRAME_HEADROOM, FRAME_TAILROOM));
        buf.frame_in_place(&Header::raw(4, 0x2a));

        assert_eq!(buf.headroom(), 0);
        assert_eq!(unsafe { buf.as_slice().as_ptr().add(7) }, before);
        assert_eq!(buf.into_vec(), encode(&Header::raw(4, 0x2a), b"ping"));
    }

    #[test]
    fn framing_without_room_copies_once() {
        let mut buf = FrameBuf::from_vec(b"pong".to_vec());
        assert!(buf.ensure_room(MAX_FRAME_HEADROOM, FRAME_TAILROOM));
        assert_eq!(buf.as_slice(), b"pong");
        buf.frame_in_place(&Header::raw(4, 3));
        assert_eq!(buf.as_slice(), &encode(&Header::raw(4, 3), b"pong")[..]);
    }

    #[test]
    #[should_panic(expected = "headroom")]
    fn push_front_without_headroom_panics() {
        FrameBuf::from_vec(vec![1]).push_front(&[0]);
    }
}
