use core::mem;

use crate::numeric::{Offset, SENTINEL_OFFSET, Size, link, unlink};

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u32 {
        const FREE  = 0x1;
        /// Present on every header this allocator writes.
        const MAGIC = 0xba << 16;
    }
}

/// Header placed in front of every block inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub(crate) struct Node {
    pub next: Offset,
    pub prev: Offset,
    /// Header plus payload.
    pub size: Size,
    pub flags: NodeFlags,
}

/// Bytes taken by a node header. Payload pointers sit this far past the header.
pub const NODE_SIZE: Size = mem::size_of::<Node>() as Size;
pub(crate) const NODE_ALIGN: Size = mem::align_of::<Node>() as Size;

impl Node {
    #[inline]
    pub const fn free(size: Size, prev: Option<Offset>, next: Option<Offset>) -> Self {
        Self {
            next: unlink(next),
            prev: unlink(prev),
            size,
            flags: NodeFlags::FREE.union(NodeFlags::MAGIC),
        }
    }

    /// A header with no flags at all, written over absorbed nodes.
    #[inline]
    pub const fn retired() -> Self {
        Self {
            next: SENTINEL_OFFSET,
            prev: SENTINEL_OFFSET,
            size: 0,
            flags: NodeFlags::empty(),
        }
    }

    #[inline]
    pub const fn next(&self) -> Option<Offset> {
        link(self.next)
    }

    #[inline]
    pub const fn prev(&self) -> Option<Offset> {
        link(self.prev)
    }

    #[inline]
    pub const fn is_free(&self) -> bool {
        self.flags.contains(NodeFlags::FREE)
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.flags.contains(NodeFlags::MAGIC)
    }

    #[inline]
    pub fn set_free(&mut self, free: bool) {
        self.flags.set(NodeFlags::FREE, free);
    }

    #[inline]
    pub const fn payload_size(&self) -> Size {
        self.size.saturating_sub(NODE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        assert_eq!(NODE_SIZE, 16);
        assert_eq!(NODE_ALIGN, 4);
        assert_eq!(NodeFlags::MAGIC.bits(), 0x00ba_0000);
    }

    #[test]
    fn flags() {
        let mut node = Node::free(64, None, Some(64));
        assert!(node.is_free() && node.is_valid());
        assert_eq!(node.prev(), None);
        assert_eq!(node.next(), Some(64));
        assert_eq!(node.payload_size(), 48);

        node.set_free(false);
        assert!(!node.is_free());
        assert!(node.is_valid());

        let gone = Node::retired();
        assert!(!gone.is_valid());
        assert!(!gone.is_free());
    }

    #[test]
    fn partial_marker_is_invalid() {
        // 0x0a << 16 shares bits with the marker but is not the marker
        let node = Node {
            next: SENTINEL_OFFSET,
            prev: SENTINEL_OFFSET,
            size: 32,
            flags: NodeFlags::from_bits_retain(0x0a << 16),
        };
        assert!(!node.is_valid());
    }
}
