//! A fixed-capacity, bin-classed, coalescing allocator.
//!
//! An [`Arena`] maps one contiguous region up front and carves it into
//! header-prefixed nodes. Every node is either free or allocated, and the
//! nodes form a doubly linked list that partitions the region end to end:
//!
//! ```text
//!  base                                                     base + capacity
//!  +--------+---------+--------+-----------+--------+-------------------+
//!  | header | payload | header |  payload  | header |      payload      |
//!  +--------+---------+--------+-----------+--------+-------------------+
//!  |<-- allocated  -->|<----- allocated --->|<-------- free ----------->|
//! ```
//!
//! Requests are rounded up to a size class from a [`BinTable`], served by a
//! first-fit scan that splits the chosen node, and released nodes are merged
//! back with their free neighbours. All structural mutation happens under a
//! single lock per arena.
//!
//! For a single process-wide arena see [`global`].
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[cfg(feature = "tracing")]
extern crate tracing;

#[macro_use]
pub mod diag;

mod arena;
pub mod bins;
mod list;
pub mod mem;
mod node;
pub mod os;
pub mod perlude;
pub mod global;
mod tests;

pub use arena::{Arena, ArenaBuilder, Error, ErrorCode};
pub use bins::BinTable;
pub use diag::{NodeInfo, Stats, Violation};
pub use node::NODE_SIZE;

pub mod lock {
    pub type SpinMutex = spin::Mutex<()>;
}

mod numeric {
    pub type UInt = u32;

    /// Byte offset of a node header from the arena base.
    pub type Offset = UInt;
    /// Byte length of a node, header included.
    pub type Size = UInt;

    pub const SENTINEL_OFFSET: Offset = UInt::MAX;

    #[inline]
    pub const fn link(off: Offset) -> Option<Offset> {
        if off == SENTINEL_OFFSET {
            None
        } else {
            Some(off)
        }
    }

    #[inline]
    pub const fn unlink(off: Option<Offset>) -> Offset {
        match off {
            Some(off) => off,
            None => SENTINEL_OFFSET,
        }
    }
}

pub use numeric::{Offset, Size, UInt};
