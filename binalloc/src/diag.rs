//! Accounting snapshots, invariant reports and the verbose logging switch.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::numeric::{Offset, Size};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Turns verbose allocator tracing on or off for the whole process.
///
/// Events are only emitted when the `tracing` feature is enabled as well.
#[inline]
pub fn set_logging(enable: bool) {
    VERBOSE.store(enable, Ordering::Relaxed);
}

#[inline]
pub fn logging() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

#[cfg(feature = "tracing")]
macro_rules! verbose {
    ($($arg:tt)*) => {{
        if $crate::diag::logging() {
            tracing::debug!($($arg)*);
        }
    }};
}

#[cfg(not(feature = "tracing"))]
macro_rules! verbose {
    ($($arg:tt)*) => {{
        if false {
            let _ = core::format_args!($($arg)*);
        }
    }};
}

/// A consistent view of an arena's accounting, taken under its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total_size: Size,
    pub used_size: Size,
    /// Size of the node at offset zero.
    pub head_size: Size,
    /// Completed `allocate` and `free` calls.
    pub op_count: u64,
    pub nodes: usize,
    pub free_nodes: usize,
    /// Largest free node, header included. Zero when nothing is free.
    pub largest_free: Size,
}

impl Stats {
    #[inline]
    pub const fn free_size(&self) -> Size {
        self.total_size - self.used_size
    }

    /// Whether the arena is back to a single free node spanning all of it.
    #[inline]
    pub const fn is_pristine(&self) -> bool {
        self.nodes == 1 && self.used_size == 0 && self.head_size == self.total_size
    }
}

impl core::fmt::Display for Stats {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "totalSize({}),usedSize({}),first-node-size({}),totalOps({})",
            self.total_size, self.used_size, self.head_size, self.op_count
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub offset: Offset,
    pub size: Size,
    pub free: bool,
}

/// The first broken invariant found by [`Arena::check`](crate::Arena::check).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A node does not start where its predecessor ends.
    Gap { offset: Offset, expected: Offset },
    /// A node's backward link does not point at its predecessor.
    BrokenLink { offset: Offset },
    /// A node header lost its validity marker.
    MissingMarker { offset: Offset },
    /// A node is too small to hold its own header, or runs past the arena.
    BadSize { offset: Offset, size: Size },
    /// Two neighbouring nodes are both free.
    AdjacentFree { offset: Offset },
    /// Node sizes do not add up to the arena capacity.
    Partition { covered: u64, total: Size },
    /// The used counter disagrees with the allocated nodes.
    Accounting { counted: u64, recorded: Size },
}

impl core::fmt::Display for Violation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Gap { offset, expected } => {
                write!(f, "node at {} should start at {}", offset, expected)
            }
            Self::BrokenLink { offset } => write!(f, "node at {} has a broken back link", offset),
            Self::MissingMarker { offset } => write!(f, "node at {} has no marker", offset),
            Self::BadSize { offset, size } => {
                write!(f, "node at {} has invalid size {}", offset, size)
            }
            Self::AdjacentFree { offset } => {
                write!(f, "node at {} and its successor are both free", offset)
            }
            Self::Partition { covered, total } => {
                write!(f, "nodes cover {} bytes of {}", covered, total)
            }
            Self::Accounting { counted, recorded } => {
                write!(f, "allocated nodes sum to {}, recorded {}", counted, recorded)
            }
        }
    }
}

impl core::error::Error for Violation {}
