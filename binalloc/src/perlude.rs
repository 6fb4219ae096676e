pub use crate::arena::{Arena, ArenaBuilder, Error, ErrorCode};
pub use crate::bins::BinTable;
pub use crate::diag::{Stats, set_logging};
pub use crate::lock::SpinMutex;
pub use crate::mem::{Backend, HeapBackend};

#[cfg(all(unix, feature = "unix"))]
pub use crate::os::unix::MmapBackend;

/// Backend used by [`Arena::new`] and the [`global`](crate::global) arena.
#[cfg(all(unix, feature = "unix"))]
pub type DefaultBackend = crate::os::unix::MmapBackend;
#[cfg(not(all(unix, feature = "unix")))]
pub type DefaultBackend = crate::mem::HeapBackend;

pub type SpinArena<B = DefaultBackend> = Arena<B, SpinMutex>;
pub type HeapArena = Arena<HeapBackend, SpinMutex>;
