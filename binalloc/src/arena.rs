use alloc::vec::Vec;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crossbeam_utils::CachePadded;
use lock_api::{Mutex, RawMutex};
use memory_addr::{AddrRange, VirtAddr};

use crate::{
    bins::BinTable,
    diag::{NodeInfo, Stats, Violation},
    list::{HEAD, List},
    lock::SpinMutex,
    mem::{self, Backend, Region},
    node::NODE_SIZE,
    numeric::{Offset, Size, UInt},
    perlude::DefaultBackend,
};

pub const ARENA_MAX_CAPACITY: Size = UInt::MAX;

bitflags::bitflags! {
    /// Numeric status codes, one bit per failure kind.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ErrorCode: u8 {
        const SPLIT_NODE_NO_SIZE   = 0x1;
        const MEMORY_OUT_OF_BOUNDS = 0x2;
        const NODE_MAGIC_FAILED    = 0x4;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The request is larger than the largest size class.
    RequestTooLarge { requested: usize, bound: Size },
    /// No free node can hold the request right now.
    NodeUnavailable {
        /// The requested payload size
        requested: usize,
        /// Bytes the request needs, header included
        target: Size,
    },
    /// The chosen node could not host the rounded-up block.
    SplitInfeasible { target: Size, available: Size },
    /// The pointer does not belong to the arena's payload range.
    OutofBounds { addr: usize },
    /// The header in front of the pointer is not a live allocation.
    InvalidMarker { addr: usize },
    /// The global arena has not been initialized.
    Uninitialized,
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::SplitInfeasible { .. } => ErrorCode::SPLIT_NODE_NO_SIZE,
            Self::OutofBounds { .. } => ErrorCode::MEMORY_OUT_OF_BOUNDS,
            Self::InvalidMarker { .. } => ErrorCode::NODE_MAGIC_FAILED,
            Self::RequestTooLarge { .. } | Self::NodeUnavailable { .. } | Self::Uninitialized => {
                ErrorCode::empty()
            }
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::RequestTooLarge { requested, bound } => write!(
                f,
                "Allocation failed: requested size is {}, but the largest class is {}",
                requested, bound
            ),
            Self::NodeUnavailable { requested, target } => write!(
                f,
                "Allocation failed: no free node of {} bytes for request {}",
                target, requested
            ),
            Self::SplitInfeasible { target, available } => write!(
                f,
                "Split failed: node of {} bytes cannot host {}",
                available, target
            ),
            Self::OutofBounds { addr } => write!(f, "Pointer {:#x} is out of bounds", addr),
            Self::InvalidMarker { addr } => {
                write!(f, "Pointer {:#x} is not a live allocation", addr)
            }
            Self::Uninitialized => write!(f, "Arena is not initialized"),
        }
    }
}

impl core::error::Error for Error {}

#[derive(Debug)]
struct State {
    used: Size,
    ops: u64,
}

/// A fixed-capacity region serving `allocate`/`free` under one lock.
pub struct Arena<B: Backend = DefaultBackend, R: RawMutex = SpinMutex> {
    region: Region<B>,
    /// Addresses a payload pointer may take.
    span: AddrRange<VirtAddr>,
    bins: BinTable,
    state: CachePadded<Mutex<R, State>>,
}

impl<B: Backend, R: RawMutex> core::fmt::Debug for Arena<B, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("region", &self.region)
            .field("bins", &self.bins)
            .finish()
    }
}

pub struct ArenaBuilder<B: Backend, R: RawMutex = SpinMutex> {
    bk: B,
    bins: BinTable,
    _marker: PhantomData<R>,
}

impl<B: Backend, R: RawMutex> ArenaBuilder<B, R> {
    #[inline]
    pub const fn from_backend(bk: B) -> Self {
        Self {
            bk,
            bins: BinTable::DEFAULT,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn bins(self, bins: BinTable) -> Self {
        Self { bins, ..self }
    }

    /// Maps `capacity` bytes and installs one free node spanning them.
    pub fn build(self, capacity: usize) -> Result<Arena<B, R>, mem::Error<B>> {
        let Self { bk, bins, _marker } = self;

        if capacity < NODE_SIZE as usize {
            return Err(mem::Error::UnenoughSpace {
                requested: capacity,
                minimum: NODE_SIZE as usize,
            });
        }
        let total = Size::try_from(capacity).map_err(|_| mem::Error::OutofSize {
            requested: capacity,
            bound: ARENA_MAX_CAPACITY as usize,
        })?;

        let region = Region::map(bk, total)?;
        let base = region.base();
        // Safety: the region was just mapped and nobody else can see it yet.
        unsafe { List::new(base, total) }.install();

        let start = VirtAddr::from(base.as_ptr().addr() + NODE_SIZE as usize);
        let span = AddrRange::from_start_size(start, (total - NODE_SIZE) as usize);

        verbose!("[Arena]: init {} bytes at {:p}", total, base);

        Ok(Arena {
            region,
            span,
            bins,
            state: CachePadded::new(Mutex::new(State { used: 0, ops: 0 })),
        })
    }
}

impl<B: Backend + Default, R: RawMutex> Arena<B, R> {
    /// Maps an arena of `capacity` bytes with the default size classes.
    #[inline]
    pub fn new(capacity: usize) -> Result<Self, mem::Error<B>> {
        ArenaBuilder::from_backend(B::default()).build(capacity)
    }
}

impl<B: Backend, R: RawMutex> Arena<B, R> {
    /// ## Safety
    /// The caller must hold the state lock while using the returned list.
    #[inline]
    unsafe fn list(&self) -> List {
        unsafe { List::new(self.region.base(), self.region.size()) }
    }

    #[inline]
    fn payload(&self, off: Offset) -> NonNull<u8> {
        // Safety: every node offset plus its header lies inside the region.
        unsafe { self.region.base().add((off + NODE_SIZE) as usize) }
    }

    #[inline]
    pub fn capacity(&self) -> Size {
        self.region.size()
    }

    #[inline]
    pub fn bins(&self) -> &BinTable {
        &self.bins
    }

    #[inline]
    pub fn start_ptr(&self) -> *const u8 {
        self.region.base().as_ptr()
    }

    /// Whether `ptr` falls where a payload of this arena could start.
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        !ptr.is_null() && self.span.contains(VirtAddr::from(ptr.addr()))
    }

    /// Allocates a block for at least `size` bytes.
    ///
    /// The request is rounded up to its size class and served by the first
    /// free node large enough. The returned pointer is aligned to the node
    /// header, and stays valid until passed to [`free`](Self::free).
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, Error> {
        let bound = self.bins.max();
        if size > bound as usize {
            return Err(Error::RequestTooLarge {
                requested: size,
                bound,
            });
        }
        let target = self
            .bins
            .nearest(size)
            .checked_add(NODE_SIZE)
            .ok_or(Error::RequestTooLarge {
                requested: size,
                bound,
            })?;

        let mut state = self.state.lock();
        // Safety: `state` is held until the list is no longer used.
        let mut list = unsafe { self.list() };

        let Some(off) = list.find_fit(target) else {
            drop(state);
            verbose!("[Arena]: could not find available node with size ({})", size);
            return Err(Error::NodeUnavailable {
                requested: size,
                target,
            });
        };
        let taken = list.split(off, target).map_err(|e| Error::SplitInfeasible {
            target,
            available: e.available,
        })?;
        list.set_free(off, false);

        state.used += taken;
        state.ops += 1;
        drop(state);

        verbose!("[Arena]: allocate {} -> node {} ({} bytes)", size, off, taken);
        Ok(self.payload(off))
    }

    /// Returns a block obtained from [`allocate`](Self::allocate) and merges
    /// it with its free neighbours.
    ///
    /// Pointers that do not name a live allocation of this arena are
    /// rejected without touching any state. The check is best effort: a
    /// forged header that mimics a live node exactly is not detected.
    pub fn free(&self, ptr: *mut u8) -> Result<(), Error> {
        let addr = ptr.addr();
        if !self.contains(ptr) {
            return Err(Error::OutofBounds { addr });
        }
        let off = (addr - self.start_ptr().addr()) as Offset - NODE_SIZE;

        let mut state = self.state.lock();
        // Safety: `state` is held until the list is no longer used.
        let mut list = unsafe { self.list() };

        let node = list.validate(off).map_err(|_why| {
            verbose!("[Arena]: reject free of {:#x}: {:?}", addr, _why);
            Error::InvalidMarker { addr }
        })?;
        list.set_free(off, true);
        state.used -= node.size;
        let _joined = list.join(off);
        state.ops += 1;
        drop(state);

        verbose!("[Arena]: free node {} ({:?})", off, _joined);
        Ok(())
    }

    /// A consistent accounting snapshot.
    pub fn stats(&self) -> Stats {
        let state = self.state.lock();
        // Safety: `state` is held until the list is no longer used.
        let list = unsafe { self.list() };

        let mut stats = Stats {
            total_size: self.region.size(),
            used_size: state.used,
            head_size: list.node(HEAD).size,
            op_count: state.ops,
            nodes: 0,
            free_nodes: 0,
            largest_free: 0,
        };
        for (_, node) in list.iter() {
            stats.nodes += 1;
            if node.is_free() {
                stats.free_nodes += 1;
                stats.largest_free = stats.largest_free.max(node.size);
            }
        }
        stats
    }

    /// Every node in address order.
    pub fn nodes(&self) -> Vec<NodeInfo> {
        let _state = self.state.lock();
        // Safety: `_state` is held until the list is no longer used.
        unsafe { self.list() }.snapshot()
    }

    /// Verifies the partition, link and accounting invariants.
    pub fn check(&self) -> Result<(), Violation> {
        let state = self.state.lock();
        // Safety: `state` is held until the list is no longer used.
        unsafe { self.list() }.check(state.used)
    }

    /// Emits [`stats`](Self::stats) through the verbose log.
    pub fn log_stats(&self) {
        let _stats = self.stats();
        verbose!("{}", _stats);
    }

    /// Unmaps the region.
    ///
    /// Dropping the arena does the same, but swallows unmap errors.
    pub fn teardown(mut self) -> Result<(), mem::Error<B>> {
        verbose!("[Arena]: teardown {} bytes", self.region.size());
        self.region.unmap()
    }
}
