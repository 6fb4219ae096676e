//! Where arena memory comes from.

use core::alloc::Layout;
use core::ptr::NonNull;

use crate::numeric::Size;

/// A source of zero-initialized, contiguous memory regions.
pub trait Backend: Sized {
    type Error: core::fmt::Debug;

    /// Maps a zeroed region of exactly `size` bytes.
    fn map(&self, size: usize) -> Result<NonNull<u8>, Self::Error>;

    /// Releases a region returned by [`map`](Self::map).
    ///
    /// ## Safety
    /// `start` and `size` must describe a live region mapped by this backend,
    /// and nothing may access it afterwards.
    unsafe fn unmap(&self, start: NonNull<u8>, size: usize) -> Result<(), Self::Error>;
}

pub enum Error<B: Backend> {
    OutofSize { requested: usize, bound: usize },
    UnenoughSpace { requested: usize, minimum: usize },
    MapError(B::Error),
}

impl<B: Backend> core::error::Error for Error<B> {}

impl<B: Backend> core::fmt::Debug for Error<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutofSize { requested, bound } => write!(
                f,
                "Out of upper bounded size, requested {}, upper bound {}",
                requested, bound
            ),
            Self::UnenoughSpace { requested, minimum } => write!(
                f,
                "Not enough space for a node, requested {}, minimum {}",
                requested, minimum
            ),
            Self::MapError(err) => write!(f, "Mapping error: {:?}", err),
        }
    }
}

impl<B: Backend> core::fmt::Display for Error<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

/// The mapped region behind an arena. Unmapped on drop.
pub(crate) struct Region<B: Backend> {
    base: NonNull<u8>,
    size: Size,
    mapped: bool,
    bk: B,
}

// Safety: the region is plain memory. Headers are only touched while the
// owning arena's lock is held, payloads only by whoever allocated them.
unsafe impl<B: Backend + Send> Send for Region<B> {}
unsafe impl<B: Backend + Sync> Sync for Region<B> {}

impl<B: Backend> core::fmt::Debug for Region<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Region")
            .field("base", &self.base)
            .field("size", &self.size)
            .field("mapped", &self.mapped)
            .finish()
    }
}

impl<B: Backend> Region<B> {
    pub fn map(bk: B, size: Size) -> Result<Self, Error<B>> {
        let base = bk.map(size as usize).map_err(Error::MapError)?;
        Ok(Self {
            base,
            size,
            mapped: true,
            bk,
        })
    }

    #[inline]
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[inline]
    pub const fn size(&self) -> Size {
        self.size
    }

    pub fn unmap(&mut self) -> Result<(), Error<B>> {
        if !self.mapped {
            return Ok(());
        }
        self.mapped = false;
        // Safety: `base..base + size` was mapped by `bk` and is only unmapped once.
        unsafe { self.bk.unmap(self.base, self.size as usize) }.map_err(Error::MapError)
    }
}

impl<B: Backend> Drop for Region<B> {
    fn drop(&mut self) {
        if let Err(_err) = self.unmap() {
            #[cfg(feature = "tracing")]
            tracing::debug!("[Region]: unmap failed: {:?}", _err);
        }
    }
}

/// Regions taken from the global allocator.
///
/// Used when no OS mapping backend is compiled in, and by tests that want
/// an arena without touching `mmap`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    Layout { size: usize },
    Exhausted { size: usize },
}

impl HeapBackend {
    const ALIGN: usize = 16;

    #[inline]
    fn layout(size: usize) -> Result<Layout, HeapError> {
        if size == 0 {
            return Err(HeapError::Layout { size });
        }
        Layout::from_size_align(size, Self::ALIGN).map_err(|_| HeapError::Layout { size })
    }
}

impl Backend for HeapBackend {
    type Error = HeapError;

    fn map(&self, size: usize) -> Result<NonNull<u8>, Self::Error> {
        let layout = Self::layout(size)?;
        // Safety: `layout` has a non-zero size.
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or(HeapError::Exhausted { size })
    }

    unsafe fn unmap(&self, start: NonNull<u8>, size: usize) -> Result<(), Self::Error> {
        let layout = Self::layout(size)?;
        unsafe { alloc::alloc::dealloc(start.as_ptr(), layout) };
        Ok(())
    }
}
