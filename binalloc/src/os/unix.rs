#![cfg(all(unix, feature = "unix"))]

use core::{ffi::c_void, num::NonZeroUsize, ptr::NonNull};
pub use nix::sys::mman::{MapFlags, ProtFlags};

use crate::mem::Backend;

/// Anonymous private mappings straight from the kernel.
///
/// Pages come back zero-filled and are only returned on teardown.
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapBackend;

impl Backend for MmapBackend {
    type Error = nix::Error;

    fn map(&self, size: usize) -> Result<NonNull<u8>, Self::Error> {
        use nix::sys::mman;

        let size = NonZeroUsize::new(size).ok_or(nix::Error::EINVAL)?;
        let pflags = ProtFlags::PROT_READ | ProtFlags::PROT_WRITE;
        let mflags = MapFlags::MAP_PRIVATE;

        let ptr = unsafe { mman::mmap_anonymous(None, size, pflags, mflags)? };
        Ok(ptr.cast())
    }

    unsafe fn unmap(&self, start: NonNull<u8>, size: usize) -> Result<(), Self::Error> {
        let start: NonNull<c_void> = start.cast();
        unsafe { nix::sys::mman::munmap(start, size) }
    }
}
