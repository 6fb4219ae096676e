//! One arena for the whole process.
//!
//! [`init`] must run before any other call and [`teardown`] after the last
//! one has returned. Operations issued outside that window fail with
//! [`Error::Uninitialized`].

use core::ptr::NonNull;

use spin::RwLock;

use crate::arena::Error;
use crate::diag::Stats;
use crate::perlude::SpinArena;

static ARENA: RwLock<Option<SpinArena>> = RwLock::new(None);

/// Maps the global arena.
///
/// ## Panics
/// If the region cannot be mapped or the arena is already initialized.
/// Neither has a recovery path.
pub fn init(capacity: usize) {
    let mut slot = ARENA.write();
    assert!(slot.is_none(), "global arena initialized twice");
    match SpinArena::new(capacity) {
        Ok(arena) => *slot = Some(arena),
        Err(err) => panic!("failed to map global arena of {capacity} bytes: {err}"),
    }
}

/// Unmaps the global arena. A no-op when it was never initialized.
pub fn teardown() {
    let Some(arena) = ARENA.write().take() else {
        return;
    };
    if let Err(_err) = arena.teardown() {
        verbose!("[global]: teardown failed: {}", _err);
    }
}

#[inline]
pub fn is_initialized() -> bool {
    ARENA.read().is_some()
}

pub fn allocate(size: usize) -> Result<NonNull<u8>, Error> {
    ARENA
        .read()
        .as_ref()
        .ok_or(Error::Uninitialized)?
        .allocate(size)
}

pub fn free(ptr: *mut u8) -> Result<(), Error> {
    ARENA.read().as_ref().ok_or(Error::Uninitialized)?.free(ptr)
}

pub fn stats() -> Option<Stats> {
    ARENA.read().as_ref().map(SpinArena::stats)
}

pub fn log_stats() {
    if let Some(arena) = ARENA.read().as_ref() {
        arena.log_stats();
    }
}
