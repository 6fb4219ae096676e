#![cfg(test)]

use core::ptr::NonNull;
use std::sync::Once;

use lock_api::RawMutex;

use crate::diag::{self, NodeInfo};
use crate::mem::Backend;
use crate::Arena;


pub(crate) fn tracing_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        diag::set_logging(true);
    });
}

/// What a workload run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub allocated: usize,
    pub failed_allocs: usize,
    pub freed: usize,
    pub failed_frees: usize,
}

/// Replays `ops` against `arena`.
///
/// `objs` holds object sizes; `k` in `ops` allocates object `k` (1-based)
/// and `-k` frees it. A successful allocation gets its op index stamped
/// into the payload, which is checked again before the free.
pub(crate) fn run_workload<B: Backend, R: RawMutex>(
    arena: &Arena<B, R>,
    tid: usize,
    objs: &[usize],
    ops: &[i32],
) -> Outcome {
    let mut slots: Vec<Option<(NonNull<u8>, u32)>> = vec![None; objs.len()];
    let mut out = Outcome::default();

    for (i, op) in ops.iter().copied().enumerate() {
        let obj = op.unsigned_abs() as usize - 1;
        let size = objs[obj];
        if op > 0 {
            match arena.allocate(size) {
                Ok(ptr) => {
                    let stamp = (i + 200) as u32;
                    unsafe { ptr.as_ptr().cast::<u32>().write(stamp) };
                    slots[obj] = Some((ptr, stamp));
                    out.allocated += 1;
                }
                Err(_err) => {
                    tracing::debug!("[{}] op {}: allocate {} failed: {}", tid, i, size, _err);
                    out.failed_allocs += 1;
                }
            }
        } else {
            let ptr = match slots[obj].take() {
                Some((ptr, stamp)) => {
                    assert_eq!(unsafe { ptr.as_ptr().cast::<u32>().read() }, stamp);
                    ptr.as_ptr()
                }
                None => core::ptr::null_mut(),
            };
            match arena.free(ptr) {
                Ok(()) => out.freed += 1,
                Err(_err) => {
                    tracing::debug!("[{}] op {}: free failed: {}", tid, i, _err);
                    out.failed_frees += 1;
                }
            }
        }
    }
    out
}

/// Asserts the arena is back to one free node spanning all of it.
pub(crate) fn assert_pristine<B: Backend, R: RawMutex>(arena: &Arena<B, R>) {
    arena.check().expect("invariants should hold");
    let stats = arena.stats();
    assert!(stats.is_pristine(), "not pristine: {:?}", stats);
    assert_eq!(
        arena.nodes(),
        [NodeInfo {
            offset: 0,
            size: arena.capacity(),
            free: true,
        }]
    );
}
