#![cfg(feature = "std")]

#[cfg(all(unix, feature = "unix"))]
pub mod unix;
