//! Helpers shared across the crate.

mod compression;
mod synchronization;

pub use compression::{write_compressed_int, write_compressed_uint};
pub use synchronization::{ReentrantGuard, ReentrantLock};
