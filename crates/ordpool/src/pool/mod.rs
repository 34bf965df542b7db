//! Fixed-size pool of worker threads.
//!
//! - [`manager`]: spawning and joining the workers ([`WorkerPool`]).
//! - [`worker`]: the per-thread job loop.

pub mod manager;
pub(crate) mod worker;

pub use manager::WorkerPool;
