#![doc = include_str!("../README.md")]

mod config;
mod dispatcher;
mod error;
mod handle;
mod job;
mod lifecycle;
mod orderer;
pub mod pool;
pub mod queue;
mod select;
#[cfg(feature = "async-tokio")]
mod stream;
mod window;

pub use crate::config::*;
pub use crate::dispatcher::Dispatcher;
pub use crate::error::*;
pub use crate::handle::*;
pub use crate::job::{Compute, Job, JobError, JobResult};
pub use crate::lifecycle::PoolState;
pub use crate::orderer::*;
pub use crate::queue::{ClosableQueue, Notifier, PushError, TryPop};
pub use crate::select::Select;
#[cfg(feature = "async-tokio")]
pub use crate::stream::OrderedStream;
