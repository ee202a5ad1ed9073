//! Async notification delivery: an in-process queue, a worker that runs the
//! send pipeline, and a periodic sweep that retries anything left scheduled.

pub mod queue;
pub mod sweep;
pub mod worker;

pub use queue::Dispatcher;
pub use sweep::{run_sweep, sweep_once};
pub use worker::Worker;
