//! Worker runtime primitives for the repository facade.
//!
//! Provides task classification, runtime ownership, supervised spawning with
//! panic capture, a drain gate that tracks in-flight work, and an exclusive
//! execution context for thread-affine host calls.

mod class;
mod exclusive;
mod gate;
mod panic;
mod runtime;
mod spawn;

pub use class::TaskClass;
pub use exclusive::{DedicatedThread, ExclusiveContext, ExclusiveError, ExclusiveJob, run_exclusive};
pub use gate::{GateStats, TaskGate};
pub use panic::{join_error_panic_message, panic_payload_message};
pub use runtime::WorkerRuntime;
pub use spawn::{spawn_named_thread, spawn_thread};
