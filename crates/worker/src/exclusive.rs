//! Exclusive execution context for thread-affine host APIs.
//!
//! Some host calls are only valid on one distinguished thread. Callers depend
//! on the [`ExclusiveContext`] capability rather than on a threading primitive;
//! [`run_exclusive`] marshals a closure onto the context and awaits its
//! result. [`DedicatedThread`] is the stock implementation: one named OS thread
//! draining a job queue in submission order.
//!
//! Caller tracing spans are propagated onto the exclusive thread so host-side
//! logs nest under the span that requested the work.

use std::panic::AssertUnwindSafe;
use std::sync::mpsc;
use std::thread::ThreadId;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::TaskClass;
use crate::panic::panic_payload_message;
use crate::spawn::spawn_named_thread;

/// Unit of work marshalled onto an exclusive context.
pub type ExclusiveJob = Box<dyn FnOnce() + Send + 'static>;

/// Failure to run work on an exclusive context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExclusiveError {
	/// The context no longer accepts work, or dropped the job unrun.
	#[error("exclusive execution context is closed")]
	Closed,
	/// The job panicked while running on the context.
	#[error("exclusive job panicked: {0}")]
	Panicked(String),
}

/// Capability to run jobs on a single exclusive execution context.
pub trait ExclusiveContext: Send + Sync {
	/// Queues `job` for execution on the context.
	///
	/// Must not run the job inline on the caller's thread unless the caller
	/// is already on the context.
	fn execute(&self, job: ExclusiveJob) -> Result<(), ExclusiveError>;
}

/// Runs `f` on `ctx` and awaits its result.
///
/// This is the only suspension point callers see: the current task yields
/// until the context has executed the closure.
pub async fn run_exclusive<T, F>(ctx: &dyn ExclusiveContext, f: F) -> Result<T, ExclusiveError>
where
	F: FnOnce() -> T + Send + 'static,
	T: Send + 'static,
{
	let (reply_tx, reply_rx) = oneshot::channel();
	let span = tracing::Span::current();
	ctx.execute(Box::new(move || {
		let _guard = span.enter();
		let result = std::panic::catch_unwind(AssertUnwindSafe(f));
		let _ = reply_tx.send(result.map_err(|payload| panic_payload_message(payload.as_ref())));
	}))?;

	match reply_rx.await {
		Ok(Ok(value)) => Ok(value),
		Ok(Err(msg)) => Err(ExclusiveError::Panicked(msg)),
		Err(_) => Err(ExclusiveError::Closed),
	}
}

enum Job {
	Run(ExclusiveJob),
	Shutdown,
}

/// Exclusive context backed by one dedicated OS thread.
///
/// Jobs run sequentially in submission order. A panicking job is contained
/// by [`run_exclusive`]; raw jobs submitted through [`ExclusiveContext::execute`]
/// that panic are caught here and logged so the thread survives. Dropping the
/// owner stops the thread after already-queued jobs finish.
pub struct DedicatedThread {
	tx: mpsc::Sender<Job>,
	thread_id: ThreadId,
	name: String,
}

impl std::fmt::Debug for DedicatedThread {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DedicatedThread").field("name", &self.name).finish_non_exhaustive()
	}
}

impl DedicatedThread {
	/// Spawns the exclusive thread.
	pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
		let name = name.into();
		let (tx, rx) = mpsc::channel::<Job>();
		let thread_name = name.clone();
		let handle = spawn_named_thread(TaskClass::Exclusive, name.clone(), move || {
			while let Ok(job) = rx.recv() {
				match job {
					Job::Run(job) => {
						if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(job)) {
							tracing::error!(thread = %thread_name, panic = %panic_payload_message(payload.as_ref()), "exclusive job panicked");
						}
					}
					Job::Shutdown => break,
				}
			}
			tracing::trace!(thread = %thread_name, "worker.exclusive.exit");
		})?;

		Ok(Self {
			tx,
			thread_id: handle.thread().id(),
			name,
		})
	}

	/// Returns `true` when called from the exclusive thread itself.
	pub fn is_current(&self) -> bool {
		std::thread::current().id() == self.thread_id
	}

	/// Returns the thread name.
	pub fn name(&self) -> &str {
		&self.name
	}
}

impl ExclusiveContext for DedicatedThread {
	fn execute(&self, job: ExclusiveJob) -> Result<(), ExclusiveError> {
		if self.is_current() {
			job();
			return Ok(());
		}
		self.tx.send(Job::Run(job)).map_err(|_| ExclusiveError::Closed)
	}
}

impl Drop for DedicatedThread {
	fn drop(&mut self) {
		let _ = self.tx.send(Job::Shutdown);
	}
}
