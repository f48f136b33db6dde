use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::TaskClass;

/// Tokio runtime owned by a [`WorkerRuntime`].
///
/// Shut down in the background on drop so the owner can be released from
/// inside an async context without tripping Tokio's blocking-drop check.
#[derive(Debug)]
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
	fn drop(&mut self) {
		if let Some(runtime) = self.0.take() {
			runtime.shutdown_background();
		}
	}
}

/// Scheduler entrypoint for background and blocking worker tasks.
///
/// Either owns a dedicated multi-thread runtime or borrows a handle to one
/// supplied by the embedding application.
#[derive(Debug, Clone)]
pub struct WorkerRuntime {
	handle: Handle,
	owned: Option<Arc<OwnedRuntime>>,
}

impl WorkerRuntime {
	/// Builds a dedicated multi-thread runtime.
	pub fn dedicated(worker_threads: usize, thread_name: impl Into<String>) -> std::io::Result<Self> {
		let runtime = Builder::new_multi_thread()
			.enable_all()
			.worker_threads(worker_threads.max(1))
			.thread_name(thread_name.into())
			.build()?;
		Ok(Self {
			handle: runtime.handle().clone(),
			owned: Some(Arc::new(OwnedRuntime(Some(runtime)))),
		})
	}

	/// Wraps an externally owned runtime handle.
	pub fn from_handle(handle: Handle) -> Self {
		Self { handle, owned: None }
	}

	/// Wraps the runtime the caller is currently running on, if any.
	pub fn current() -> Option<Self> {
		Handle::try_current().ok().map(Self::from_handle)
	}

	/// Returns the underlying Tokio handle.
	pub fn handle(&self) -> &Handle {
		&self.handle
	}

	/// Returns `true` if this runtime was built by [`Self::dedicated`].
	pub fn is_dedicated(&self) -> bool {
		self.owned.is_some()
	}

	/// Spawns an async task.
	#[allow(clippy::disallowed_methods)]
	pub fn spawn<F>(&self, class: TaskClass, fut: F) -> JoinHandle<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		tracing::trace!(worker_class = class.as_str(), "worker.spawn");
		self.handle.spawn(fut)
	}

	/// Spawns blocking work on the runtime's blocking pool.
	#[allow(clippy::disallowed_methods)]
	pub fn spawn_blocking<F, R>(&self, class: TaskClass, f: F) -> JoinHandle<R>
	where
		F: FnOnce() -> R + Send + 'static,
		R: Send + 'static,
	{
		tracing::trace!(worker_class = class.as_str(), "worker.spawn_blocking");
		self.handle.spawn_blocking(f)
	}
}
