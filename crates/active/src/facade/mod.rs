//! Active-repositories facade.
//!
//! # Purpose
//!
//! Mirror the host's "active repositories" list behind an API that never
//! fails and never blocks on host availability.
//!
//! # Mental model
//!
//! * Readers load an `Arc<RepositorySnapshot<R>>` through `ArcSwap`; they never
//!   touch the refresh mutex.
//! * Every refresh pass (manual, host change event, first population) takes
//!   one mutex, recomputes the whole list from the host, and publishes a new
//!   snapshot only if content differs.
//! * Background work goes through a [`TaskGate`] so `join` can wait for it.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints |
//! |---|---|---|
//! | [`ActiveRepositories`] | Cloneable facade handle | Explicitly owned; no process-wide statics |
//! | [`RepositorySnapshot`] | Immutable published list | Replaced wholesale, generation +1 per change |
//! | [`FacadeState`] | Lifecycle | `Failed` is terminal |
//!
//! # Invariants
//!
//! * The snapshot is never absent; it starts empty at generation 0.
//! * At most one refresh pass runs at a time.
//! * Initialization runs at most once per facade.
//! * Listeners fire only after a content change is installed, never twice for
//!   the same content.
//! * The service handle is bound once and never replaced.
//!
//! # Data flow
//!
//! 1. Activation signal fires; a tracked initialization task is scheduled.
//! 2. The service is located on the exclusive context.
//! 3. The initialization task awaits the first refresh on the blocking pool.
//! 4. Host change events schedule tracked blocking refresh passes.
//!
//! # Failure modes & recovery
//!
//! * Service not found: logged once, state `Failed`, snapshot stays empty.
//! * Descriptor read or mapping error: logged, snapshot reset to empty, the
//!   next trigger refreshes normally. No retry or backoff.
//! * Listener panic: caught and logged; remaining listeners still run.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use reposcope_worker::{DedicatedThread, ExclusiveContext, GateStats, TaskClass, TaskGate, WorkerRuntime};
use tokio::sync::watch;

use crate::activation::ActivationSignal;
use crate::config::ActiveReposConfig;
use crate::error::BuildError;
use crate::factory::RepositoryFactory;
use crate::listeners::{ChangeListener, ListenerId, ListenerSet};
use crate::model::{RepositoryRecord, RepositorySnapshot};
use crate::service::{RepositoryService, ServiceProvider};
use crate::state::{FacadeState, StateCell};

mod init;
mod refresh;

#[cfg(test)]
mod tests;

/// Shared facade state.
pub(crate) struct Inner<R> {
	config: ActiveReposConfig,
	snapshot: ArcSwap<RepositorySnapshot<R>>,
	refresh_lock: Mutex<()>,
	service: OnceLock<Arc<dyn RepositoryService>>,
	state: StateCell,
	factory: Arc<dyn RepositoryFactory<Record = R>>,
	provider: Arc<dyn ServiceProvider>,
	exclusive: Arc<dyn ExclusiveContext>,
	gate: TaskGate,
	listeners: ListenerSet,
	changes: watch::Sender<u64>,
}

impl<R: RepositoryRecord> Inner<R> {
	/// Schedules the initialization handshake as a tracked task.
	pub(crate) fn start(self: &Arc<Self>) {
		let inner = Arc::clone(self);
		self.gate.spawn(TaskClass::Background, "initialize", async move {
			// Failures are logged inside `initialize`.
			let _ = inner.initialize().await;
		});
	}

	/// Schedules a tracked refresh pass on the blocking pool.
	pub(crate) fn schedule_refresh(self: &Arc<Self>) {
		let inner = Arc::clone(self);
		self.gate.spawn_blocking(TaskClass::Blocking, "refresh", move || {
			inner.refresh();
		});
	}
}

/// Thread-safe, cloneable facade over the host's active repository list.
///
/// Clones share one snapshot, one refresh mutex, and one drain gate.
pub struct ActiveRepositories<R> {
	inner: Arc<Inner<R>>,
}

impl<R> Clone for ActiveRepositories<R> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<R> std::fmt::Debug for ActiveRepositories<R> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ActiveRepositories")
			.field("state", &self.inner.state.get())
			.field("generation", &self.inner.snapshot.load().generation())
			.field("pending_tasks", &self.inner.gate.pending())
			.finish_non_exhaustive()
	}
}

impl<R: RepositoryRecord> ActiveRepositories<R> {
	/// Starts building a facade from a service provider and record factory.
	pub fn builder<P, F>(provider: P, factory: F) -> ActiveRepositoriesBuilder<R>
	where
		P: ServiceProvider,
		F: RepositoryFactory<Record = R>,
	{
		ActiveRepositoriesBuilder {
			provider: Arc::new(provider),
			factory: Arc::new(factory),
			config: ActiveReposConfig::default(),
			runtime: None,
			exclusive: None,
		}
	}

	/// Registers the initializer with `signal` under the configured context.
	///
	/// The facade is held weakly by the callback; if every handle is dropped
	/// before activation, nothing runs.
	pub fn attach(&self, signal: &dyn ActivationSignal) {
		let weak = Arc::downgrade(&self.inner);
		let context = self.inner.config.activation_context.clone();
		tracing::debug!(context = %context, "waiting for activation context");
		signal.on_activated(
			&context,
			Box::new(move || {
				if let Some(inner) = weak.upgrade() {
					inner.start();
				}
			}),
		);
	}

	/// Schedules initialization immediately, bypassing any activation signal.
	///
	/// A second call (or a call after activation) is ignored.
	pub fn start(&self) {
		self.inner.start();
	}

	/// Current snapshot. Lock-free; never blocks on a refresh in progress.
	pub fn active_repositories(&self) -> Arc<RepositorySnapshot<R>> {
		self.inner.snapshot.load_full()
	}

	/// Recomputes the snapshot on the calling thread.
	///
	/// Blocks while another pass holds the refresh mutex. Errors are logged
	/// and leave an empty snapshot; nothing propagates.
	pub fn refresh_active_repositories(&self) {
		self.inner.refresh();
	}

	/// Schedules a refresh pass on the worker runtime, tracked by [`Self::join`].
	pub fn schedule_refresh(&self) {
		self.inner.schedule_refresh();
	}

	/// Registers a change listener.
	///
	/// The listener runs on the refreshing thread after the new snapshot is
	/// visible. Subscribers that need a particular thread must marshal
	/// themselves, or use [`Self::watch_changes`].
	pub fn on_active_repositories_changed<L>(&self, listener: L) -> ListenerId
	where
		L: Fn() + Send + Sync + 'static,
	{
		let listener: ChangeListener = Arc::new(listener);
		self.inner.listeners.add(listener)
	}

	/// Unregisters a listener; returns `false` if it was not registered.
	pub fn remove_listener(&self, id: ListenerId) -> bool {
		self.inner.listeners.remove(id)
	}

	/// Channel alternative to listeners, carrying the latest snapshot generation.
	pub fn watch_changes(&self) -> watch::Receiver<u64> {
		self.inner.changes.subscribe()
	}

	/// Current lifecycle state.
	pub fn state(&self) -> FacadeState {
		self.inner.state.get()
	}

	/// Subscribes to lifecycle transitions.
	pub fn subscribe_state(&self) -> watch::Receiver<FacadeState> {
		self.inner.state.subscribe()
	}

	/// Blocks until all scheduled work (initialization, refreshes) has finished.
	///
	/// Returns immediately when idle. Called from a change listener, waits for
	/// everything except refreshes that are themselves blocked in a join.
	pub fn join(&self) {
		self.inner.gate.join();
	}

	/// Like [`Self::join`] with an upper bound; returns `true` if drained.
	pub fn join_timeout(&self, timeout: Duration) -> bool {
		self.inner.gate.join_timeout(timeout)
	}

	/// Async variant of [`Self::join`].
	pub async fn join_async(&self) {
		self.inner.gate.join_async().await;
	}

	/// Drain gate counters.
	pub fn task_stats(&self) -> GateStats {
		self.inner.gate.stats()
	}

	/// Effective configuration.
	pub fn config(&self) -> &ActiveReposConfig {
		&self.inner.config
	}
}

/// Builder for [`ActiveRepositories`].
pub struct ActiveRepositoriesBuilder<R> {
	provider: Arc<dyn ServiceProvider>,
	factory: Arc<dyn RepositoryFactory<Record = R>>,
	config: ActiveReposConfig,
	runtime: Option<WorkerRuntime>,
	exclusive: Option<Arc<dyn ExclusiveContext>>,
}

impl<R: RepositoryRecord> ActiveRepositoriesBuilder<R> {
	/// Replaces the default configuration.
	pub fn config(mut self, config: ActiveReposConfig) -> Self {
		self.config = config;
		self
	}

	/// Schedules work on `runtime` instead of a dedicated one.
	pub fn runtime(mut self, runtime: WorkerRuntime) -> Self {
		self.runtime = Some(runtime);
		self
	}

	/// Uses `exclusive` for the service lookup instead of a dedicated thread.
	pub fn exclusive_context(mut self, exclusive: Arc<dyn ExclusiveContext>) -> Self {
		self.exclusive = Some(exclusive);
		self
	}

	/// Validates the configuration and spawns any missing worker threads.
	pub fn build(self) -> Result<ActiveRepositories<R>, BuildError> {
		self.config.validate()?;
		let runtime = match self.runtime {
			Some(runtime) => runtime,
			None => WorkerRuntime::dedicated(self.config.worker_threads, self.config.worker_thread_name.clone())?,
		};
		let exclusive = match self.exclusive {
			Some(exclusive) => exclusive,
			None => Arc::new(DedicatedThread::spawn(self.config.exclusive_thread_name.clone())?),
		};

		Ok(ActiveRepositories {
			inner: Arc::new(Inner {
				config: self.config,
				snapshot: ArcSwap::from_pointee(RepositorySnapshot::empty()),
				refresh_lock: Mutex::new(()),
				service: OnceLock::new(),
				state: StateCell::new(),
				factory: self.factory,
				provider: self.provider,
				exclusive,
				gate: TaskGate::new(runtime),
				listeners: ListenerSet::default(),
				changes: watch::Sender::new(0),
			}),
		})
	}
}
