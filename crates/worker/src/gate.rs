//! Drain gate: tracks in-flight worker tasks and exposes a quiescence barrier.
//!
//! Every task spawned through a [`TaskGate`] is counted at submission, before
//! the scheduler has a chance to run it, and released when it finishes by any
//! route (completion, panic, or cancellation). [`TaskGate::join`] blocks until
//! the count drops to zero.
//!
//! # Self-joins
//!
//! Tasks record the gate they belong to in a thread-local scope while they
//! run. A `join` issued from inside one of the gate's own tasks (for example
//! from a change listener invoked by a refresh pass) registers its slots as
//! joining and waits until every in-flight task is either finished or itself
//! joining. Several tasks joining at once therefore release each other instead
//! of waiting in a cycle. A join from outside the gate still waits for zero.
//!
//! Blocking joins park the calling thread. From inside an async task prefer
//! [`TaskGate::join_async`], or make sure the runtime has spare worker threads.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use pin_project_lite::pin_project;
use tokio::sync::Notify;

use crate::panic::join_error_panic_message;
use crate::{TaskClass, WorkerRuntime};

thread_local! {
	static ACTIVE_GATES: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as running a task of one gate until dropped.
struct ScopeGuard;

impl ScopeGuard {
	fn enter(gate: usize) -> Self {
		ACTIVE_GATES.with(|gates| gates.borrow_mut().push(gate));
		Self
	}
}

impl Drop for ScopeGuard {
	fn drop(&mut self) {
		ACTIVE_GATES.with(|gates| {
			gates.borrow_mut().pop();
		});
	}
}

/// Number of this gate's tasks currently executing on the calling thread.
fn scope_depth(gate: usize) -> usize {
	ACTIVE_GATES.with(|gates| gates.borrow().iter().filter(|&&g| g == gate).count())
}

pin_project! {
	/// Future wrapper that enters the gate scope around every poll.
	struct Scoped<F> {
		gate: usize,
		#[pin]
		inner: F,
	}
}

impl<F: Future> Future for Scoped<F> {
	type Output = F::Output;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();
		let _scope = ScopeGuard::enter(*this.gate);
		this.inner.poll(cx)
	}
}

/// Counters describing a gate's lifetime activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
	/// Tasks submitted.
	pub spawned: u64,
	/// Tasks finished, including panicked and cancelled ones.
	pub completed: u64,
	/// Tasks that ended in a panic.
	pub panicked: u64,
	/// Tasks currently in flight.
	pub pending: usize,
}

#[derive(Debug, Default)]
struct Counts {
	/// Tasks in flight.
	pending: usize,
	/// Slots held by tasks currently blocked in a self-join.
	joining: usize,
}

impl Counts {
	/// Whether a joiner holding `held` of the gate's slots may return.
	fn drained(&self, held: usize) -> bool {
		if held == 0 {
			self.pending == 0
		} else {
			self.pending <= self.joining
		}
	}
}

#[derive(Debug, Default)]
struct GateInner {
	counts: Mutex<Counts>,
	idle: Condvar,
	changed: Notify,
	spawned: AtomicU64,
	completed: AtomicU64,
	panicked: AtomicU64,
}

/// RAII slot for one tracked task; releases the gate count on drop.
///
/// Held by the monitor, so the count stays accurate through normal
/// completion, panic unwind, and cancellation.
struct TaskSlot(Arc<GateInner>);

impl Drop for TaskSlot {
	fn drop(&mut self) {
		self.0.completed.fetch_add(1, Ordering::AcqRel);
		let mut counts = self.0.counts.lock();
		counts.pending = counts.pending.saturating_sub(1);
		drop(counts);
		self.0.wake();
	}
}

impl GateInner {
	fn wake(&self) {
		self.idle.notify_all();
		self.changed.notify_waiters();
	}
}

/// Registers a self-joining task's slots for as long as it waits.
struct JoinRegistration<'a> {
	inner: &'a GateInner,
	held: usize,
}

impl<'a> JoinRegistration<'a> {
	fn new(inner: &'a GateInner, held: usize) -> Self {
		if held > 0 {
			inner.counts.lock().joining += held;
			inner.wake();
		}
		Self { inner, held }
	}
}

impl Drop for JoinRegistration<'_> {
	fn drop(&mut self) {
		if self.held > 0 {
			let mut counts = self.inner.counts.lock();
			counts.joining = counts.joining.saturating_sub(self.held);
		}
	}
}

/// Tracks tasks spawned onto a [`WorkerRuntime`] so callers can wait for
/// quiescence.
#[derive(Debug, Clone)]
pub struct TaskGate {
	runtime: WorkerRuntime,
	inner: Arc<GateInner>,
}

impl TaskGate {
	/// Creates an idle gate scheduling onto `runtime`.
	pub fn new(runtime: WorkerRuntime) -> Self {
		Self {
			runtime,
			inner: Arc::new(GateInner::default()),
		}
	}

	/// Returns the runtime tasks are scheduled on.
	pub fn runtime(&self) -> &WorkerRuntime {
		&self.runtime
	}

	fn id(&self) -> usize {
		Arc::as_ptr(&self.inner) as usize
	}

	fn enter(&self) -> TaskSlot {
		self.inner.spawned.fetch_add(1, Ordering::AcqRel);
		self.inner.counts.lock().pending += 1;
		TaskSlot(Arc::clone(&self.inner))
	}

	/// Spawns a tracked async task.
	///
	/// The task runs under a monitor that logs panics with `label` and
	/// releases the gate slot when the task ends.
	pub fn spawn<F>(&self, class: TaskClass, label: &'static str, fut: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let slot = self.enter();
		let task = self.runtime.spawn(class, Scoped { gate: self.id(), inner: fut });
		let inner = Arc::clone(&self.inner);
		self.runtime.spawn(class, async move {
			let _slot = slot;
			monitor(&inner, class, label, task.await);
		});
	}

	/// Spawns tracked blocking work on the runtime's blocking pool.
	pub fn spawn_blocking<F>(&self, class: TaskClass, label: &'static str, f: F)
	where
		F: FnOnce() + Send + 'static,
	{
		let slot = self.enter();
		let gate = self.id();
		let task = self.runtime.spawn_blocking(class, move || {
			let _scope = ScopeGuard::enter(gate);
			f();
		});
		let inner = Arc::clone(&self.inner);
		self.runtime.spawn(class, async move {
			let _slot = slot;
			monitor(&inner, class, label, task.await);
		});
	}

	/// Runs `f` on the blocking pool as part of the calling task.
	///
	/// No new slot is taken. When called from one of the gate's own tasks the
	/// blocking thread inherits that task's scope, so a `join` issued from `f`
	/// behaves like a `join` from the caller.
	pub async fn run_blocking<T, F>(&self, class: TaskClass, f: F) -> Result<T, tokio::task::JoinError>
	where
		F: FnOnce() -> T + Send + 'static,
		T: Send + 'static,
	{
		let gate = self.id();
		let depth = scope_depth(gate);
		self.runtime
			.spawn_blocking(class, move || {
				let _scopes: Vec<ScopeGuard> = (0..depth).map(|_| ScopeGuard::enter(gate)).collect();
				f()
			})
			.await
	}

	/// Returns the number of tracked tasks still in flight.
	pub fn pending(&self) -> usize {
		self.inner.counts.lock().pending
	}

	/// Returns `true` when no tracked task is in flight.
	pub fn is_idle(&self) -> bool {
		self.pending() == 0
	}

	/// Returns lifetime counters.
	pub fn stats(&self) -> GateStats {
		GateStats {
			spawned: self.inner.spawned.load(Ordering::Acquire),
			completed: self.inner.completed.load(Ordering::Acquire),
			panicked: self.inner.panicked.load(Ordering::Acquire),
			pending: self.pending(),
		}
	}

	/// Blocks until every tracked task has finished.
	///
	/// Returns immediately when idle. Safe to call repeatedly and from
	/// several threads at once, including from several of the gate's own
	/// tasks at the same time.
	pub fn join(&self) {
		let held = scope_depth(self.id());
		let _registration = JoinRegistration::new(&self.inner, held);
		let mut counts = self.inner.counts.lock();
		while !counts.drained(held) {
			self.inner.idle.wait(&mut counts);
		}
	}

	/// Like [`Self::join`] but gives up after `timeout`.
	///
	/// Returns `true` if the gate drained in time.
	pub fn join_timeout(&self, timeout: Duration) -> bool {
		let held = scope_depth(self.id());
		let _registration = JoinRegistration::new(&self.inner, held);
		let deadline = Instant::now() + timeout;
		let mut counts = self.inner.counts.lock();
		while !counts.drained(held) {
			if self.inner.idle.wait_until(&mut counts, deadline).timed_out() {
				let drained = counts.drained(held);
				if !drained {
					tracing::warn!(pending = counts.pending, joining = counts.joining, ?timeout, "worker.gate.join timed out");
				}
				return drained;
			}
		}
		true
	}

	/// Async variant of [`Self::join`] for callers already on a runtime.
	pub async fn join_async(&self) {
		let held = scope_depth(self.id());
		let _registration = JoinRegistration::new(&self.inner, held);
		loop {
			let mut notified = std::pin::pin!(self.inner.changed.notified());
			notified.as_mut().enable();
			if self.inner.counts.lock().drained(held) {
				return;
			}
			notified.await;
		}
	}
}

fn monitor(inner: &GateInner, class: TaskClass, label: &'static str, result: Result<(), tokio::task::JoinError>) {
	match result {
		Ok(()) => tracing::trace!(worker_class = class.as_str(), task = label, "worker.gate.complete"),
		Err(err) if err.is_panic() => {
			inner.panicked.fetch_add(1, Ordering::AcqRel);
			let msg = join_error_panic_message(err).unwrap_or_else(|| "<unknown panic>".to_string());
			tracing::error!(worker_class = class.as_str(), task = label, panic = %msg, "worker task panicked");
		}
		Err(err) => tracing::warn!(worker_class = class.as_str(), task = label, ?err, "worker task cancelled"),
	}
}
