use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use reposcope_worker::{TaskClass, spawn_thread};

/// One-shot callback fired when an activation context becomes active.
pub type ActivationCallback = Box<dyn FnOnce() + Send + 'static>;

/// Environment hook announcing that a named context has become active.
pub trait ActivationSignal: Send + Sync {
	/// Registers `callback` to fire exactly once, asynchronously, when
	/// `context` is active. Fires promptly (still off the caller's stack) if
	/// the context is already active.
	fn on_activated(&self, context: &str, callback: ActivationCallback);
}

enum ContextState {
	Pending(Vec<ActivationCallback>),
	Active,
}

/// In-process [`ActivationSignal`] driven by explicit [`Self::activate`] calls.
///
/// Callbacks are dispatched on a short-lived thread, never inline on the
/// registering or activating caller.
#[derive(Clone, Default)]
pub struct ActivationLatch {
	contexts: Arc<Mutex<HashMap<String, ContextState>>>,
}

impl std::fmt::Debug for ActivationLatch {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let contexts = self.contexts.lock();
		let active: Vec<_> = contexts.iter().filter(|(_, s)| matches!(s, ContextState::Active)).map(|(k, _)| k.as_str()).collect();
		f.debug_struct("ActivationLatch").field("active", &active).finish()
	}
}

impl ActivationLatch {
	/// Creates a latch with no active contexts.
	pub fn new() -> Self {
		Self::default()
	}

	/// Marks `context` active and dispatches its pending callbacks.
	///
	/// Returns the number of callbacks dispatched. Activating an already
	/// active context is a no-op.
	pub fn activate(&self, context: &str) -> usize {
		let previous = self.contexts.lock().insert(context.to_string(), ContextState::Active);
		let callbacks = match previous {
			Some(ContextState::Pending(callbacks)) => callbacks,
			Some(ContextState::Active) | None => Vec::new(),
		};
		let count = callbacks.len();
		tracing::debug!(context, callbacks = count, "activation context active");
		if count > 0 {
			dispatch(callbacks);
		}
		count
	}

	/// Returns `true` once `context` has been activated.
	pub fn is_active(&self, context: &str) -> bool {
		matches!(self.contexts.lock().get(context), Some(ContextState::Active))
	}
}

impl ActivationSignal for ActivationLatch {
	fn on_activated(&self, context: &str, callback: ActivationCallback) {
		let mut contexts = self.contexts.lock();
		if let ContextState::Pending(callbacks) = contexts.entry(context.to_string()).or_insert_with(|| ContextState::Pending(Vec::new())) {
			callbacks.push(callback);
			return;
		}
		drop(contexts);
		dispatch(vec![callback]);
	}
}

fn dispatch(callbacks: Vec<ActivationCallback>) {
	spawn_thread(TaskClass::Dispatch, move || {
		for callback in callbacks {
			callback();
		}
	});
}
