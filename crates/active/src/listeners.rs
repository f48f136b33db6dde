use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use reposcope_worker::panic_payload_message;

/// Listener invoked with no payload after each snapshot change.
///
/// Runs on whichever thread performed the refresh.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Token returned on registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Observer list for snapshot changes.
///
/// Notification iterates over a copy of the list, so listeners may register
/// or unregister (themselves included) while being notified.
#[derive(Default)]
pub(crate) struct ListenerSet {
	next: AtomicU64,
	entries: RwLock<Vec<(ListenerId, ChangeListener)>>,
}

impl ListenerSet {
	pub(crate) fn add(&self, listener: ChangeListener) -> ListenerId {
		let id = ListenerId(self.next.fetch_add(1, Ordering::Relaxed));
		self.entries.write().push((id, listener));
		id
	}

	pub(crate) fn remove(&self, id: ListenerId) -> bool {
		let mut entries = self.entries.write();
		let before = entries.len();
		entries.retain(|(entry, _)| *entry != id);
		entries.len() != before
	}

	#[cfg(test)]
	pub(crate) fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Invokes every listener; a panicking listener is logged and skipped.
	pub(crate) fn notify(&self) {
		let listeners: Vec<ChangeListener> = self.entries.read().iter().map(|(_, l)| Arc::clone(l)).collect();
		for listener in listeners {
			if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| listener())) {
				tracing::warn!(panic = %panic_payload_message(payload.as_ref()), "change listener panicked");
			}
		}
	}
}
