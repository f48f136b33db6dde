use std::sync::Arc;

use super::Inner;
use crate::error::RefreshError;
use crate::model::{RepositoryRecord, RepositorySnapshot};
use crate::service::RepositoryService;

/// Result of one refresh pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefreshOutcome {
	/// Content matched the published snapshot; nothing was installed.
	Unchanged,
	/// A new snapshot was installed.
	Changed { generation: u64, count: usize },
	/// No service is bound yet; the snapshot was reset to empty.
	///
	/// `cleared` carries the generation of the empty snapshot when one had to
	/// be installed.
	Unbound { cleared: Option<u64> },
	/// Reading or mapping failed; the snapshot was reset to empty.
	Failed { cleared: Option<u64> },
}

impl RefreshOutcome {
	/// Generation this pass installed, if listeners must be told about it.
	pub(crate) fn published(self) -> Option<u64> {
		match self {
			Self::Unchanged => None,
			Self::Changed { generation, .. } => Some(generation),
			Self::Unbound { cleared } | Self::Failed { cleared } => cleared,
		}
	}
}

impl<R: RepositoryRecord> Inner<R> {
	/// Runs one refresh pass on the calling thread.
	///
	/// Holds the refresh mutex for the read, map, and swap; notifies after the
	/// mutex is released so listeners may re-enter the facade.
	pub(crate) fn refresh(&self) -> RefreshOutcome {
		let outcome = {
			let _guard = self.refresh_lock.lock();
			self.refresh_locked()
		};
		if let RefreshOutcome::Changed { generation, count } = outcome {
			tracing::debug!(count, generation, "active repositories changed");
		}
		if let Some(generation) = outcome.published() {
			self.notify(generation);
		}
		outcome
	}

	fn refresh_locked(&self) -> RefreshOutcome {
		let Some(service) = self.service.get() else {
			let cleared = self.clear();
			tracing::debug!(cleared = cleared.is_some(), "refresh skipped: repository service not bound");
			return RefreshOutcome::Unbound { cleared };
		};

		let records = match self.build(service.as_ref()) {
			Ok(records) => records,
			Err(err) => {
				tracing::error!(error = %err, path = ?err.path(), "RefreshFailure: active repositories reset to empty");
				return RefreshOutcome::Failed { cleared: self.clear() };
			}
		};

		let current = self.snapshot.load();
		if current.same_content(&records) {
			tracing::debug!(count = records.len(), generation = current.generation(), "active repositories unchanged");
			return RefreshOutcome::Unchanged;
		}

		let generation = current.generation() + 1;
		let count = records.len();
		self.snapshot.store(Arc::new(RepositorySnapshot::new(generation, records)));
		RefreshOutcome::Changed { generation, count }
	}

	/// Reads descriptors and maps them in host order.
	fn build(&self, service: &dyn RepositoryService) -> Result<Vec<R>, RefreshError> {
		service
			.descriptors()?
			.into_iter()
			.map(|descriptor| {
				self.factory
					.create(&descriptor.path)
					.map_err(|source| RefreshError::Mapping { path: descriptor.path, source })
			})
			.collect()
	}

	/// Installs an empty snapshot unless the current one is already empty.
	///
	/// Returns the new generation if content changed. Must be called with the
	/// refresh mutex held.
	fn clear(&self) -> Option<u64> {
		let current = self.snapshot.load();
		if current.is_empty() {
			return None;
		}
		let generation = current.generation() + 1;
		self.snapshot.store(Arc::new(RepositorySnapshot::new(generation, Vec::new())));
		Some(generation)
	}

	/// Announces the snapshot installed as `generation`.
	///
	/// Runs outside the refresh mutex, so passes may announce out of order;
	/// the watch channel only moves forward.
	pub(super) fn notify(&self, generation: u64) {
		self.changes.send_if_modified(|latest| {
			if generation > *latest {
				*latest = generation;
				true
			} else {
				false
			}
		});
		self.listeners.notify();
	}
}
