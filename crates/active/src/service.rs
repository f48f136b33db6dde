use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ServiceError;
use crate::model::RepositoryDescriptor;

/// Host callback fired when the active repository set changes.
///
/// May be invoked on any thread the host chooses.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Host service exposing the active repository descriptors.
pub trait RepositoryService: Send + Sync {
	/// Reads the current descriptor list in host order.
	fn descriptors(&self) -> Result<Vec<RepositoryDescriptor>, ServiceError>;

	/// Registers `callback` for future change events.
	fn on_changed(&self, callback: ChangeCallback);
}

/// Locates the host service.
///
/// Only ever invoked on the exclusive execution context.
pub trait ServiceProvider: Send + Sync + 'static {
	/// Returns the service handle, or `None` if the host does not offer it.
	fn locate(&self) -> Option<Arc<dyn RepositoryService>>;
}

impl<F> ServiceProvider for F
where
	F: Fn() -> Option<Arc<dyn RepositoryService>> + Send + Sync + 'static,
{
	fn locate(&self) -> Option<Arc<dyn RepositoryService>> {
		self()
	}
}

/// In-process [`RepositoryService`] whose descriptor list is set by the host
/// bridge.
///
/// [`Self::set_descriptors`] replaces the list and fires every registered
/// change callback on the calling thread. [`Self::fail_next`] makes the next
/// read return an error.
#[derive(Default)]
pub struct InMemoryService {
	descriptors: RwLock<Vec<RepositoryDescriptor>>,
	callbacks: RwLock<Vec<ChangeCallback>>,
	pending_failure: RwLock<Option<ServiceError>>,
}

impl std::fmt::Debug for InMemoryService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InMemoryService")
			.field("descriptors", &*self.descriptors.read())
			.field("callbacks", &self.callbacks.read().len())
			.finish_non_exhaustive()
	}
}

impl InMemoryService {
	/// Creates a service reporting `paths`.
	pub fn with_paths<I, P>(paths: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<std::path::PathBuf>,
	{
		let service = Self::default();
		service.replace_descriptors(paths);
		service
	}

	/// Replaces the descriptor list and fires change callbacks.
	pub fn set_descriptors<I, P>(&self, paths: I)
	where
		I: IntoIterator<Item = P>,
		P: Into<std::path::PathBuf>,
	{
		self.replace_descriptors(paths);
		self.fire_changed();
	}

	/// Replaces the descriptor list without firing change callbacks.
	pub fn replace_descriptors<I, P>(&self, paths: I)
	where
		I: IntoIterator<Item = P>,
		P: Into<std::path::PathBuf>,
	{
		*self.descriptors.write() = paths.into_iter().map(RepositoryDescriptor::new).collect();
	}

	/// Makes the next [`RepositoryService::descriptors`] call fail.
	pub fn fail_next(&self, error: ServiceError) {
		*self.pending_failure.write() = Some(error);
	}

	/// Fires every registered change callback.
	pub fn fire_changed(&self) {
		let callbacks = self.callbacks.read().clone();
		for callback in callbacks {
			callback();
		}
	}

	/// Number of registered change callbacks.
	pub fn subscriber_count(&self) -> usize {
		self.callbacks.read().len()
	}
}

impl RepositoryService for InMemoryService {
	fn descriptors(&self) -> Result<Vec<RepositoryDescriptor>, ServiceError> {
		if let Some(err) = self.pending_failure.write().take() {
			return Err(err);
		}
		Ok(self.descriptors.read().clone())
	}

	fn on_changed(&self, callback: ChangeCallback) {
		self.callbacks.write().push(callback);
	}
}
