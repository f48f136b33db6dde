use std::sync::Arc;

use reposcope_worker::{TaskClass, join_error_panic_message, run_exclusive};

use super::Inner;
use crate::error::InitError;
use crate::model::RepositoryRecord;
use crate::state::FacadeState;

impl<R: RepositoryRecord> Inner<R> {
	/// One-time handshake: locate the service on the exclusive context,
	/// populate the first snapshot, then subscribe to host change events.
	pub(crate) async fn initialize(self: &Arc<Self>) -> Result<(), InitError> {
		if !self.state.transition(FacadeState::Uninitialized, FacadeState::Initializing) {
			tracing::debug!(state = self.state.get().as_str(), "initialization already started");
			return Err(InitError::AlreadyStarted);
		}

		let provider = Arc::clone(&self.provider);
		let located = run_exclusive(self.exclusive.as_ref(), move || provider.locate()).await;
		let service = match located {
			Ok(Some(service)) => service,
			Ok(None) => return Err(self.fail(InitError::ServiceUnavailable)),
			Err(err) => return Err(self.fail(InitError::ExclusiveContextClosed(err))),
		};

		if self.service.set(Arc::clone(&service)).is_err() {
			return Err(InitError::AlreadyStarted);
		}

		let inner = Arc::clone(self);
		match self.gate.run_blocking(TaskClass::Blocking, move || inner.refresh()).await {
			Ok(outcome) => tracing::debug!(?outcome, "first refresh complete"),
			Err(err) => {
				let msg = join_error_panic_message(err).unwrap_or_else(|| "<cancelled>".to_string());
				tracing::error!(panic = %msg, "RefreshFailure: first refresh did not complete");
			}
		}

		let weak = Arc::downgrade(self);
		service.on_changed(Arc::new(move || {
			if let Some(inner) = weak.upgrade() {
				inner.schedule_refresh();
			}
		}));

		self.state.transition(FacadeState::Initializing, FacadeState::Ready);
		Ok(())
	}

	fn fail(&self, err: InitError) -> InitError {
		tracing::error!(error = %err, "{}: active repositories will stay empty", err.as_str());
		self.state.transition(FacadeState::Initializing, FacadeState::Failed);
		err
	}
}
