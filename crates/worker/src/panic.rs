use std::any::Any;

use tokio::task::JoinError;

/// Renders a panic payload as text.
///
/// Handles the two payload shapes produced by `panic!` (`&'static str` and
/// `String`); anything else is reported as an opaque panic.
pub fn panic_payload_message(payload: &(dyn Any + Send)) -> String {
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		(*msg).to_string()
	} else if let Some(msg) = payload.downcast_ref::<String>() {
		msg.clone()
	} else {
		"<non-string panic payload>".to_string()
	}
}

/// Extracts the panic message from a task [`JoinError`].
///
/// Returns `None` when the task was cancelled rather than panicking.
pub fn join_error_panic_message(err: JoinError) -> Option<String> {
	err.try_into_panic().ok().map(|payload| panic_payload_message(payload.as_ref()))
}
