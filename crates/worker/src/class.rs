/// Execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Async orchestration such as the one-shot initialization handshake.
	Background,
	/// Synchronous host reads and record mapping run on the blocking pool.
	Blocking,
	/// Work pinned to the exclusive execution context.
	Exclusive,
	/// Callback dispatch on a short-lived dedicated thread.
	Dispatch,
}

impl TaskClass {
	/// Stable label used in `tracing` fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Background => "background",
			Self::Blocking => "blocking",
			Self::Exclusive => "exclusive",
			Self::Dispatch => "dispatch",
		}
	}
}
