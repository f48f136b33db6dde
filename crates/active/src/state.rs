use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::watch;

/// Lifecycle of the facade.
///
/// `Uninitialized -> Initializing -> Ready | Failed`; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FacadeState {
	/// Waiting for the activation signal.
	Uninitialized = 0,
	/// Handshake with the host service in progress.
	Initializing = 1,
	/// Service bound and change events subscribed.
	Ready = 2,
	/// No service was found; the snapshot stays empty for good.
	Failed = 3,
}

impl FacadeState {
	const fn from_u8(value: u8) -> Self {
		match value {
			0 => Self::Uninitialized,
			1 => Self::Initializing,
			2 => Self::Ready,
			_ => Self::Failed,
		}
	}

	/// Stable label used in `tracing` fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Uninitialized => "uninitialized",
			Self::Initializing => "initializing",
			Self::Ready => "ready",
			Self::Failed => "failed",
		}
	}
}

/// Atomic state cell with a watch channel for subscribers.
///
/// Reads are a single atomic load; transitions are compare-and-swap.
#[derive(Debug)]
pub(crate) struct StateCell {
	value: AtomicU8,
	tx: watch::Sender<FacadeState>,
}

impl StateCell {
	pub(crate) fn new() -> Self {
		Self {
			value: AtomicU8::new(FacadeState::Uninitialized as u8),
			tx: watch::Sender::new(FacadeState::Uninitialized),
		}
	}

	pub(crate) fn get(&self) -> FacadeState {
		FacadeState::from_u8(self.value.load(Ordering::Acquire))
	}

	/// Moves `from -> to`; returns `false` if the current state is not `from`.
	pub(crate) fn transition(&self, from: FacadeState, to: FacadeState) -> bool {
		let swapped = self.value.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire).is_ok();
		if swapped {
			tracing::debug!(from = from.as_str(), to = to.as_str(), "facade state");
			self.tx.send_replace(to);
		}
		swapped
	}

	pub(crate) fn subscribe(&self) -> watch::Receiver<FacadeState> {
		self.tx.subscribe()
	}
}
