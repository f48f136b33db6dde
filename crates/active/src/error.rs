//! Error types for the repository facade.
//!
//! None of these cross the facade's runtime API: refresh and initialization
//! failures are logged and degrade to an empty snapshot. Only construction
//! ([`BuildError`]) and configuration loading ([`ConfigError`]) are returned
//! to callers.

use std::path::PathBuf;

use reposcope_worker::ExclusiveError;
use thiserror::Error;

/// The host service failed to produce its descriptor list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("repository service error: {message}")]
pub struct ServiceError {
	/// Host-provided description of the failure.
	pub message: String,
}

impl ServiceError {
	/// Creates a service error from a message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// A repository path could not be mapped into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
	/// The host reported an empty path.
	#[error("repository path is empty")]
	EmptyPath,
	/// The host reported a path that is not absolute.
	#[error("repository path is not absolute: {0}")]
	RelativePath(PathBuf),
	/// Factory-specific rejection.
	#[error("cannot map repository at {path}: {reason}")]
	Other {
		/// Offending path.
		path: PathBuf,
		/// Why the factory rejected it.
		reason: String,
	},
}

/// One refresh pass failed; the snapshot is reset to empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
	/// Reading descriptors from the host failed.
	#[error("failed to read active repositories: {0}")]
	Descriptors(#[from] ServiceError),
	/// Mapping one descriptor failed.
	#[error("failed to map repository {path}: {source}")]
	Mapping {
		/// Descriptor path that failed.
		path: PathBuf,
		/// Factory error.
		#[source]
		source: MappingError,
	},
}

impl RefreshError {
	/// Path of the descriptor that failed to map, if any.
	pub fn path(&self) -> Option<&std::path::Path> {
		match self {
			Self::Descriptors(_) => None,
			Self::Mapping { path, .. } => Some(path),
		}
	}
}

/// Initialization handshake failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
	/// The host service was not found; terminal for the facade.
	#[error("repository service unavailable")]
	ServiceUnavailable,
	/// The exclusive context could not run the lookup.
	#[error("service lookup failed on exclusive context: {0}")]
	ExclusiveContextClosed(#[from] ExclusiveError),
	/// Initialization already ran or is running.
	#[error("initialization already started")]
	AlreadyStarted,
}

impl InitError {
	/// Stable name used as the log tag.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::ServiceUnavailable => "ServiceUnavailable",
			Self::ExclusiveContextClosed(_) => "ExclusiveContextClosed",
			Self::AlreadyStarted => "AlreadyStarted",
		}
	}
}

/// Configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// TOML syntax or type error.
	#[error("config parse error: {0}")]
	Parse(#[from] toml::de::Error),
	/// Parsed values are out of range.
	#[error("invalid config: {0}")]
	Invalid(String),
}

/// The facade could not be constructed.
#[derive(Debug, Error)]
pub enum BuildError {
	/// Invalid configuration.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Spawning the worker runtime or exclusive thread failed.
	#[error("failed to start worker threads: {0}")]
	Io(#[from] std::io::Error),
}
