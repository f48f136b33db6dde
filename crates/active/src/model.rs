use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Raw repository entry as reported by the host service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryDescriptor {
	/// Working directory of the repository.
	pub path: PathBuf,
}

impl RepositoryDescriptor {
	/// Creates a descriptor for `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

/// Bound satisfied by any record type the facade can publish.
///
/// `PartialEq` must compare the record's identifying fields; it is the
/// content comparison used for change detection.
pub trait RepositoryRecord: PartialEq + Send + Sync + 'static {}

impl<T> RepositoryRecord for T where T: PartialEq + Send + Sync + 'static {}

/// Default repository record: a local working directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalRepository {
	path: PathBuf,
	name: String,
	clone_url: Option<String>,
}

impl LocalRepository {
	/// Creates a record with an explicit display name.
	pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			name: name.into(),
			clone_url: None,
		}
	}

	/// Attaches a clone URL.
	pub fn with_clone_url(mut self, url: impl Into<String>) -> Self {
		self.clone_url = Some(url.into());
		self
	}

	/// Working directory.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Display name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Clone URL, when known.
	pub fn clone_url(&self) -> Option<&str> {
		self.clone_url.as_deref()
	}
}

/// Immutable point-in-time list of active repositories.
///
/// Published wholesale; never mutated after construction. The generation
/// increases by one with every content change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySnapshot<R> {
	generation: u64,
	repositories: Vec<R>,
}

impl<R> Default for RepositorySnapshot<R> {
	fn default() -> Self {
		Self::empty()
	}
}

impl<R> RepositorySnapshot<R> {
	/// The initial empty snapshot (generation 0).
	pub const fn empty() -> Self {
		Self {
			generation: 0,
			repositories: Vec::new(),
		}
	}

	pub(crate) fn new(generation: u64, repositories: Vec<R>) -> Self {
		Self { generation, repositories }
	}

	/// Generation of this snapshot.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Repositories in host order.
	pub fn repositories(&self) -> &[R] {
		&self.repositories
	}
}

impl<R: PartialEq> RepositorySnapshot<R> {
	/// Content comparison: same length and pairwise-equal records in order.
	pub fn same_content(&self, other: &[R]) -> bool {
		self.repositories.as_slice() == other
	}
}

impl<R> Deref for RepositorySnapshot<R> {
	type Target = [R];

	fn deref(&self) -> &[R] {
		&self.repositories
	}
}
