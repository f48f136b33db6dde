use std::path::Path;

use crate::error::MappingError;
use crate::model::{LocalRepository, RepositoryRecord};

/// Maps a host repository path into a domain record.
pub trait RepositoryFactory: Send + Sync + 'static {
	/// Record type produced by this factory.
	type Record: RepositoryRecord;

	/// Builds the record for `path`.
	fn create(&self, path: &Path) -> Result<Self::Record, MappingError>;
}

/// Factory producing [`LocalRepository`] records from absolute paths.
///
/// The display name is the final path component. No git commands run; the
/// clone URL is left unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRepositoryFactory;

impl RepositoryFactory for LocalRepositoryFactory {
	type Record = LocalRepository;

	fn create(&self, path: &Path) -> Result<LocalRepository, MappingError> {
		if path.as_os_str().is_empty() {
			return Err(MappingError::EmptyPath);
		}
		if !path.has_root() {
			return Err(MappingError::RelativePath(path.to_path_buf()));
		}
		let name = path
			.file_name()
			.map(|name| name.to_string_lossy().into_owned())
			.unwrap_or_else(|| path.to_string_lossy().into_owned());
		Ok(LocalRepository::new(path, name))
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;

	use super::*;

	#[test]
	fn names_record_after_final_component() {
		let record = LocalRepositoryFactory.create(Path::new("/src/reposcope")).unwrap();
		assert_eq!(record.name(), "reposcope");
		assert_eq!(record.path(), Path::new("/src/reposcope"));
		assert_eq!(record.clone_url(), None);
	}

	#[test]
	fn root_path_uses_whole_path_as_name() {
		let record = LocalRepositoryFactory.create(Path::new("/")).unwrap();
		assert_eq!(record.name(), "/");
	}

	#[test]
	fn rejects_empty_and_relative_paths() {
		assert_eq!(LocalRepositoryFactory.create(Path::new("")), Err(MappingError::EmptyPath));
		assert_eq!(
			LocalRepositoryFactory.create(Path::new("relative/repo")),
			Err(MappingError::RelativePath(PathBuf::from("relative/repo")))
		);
	}
}
