use serde::Deserialize;

use crate::error::ConfigError;

/// Facade configuration.
///
/// Every field has a default, so an empty TOML document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActiveReposConfig {
	/// Activation context the facade waits for before initializing.
	pub activation_context: String,
	/// Worker threads for the dedicated runtime. At least two, so a blocking
	/// `join` on one worker never starves the tasks it waits for.
	pub worker_threads: usize,
	/// Thread name prefix for the dedicated runtime.
	pub worker_thread_name: String,
	/// Name of the exclusive-context thread.
	pub exclusive_thread_name: String,
}

impl Default for ActiveReposConfig {
	fn default() -> Self {
		Self {
			activation_context: "git-scc-provider".to_string(),
			worker_threads: 2,
			worker_thread_name: "reposcope-worker".to_string(),
			exclusive_thread_name: "reposcope-exclusive".to_string(),
		}
	}
}

impl ActiveReposConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Checks value ranges.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.activation_context.trim().is_empty() {
			return Err(ConfigError::Invalid("activation_context must not be empty".into()));
		}
		if self.worker_threads < 2 {
			return Err(ConfigError::Invalid(format!("worker_threads must be at least 2, got {}", self.worker_threads)));
		}
		if self.worker_thread_name.is_empty() || self.exclusive_thread_name.is_empty() {
			return Err(ConfigError::Invalid("thread names must not be empty".into()));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use rstest::rstest;

	use super::*;

	#[test]
	fn empty_document_yields_defaults() {
		assert_eq!(ActiveReposConfig::from_toml_str("").unwrap(), ActiveReposConfig::default());
	}

	#[test]
	fn overrides_are_applied() {
		let config = ActiveReposConfig::from_toml_str(
			r#"
			activation_context = "vcs.ready"
			worker_threads = 4
			"#,
		)
		.unwrap();
		assert_eq!(
			config,
			ActiveReposConfig {
				activation_context: "vcs.ready".to_string(),
				worker_threads: 4,
				..ActiveReposConfig::default()
			}
		);
	}

	#[rstest]
	#[case("worker_threads = 1")]
	#[case("activation_context = \"  \"")]
	#[case("exclusive_thread_name = \"\"")]
	fn out_of_range_values_are_rejected(#[case] input: &str) {
		assert!(matches!(ActiveReposConfig::from_toml_str(input), Err(ConfigError::Invalid(_))));
	}

	#[rstest]
	#[case("worker_threads = \"many\"")]
	#[case("unknown_key = true")]
	fn malformed_documents_fail_to_parse(#[case] input: &str) {
		assert!(matches!(ActiveReposConfig::from_toml_str(input), Err(ConfigError::Parse(_))));
	}
}
