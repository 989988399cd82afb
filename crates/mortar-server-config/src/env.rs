// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret loading from environment variables with `*_FILE` support.

use std::path::PathBuf;

use mortar_common_secret::SecretString;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("both {name} and {name}_FILE are set; use only one")]
	Ambiguous { name: String },

	#[error("failed to read {name}_FILE at {path}: {source}")]
	FileRead {
		name: String,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Load a secret from `NAME` or from the file named by `NAME_FILE`.
///
/// Returns `Ok(None)` when neither is set. Trailing newlines in secret files
/// are trimmed.
pub fn load_secret_env(name: &str) -> Result<Option<SecretString>, SecretEnvError> {
	let direct = std::env::var(name).ok().filter(|v| !v.is_empty());
	let file_var = format!("{name}_FILE");
	let file = std::env::var(&file_var).ok().filter(|v| !v.is_empty());

	match (direct, file) {
		(Some(_), Some(_)) => Err(SecretEnvError::Ambiguous {
			name: name.to_string(),
		}),
		(Some(value), None) => Ok(Some(SecretString::new(value))),
		(None, Some(path)) => {
			let path = PathBuf::from(path);
			let content = std::fs::read_to_string(&path).map_err(|source| SecretEnvError::FileRead {
				name: name.to_string(),
				path: path.clone(),
				source,
			})?;
			Ok(Some(SecretString::new(content.trim_end().to_string())))
		}
		(None, None) => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use std::sync::Mutex;

	static ENV_MUTEX: Mutex<()> = Mutex::new(());

	#[test]
	fn returns_none_when_unset() {
		let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
		std::env::remove_var("MORTAR_TEST_SECRET_A");
		std::env::remove_var("MORTAR_TEST_SECRET_A_FILE");
		assert!(load_secret_env("MORTAR_TEST_SECRET_A").unwrap().is_none());
	}

	#[test]
	fn reads_direct_value() {
		let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
		std::env::set_var("MORTAR_TEST_SECRET_B", "direct");
		let secret = load_secret_env("MORTAR_TEST_SECRET_B").unwrap().unwrap();
		assert_eq!(secret.expose(), "direct");
		std::env::remove_var("MORTAR_TEST_SECRET_B");
	}

	#[test]
	fn reads_file_value_and_trims_newline() {
		let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "from-file").unwrap();
		std::env::set_var("MORTAR_TEST_SECRET_C_FILE", file.path());
		let secret = load_secret_env("MORTAR_TEST_SECRET_C").unwrap().unwrap();
		assert_eq!(secret.expose(), "from-file");
		std::env::remove_var("MORTAR_TEST_SECRET_C_FILE");
	}

	#[test]
	fn rejects_both_sources() {
		let _lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
		std::env::set_var("MORTAR_TEST_SECRET_D", "direct");
		std::env::set_var("MORTAR_TEST_SECRET_D_FILE", "/nonexistent");
		let result = load_secret_env("MORTAR_TEST_SECRET_D");
		assert!(matches!(result, Err(SecretEnvError::Ambiguous { .. })));
		std::env::remove_var("MORTAR_TEST_SECRET_D");
		std::env::remove_var("MORTAR_TEST_SECRET_D_FILE");
	}
}
