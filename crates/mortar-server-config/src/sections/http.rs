// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP server configuration.

use serde::Deserialize;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ENVIRONMENT: &str = "development";

/// HTTP configuration (runtime, fully resolved).
#[derive(Debug, Clone)]
pub struct HttpConfig {
	pub host: String,
	pub port: u16,
	pub base_url: String,
	/// Deployment environment name (`development`, `staging`, `production`).
	pub environment: String,
}

impl HttpConfig {
	pub fn is_production(&self) -> bool {
		self.environment.eq_ignore_ascii_case("production")
	}
}

impl Default for HttpConfig {
	fn default() -> Self {
		HttpConfigLayer::default().finalize()
	}
}

/// HTTP configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfigLayer {
	#[serde(default)]
	pub host: Option<String>,
	#[serde(default)]
	pub port: Option<u16>,
	#[serde(default)]
	pub base_url: Option<String>,
	#[serde(default)]
	pub environment: Option<String>,
}

impl HttpConfigLayer {
	pub fn merge(&mut self, other: HttpConfigLayer) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
		if other.environment.is_some() {
			self.environment = other.environment;
		}
	}

	pub fn finalize(self) -> HttpConfig {
		let host = self.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
		let port = self.port.unwrap_or(DEFAULT_PORT);
		let base_url = self
			.base_url
			.unwrap_or_else(|| format!("http://{host}:{port}"));
		HttpConfig {
			host,
			port,
			base_url: base_url.trim_end_matches('/').to_string(),
			environment: self
				.environment
				.unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = HttpConfigLayer::default().finalize();
		assert_eq!(config.host, "127.0.0.1");
		assert_eq!(config.port, 8080);
		assert_eq!(config.base_url, "http://127.0.0.1:8080");
		assert!(!config.is_production());
	}

	#[test]
	fn test_base_url_trailing_slash_trimmed() {
		let layer = HttpConfigLayer {
			base_url: Some("https://build.example.com/".to_string()),
			..Default::default()
		};
		assert_eq!(layer.finalize().base_url, "https://build.example.com");
	}

	#[test]
	fn test_production_detection_is_case_insensitive() {
		let layer = HttpConfigLayer {
			environment: Some("Production".to_string()),
			..Default::default()
		};
		assert!(layer.finalize().is_production());
	}
}
