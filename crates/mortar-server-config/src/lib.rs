// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the Mortar security pipeline.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`MORTAR_SERVER_*`)
//! - Secret loading (`MORTAR_SERVER_APP_KEY`, `MORTAR_SERVER_IDENTITY_SALT`) with `*_FILE` support
//!
//! # Usage
//!
//! ```ignore
//! use mortar_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("idle timeout: {} minutes", config.session.idle_timeout_minutes);
//! ```

pub mod env;
pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use env::{load_secret_env, SecretEnvError};
pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use mortar_common_secret::SecretString;
use tracing::{debug, info};

pub const APP_KEY_ENV_VAR: &str = "MORTAR_SERVER_APP_KEY";
pub const IDENTITY_SALT_ENV_VAR: &str = "MORTAR_SERVER_IDENTITY_SALT";

/// Server-side secrets. Never logged.
#[derive(Debug, Clone, Default)]
pub struct SecretsConfig {
	/// Key for session signatures, challenge signatures and appeal links.
	pub app_key: Option<SecretString>,
	/// Salt mixed into hashed login identities for rate-limit keys.
	pub identity_salt: Option<SecretString>,
}

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub logging: LoggingConfig,
	pub session: SessionConfig,
	pub impersonation: ImpersonationConfig,
	pub two_factor: TwoFactorConfig,
	pub rate_limit: RateLimitConfig,
	pub password: PasswordPolicyConfig,
	pub routes: RoutesConfig,
	pub audit: AuditConfig,
	pub secrets: SecretsConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`MORTAR_SERVER_*`)
/// 2. Config file (`/etc/mortar/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	let secrets = SecretsConfig {
		app_key: load_secret_env(APP_KEY_ENV_VAR).map_err(|e| ConfigError::Secret(e.to_string()))?,
		identity_salt: load_secret_env(IDENTITY_SALT_ENV_VAR)
			.map_err(|e| ConfigError::Secret(e.to_string()))?,
	};

	finalize(merged, secrets)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(
	layer: ServerConfigLayer,
	secrets: SecretsConfig,
) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		session: layer.session.unwrap_or_default().finalize(),
		impersonation: layer.impersonation.unwrap_or_default().finalize(),
		two_factor: layer.two_factor.unwrap_or_default().finalize(),
		rate_limit: layer.rate_limit.unwrap_or_default().finalize(),
		password: layer.password.unwrap_or_default().finalize(),
		routes: layer.routes.unwrap_or_default().finalize(),
		audit: layer.audit.unwrap_or_default().finalize(),
		secrets,
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		environment = %config.http.environment,
		idle_timeout_minutes = config.session.idle_timeout_minutes,
		integrity_check_enabled = config.session.integrity_check_enabled,
		impersonation_ttl_minutes = config.impersonation.ttl_minutes,
		app_key_configured = config.secrets.app_key.is_some(),
		audit_enabled = config.audit.enabled,
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	if config.session.idle_timeout_minutes == 0 {
		return Err(ConfigError::Validation(
			"session idle timeout must be greater than zero".to_string(),
		));
	}

	if config.session.warning_minutes >= config.session.idle_timeout_minutes {
		return Err(ConfigError::Validation(format!(
			"session warning window ({} min) must be shorter than the idle timeout ({} min)",
			config.session.warning_minutes, config.session.idle_timeout_minutes
		)));
	}

	if config.session.cleanup_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"session cleanup interval must be greater than zero".to_string(),
		));
	}

	if config.impersonation.ttl_minutes == 0 {
		return Err(ConfigError::Validation(
			"impersonation TTL must be greater than zero".to_string(),
		));
	}

	if config.two_factor.challenge_ttl_secs == 0 {
		return Err(ConfigError::Validation(
			"two-factor challenge TTL must be greater than zero".to_string(),
		));
	}

	let limits = &config.rate_limit;
	if limits.ip_max_attempts == 0
		|| limits.identity_max_attempts == 0
		|| limits.ip_window_secs == 0
		|| limits.identity_window_secs == 0
	{
		return Err(ConfigError::Validation(
			"rate limit thresholds and windows must be greater than zero".to_string(),
		));
	}

	if config.http.is_production() {
		match &config.secrets.app_key {
			Some(key) if key.expose().len() >= 32 => {}
			_ => {
				return Err(ConfigError::Validation(format!(
					"{APP_KEY_ENV_VAR} must be set to at least 32 characters when MORTAR_SERVER_ENV=production"
				)))
			}
		}
	}

	Ok(())
}
