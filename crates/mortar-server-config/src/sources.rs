// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	AuditConfigLayer, HttpConfigLayer, ImpersonationConfigLayer, LogFormat, LoggingConfigLayer,
	PasswordPolicyConfigLayer, RateLimitConfigLayer, RoutesConfigLayer, SessionConfigLayer,
	TwoFactorConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/mortar/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: MORTAR_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			logging: Some(load_logging_from_env()?),
			session: Some(load_session_from_env()?),
			impersonation: Some(ImpersonationConfigLayer {
				ttl_minutes: env_u64("MORTAR_SERVER_IMPERSONATION_TTL_MINUTES")?,
			}),
			two_factor: Some(TwoFactorConfigLayer {
				challenge_ttl_secs: env_u64("MORTAR_SERVER_TWO_FACTOR_CHALLENGE_TTL_SECS")?,
			}),
			rate_limit: Some(load_rate_limit_from_env()?),
			password: Some(PasswordPolicyConfigLayer {
				max_age_days: env_u32("MORTAR_SERVER_PASSWORD_MAX_AGE_DAYS")?,
			}),
			routes: Some(load_routes_from_env()),
			audit: Some(AuditConfigLayer {
				enabled: env_bool("MORTAR_SERVER_AUDIT_ENABLED"),
				queue_capacity: env_u64("MORTAR_SERVER_AUDIT_QUEUE_CAPACITY")?.map(|v| v as usize),
			}),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u16 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u32 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid u64 value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("MORTAR_SERVER_HOST"),
		port: env_u16("MORTAR_SERVER_PORT")?,
		base_url: env_var("MORTAR_SERVER_BASE_URL"),
		environment: env_var("MORTAR_SERVER_ENV"),
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env_var("MORTAR_SERVER_LOG_FORMAT") {
		Some(v) => Some(v.parse::<LogFormat>().map_err(|message| ConfigError::InvalidValue {
			key: "MORTAR_SERVER_LOG_FORMAT".to_string(),
			message,
		})?),
		None => None,
	};
	Ok(LoggingConfigLayer {
		level: env_var("MORTAR_SERVER_LOG_LEVEL"),
		format,
	})
}

fn load_session_from_env() -> Result<SessionConfigLayer, ConfigError> {
	Ok(SessionConfigLayer {
		cookie_name: env_var("MORTAR_SERVER_SESSION_COOKIE_NAME"),
		idle_timeout_minutes: env_u64("MORTAR_SERVER_SESSION_IDLE_TIMEOUT_MINUTES")?,
		warning_minutes: env_u64("MORTAR_SERVER_SESSION_WARNING_MINUTES")?,
		integrity_check_enabled: env_bool("MORTAR_SERVER_SESSION_INTEGRITY_CHECK"),
		secure_cookie: env_bool("MORTAR_SERVER_SESSION_SECURE_COOKIE"),
		cleanup_interval_secs: env_u64("MORTAR_SERVER_SESSION_CLEANUP_INTERVAL_SECS")?,
	})
}

fn load_rate_limit_from_env() -> Result<RateLimitConfigLayer, ConfigError> {
	Ok(RateLimitConfigLayer {
		ip_max_attempts: env_u64("MORTAR_SERVER_RATE_LIMIT_IP_MAX_ATTEMPTS")?,
		ip_window_secs: env_u64("MORTAR_SERVER_RATE_LIMIT_IP_WINDOW_SECS")?,
		identity_max_attempts: env_u64("MORTAR_SERVER_RATE_LIMIT_IDENTITY_MAX_ATTEMPTS")?,
		identity_window_secs: env_u64("MORTAR_SERVER_RATE_LIMIT_IDENTITY_WINDOW_SECS")?,
	})
}

fn load_routes_from_env() -> RoutesConfigLayer {
	RoutesConfigLayer {
		login_path: env_var("MORTAR_SERVER_ROUTES_LOGIN_PATH"),
		logout_path: env_var("MORTAR_SERVER_ROUTES_LOGOUT_PATH"),
		admin_landing_path: env_var("MORTAR_SERVER_ROUTES_ADMIN_LANDING_PATH"),
		password_change_path: env_var("MORTAR_SERVER_ROUTES_PASSWORD_CHANGE_PATH"),
		two_factor_path: env_var("MORTAR_SERVER_ROUTES_TWO_FACTOR_PATH"),
		appeal_path: env_var("MORTAR_SERVER_ROUTES_APPEAL_PATH"),
	}
}
