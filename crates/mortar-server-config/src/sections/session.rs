// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session lifetime and integrity configuration.

use serde::Deserialize;

pub const DEFAULT_SESSION_COOKIE_NAME: &str = "mortar_session";
const DEFAULT_IDLE_TIMEOUT_MINUTES: u64 = 30;
const DEFAULT_WARNING_MINUTES: u64 = 5;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
	pub cookie_name: String,
	/// Idle time after which a session is destroyed.
	pub idle_timeout_minutes: u64,
	/// Width of the window before the idle timeout in which clients are warned.
	pub warning_minutes: u64,
	/// Sign and verify the critical session fields on every request.
	pub integrity_check_enabled: bool,
	/// Mark the session cookie `Secure`.
	pub secure_cookie: bool,
	/// How often idle sessions and expired counters are purged.
	pub cleanup_interval_secs: u64,
}

impl SessionConfig {
	pub fn idle_timeout_secs(&self) -> i64 {
		(self.idle_timeout_minutes * 60) as i64
	}

	pub fn warning_secs(&self) -> i64 {
		(self.warning_minutes * 60) as i64
	}
}

impl Default for SessionConfig {
	fn default() -> Self {
		SessionConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SessionConfigLayer {
	#[serde(default)]
	pub cookie_name: Option<String>,
	#[serde(default)]
	pub idle_timeout_minutes: Option<u64>,
	#[serde(default)]
	pub warning_minutes: Option<u64>,
	#[serde(default)]
	pub integrity_check_enabled: Option<bool>,
	#[serde(default)]
	pub secure_cookie: Option<bool>,
	#[serde(default)]
	pub cleanup_interval_secs: Option<u64>,
}

impl SessionConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.cookie_name.is_some() {
			self.cookie_name = other.cookie_name;
		}
		if other.idle_timeout_minutes.is_some() {
			self.idle_timeout_minutes = other.idle_timeout_minutes;
		}
		if other.warning_minutes.is_some() {
			self.warning_minutes = other.warning_minutes;
		}
		if other.integrity_check_enabled.is_some() {
			self.integrity_check_enabled = other.integrity_check_enabled;
		}
		if other.secure_cookie.is_some() {
			self.secure_cookie = other.secure_cookie;
		}
		if other.cleanup_interval_secs.is_some() {
			self.cleanup_interval_secs = other.cleanup_interval_secs;
		}
	}

	pub fn finalize(self) -> SessionConfig {
		SessionConfig {
			cookie_name: self
				.cookie_name
				.unwrap_or_else(|| DEFAULT_SESSION_COOKIE_NAME.to_string()),
			idle_timeout_minutes: self
				.idle_timeout_minutes
				.unwrap_or(DEFAULT_IDLE_TIMEOUT_MINUTES),
			warning_minutes: self.warning_minutes.unwrap_or(DEFAULT_WARNING_MINUTES),
			integrity_check_enabled: self.integrity_check_enabled.unwrap_or(true),
			secure_cookie: self.secure_cookie.unwrap_or(false),
			cleanup_interval_secs: self
				.cleanup_interval_secs
				.unwrap_or(DEFAULT_CLEANUP_INTERVAL_SECS),
		}
	}
}
