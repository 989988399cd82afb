// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Login rate limiting configuration section.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RateLimitConfigLayer {
	pub ip_max_attempts: Option<u64>,
	pub ip_window_secs: Option<u64>,
	pub identity_max_attempts: Option<u64>,
	pub identity_window_secs: Option<u64>,
}

impl RateLimitConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.ip_max_attempts.is_some() {
			self.ip_max_attempts = other.ip_max_attempts;
		}
		if other.ip_window_secs.is_some() {
			self.ip_window_secs = other.ip_window_secs;
		}
		if other.identity_max_attempts.is_some() {
			self.identity_max_attempts = other.identity_max_attempts;
		}
		if other.identity_window_secs.is_some() {
			self.identity_window_secs = other.identity_window_secs;
		}
	}

	pub fn finalize(self) -> RateLimitConfig {
		let defaults = RateLimitConfig::default();
		RateLimitConfig {
			ip_max_attempts: self.ip_max_attempts.unwrap_or(defaults.ip_max_attempts),
			ip_window_secs: self.ip_window_secs.unwrap_or(defaults.ip_window_secs),
			identity_max_attempts: self
				.identity_max_attempts
				.unwrap_or(defaults.identity_max_attempts),
			identity_window_secs: self
				.identity_window_secs
				.unwrap_or(defaults.identity_window_secs),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
	pub ip_max_attempts: u64,
	pub ip_window_secs: u64,
	pub identity_max_attempts: u64,
	pub identity_window_secs: u64,
}

impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			ip_max_attempts: 10,
			ip_window_secs: 900, // 15 minutes
			identity_max_attempts: 5,
			identity_window_secs: 1800, // 30 minutes
		}
	}
}
