// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Well-known routes the security pipeline redirects to.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct RoutesConfig {
	pub login_path: String,
	pub logout_path: String,
	pub admin_landing_path: String,
	pub password_change_path: String,
	pub two_factor_path: String,
	pub appeal_path: String,
}

impl Default for RoutesConfig {
	fn default() -> Self {
		RoutesConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RoutesConfigLayer {
	#[serde(default)]
	pub login_path: Option<String>,
	#[serde(default)]
	pub logout_path: Option<String>,
	#[serde(default)]
	pub admin_landing_path: Option<String>,
	#[serde(default)]
	pub password_change_path: Option<String>,
	#[serde(default)]
	pub two_factor_path: Option<String>,
	#[serde(default)]
	pub appeal_path: Option<String>,
}

impl RoutesConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.login_path.is_some() {
			self.login_path = other.login_path;
		}
		if other.logout_path.is_some() {
			self.logout_path = other.logout_path;
		}
		if other.admin_landing_path.is_some() {
			self.admin_landing_path = other.admin_landing_path;
		}
		if other.password_change_path.is_some() {
			self.password_change_path = other.password_change_path;
		}
		if other.two_factor_path.is_some() {
			self.two_factor_path = other.two_factor_path;
		}
		if other.appeal_path.is_some() {
			self.appeal_path = other.appeal_path;
		}
	}

	pub fn finalize(self) -> RoutesConfig {
		RoutesConfig {
			login_path: self.login_path.unwrap_or_else(|| "/login".to_string()),
			logout_path: self.logout_path.unwrap_or_else(|| "/logout".to_string()),
			admin_landing_path: self
				.admin_landing_path
				.unwrap_or_else(|| "/admin".to_string()),
			password_change_path: self
				.password_change_path
				.unwrap_or_else(|| "/account/password".to_string()),
			two_factor_path: self
				.two_factor_path
				.unwrap_or_else(|| "/two-factor-challenge".to_string()),
			appeal_path: self.appeal_path.unwrap_or_else(|| "/appeals".to_string()),
		}
	}
}
