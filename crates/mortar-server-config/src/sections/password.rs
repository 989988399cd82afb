// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Password rotation policy.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PasswordPolicyConfigLayer {
	/// Maximum password age in days. `0` disables forced rotation.
	pub max_age_days: Option<u32>,
}

impl PasswordPolicyConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.max_age_days.is_some() {
			self.max_age_days = other.max_age_days;
		}
	}

	pub fn finalize(self) -> PasswordPolicyConfig {
		PasswordPolicyConfig {
			max_age_days: self.max_age_days.unwrap_or(90),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct PasswordPolicyConfig {
	pub max_age_days: u32,
}

impl PasswordPolicyConfig {
	pub fn rotation_enabled(&self) -> bool {
		self.max_age_days > 0
	}
}

impl Default for PasswordPolicyConfig {
	fn default() -> Self {
		Self { max_age_days: 90 }
	}
}
