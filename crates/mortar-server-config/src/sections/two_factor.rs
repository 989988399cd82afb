// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Two-factor challenge configuration section.

use serde::Deserialize;

const DEFAULT_CHALLENGE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TwoFactorConfigLayer {
	pub challenge_ttl_secs: Option<u64>,
}

impl TwoFactorConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.challenge_ttl_secs.is_some() {
			self.challenge_ttl_secs = other.challenge_ttl_secs;
		}
	}

	pub fn finalize(self) -> TwoFactorConfig {
		TwoFactorConfig {
			challenge_ttl_secs: self
				.challenge_ttl_secs
				.unwrap_or(DEFAULT_CHALLENGE_TTL_SECS),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct TwoFactorConfig {
	pub challenge_ttl_secs: u64,
}

impl Default for TwoFactorConfig {
	fn default() -> Self {
		Self {
			challenge_ttl_secs: DEFAULT_CHALLENGE_TTL_SECS,
		}
	}
}
