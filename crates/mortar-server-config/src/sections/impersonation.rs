// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Impersonation configuration section.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ImpersonationConfigLayer {
	pub ttl_minutes: Option<u64>,
}

impl ImpersonationConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.ttl_minutes.is_some() {
			self.ttl_minutes = other.ttl_minutes;
		}
	}

	pub fn finalize(self) -> ImpersonationConfig {
		ImpersonationConfig {
			ttl_minutes: self.ttl_minutes.unwrap_or(30),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImpersonationConfig {
	pub ttl_minutes: u64,
}

impl ImpersonationConfig {
	pub fn ttl_secs(&self) -> i64 {
		(self.ttl_minutes * 60) as i64
	}
}

impl Default for ImpersonationConfig {
	fn default() -> Self {
		Self { ttl_minutes: 30 }
	}
}
