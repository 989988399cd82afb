// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Failed-login throttling by source IP and by hashed login identity.
//!
//! Both counters are fixed windows opened by the first failure. Either one
//! at its threshold blocks the attempt before any credential is checked.
//! Identities only ever appear as a salted SHA-256.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use http::header::{HeaderValue, RETRY_AFTER};
use mortar_common_secret::SecretString;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, error, instrument, warn};

use crate::response::{Denial, ErrorCode};
use crate::services::SecurityServices;
use crate::store::CounterStore;

pub const IP_KEY_PREFIX: &str = "auth_attempts_ip:";
pub const IDENTITY_KEY_PREFIX: &str = "auth_attempts_email:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
	Ip,
	Identity,
}

impl fmt::Display for LimitScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LimitScope::Ip => write!(f, "ip"),
			LimitScope::Identity => write!(f, "identity"),
		}
	}
}

/// An attempt refused because a counter is at its threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimited {
	pub scope: LimitScope,
	pub retry_after_secs: i64,
}

impl RateLimited {
	pub fn into_denial(self, login_path: &str) -> Denial {
		let minutes = (self.retry_after_secs + 59) / 60;
		Denial::new(
			ErrorCode::TooManyAttempts,
			format!("Too many login attempts. Please try again in {minutes} minute(s)."),
			login_path,
		)
		.with_extra("retry_after", json!(self.retry_after_secs))
		.with_header(RETRY_AFTER, HeaderValue::from(self.retry_after_secs))
	}
}

#[derive(Debug, Clone, Copy)]
struct Limit {
	max_attempts: u64,
	window: Duration,
}

pub struct RateLimitedAuthGuard {
	counters: Arc<dyn CounterStore>,
	salt: SecretString,
	ip: Limit,
	identity: Limit,
}

impl RateLimitedAuthGuard {
	pub fn new(services: &SecurityServices) -> Self {
		let config = &services.config.rate_limit;
		Self {
			counters: Arc::clone(&services.counters),
			salt: services.identity_salt.clone(),
			ip: Limit {
				max_attempts: config.ip_max_attempts,
				window: Duration::seconds(config.ip_window_secs as i64),
			},
			identity: Limit {
				max_attempts: config.identity_max_attempts,
				window: Duration::seconds(config.identity_window_secs as i64),
			},
		}
	}

	/// Salted SHA-256 of the normalized login identity.
	pub fn identity_hash(&self, identity: &str) -> String {
		let mut hasher = Sha256::new();
		hasher.update(self.salt.as_bytes());
		hasher.update(identity.trim().to_lowercase().as_bytes());
		hex::encode(hasher.finalize())
	}

	pub fn ip_key(ip: IpAddr) -> String {
		format!("{IP_KEY_PREFIX}{ip}")
	}

	pub fn identity_key(&self, identity: &str) -> String {
		format!("{IDENTITY_KEY_PREFIX}{}", self.identity_hash(identity))
	}

	async fn exceeded(&self, key: &str, limit: Limit, now: DateTime<Utc>) -> Option<i64> {
		match self.counters.get(key, now).await {
			Ok(Some(counter)) if counter.hits >= limit.max_attempts => {
				Some(counter.seconds_remaining(now).max(1))
			}
			Ok(_) => None,
			Err(e) => {
				error!(error = %e, "failed to read login attempt counter, allowing attempt");
				None
			}
		}
	}

	/// Refuse the attempt if either counter is at its threshold.
	#[instrument(skip(self, identity), fields(ip = %ip))]
	pub async fn check(
		&self,
		ip: IpAddr,
		identity: &str,
		now: DateTime<Utc>,
	) -> Result<(), RateLimited> {
		if let Some(retry_after_secs) = self.exceeded(&Self::ip_key(ip), self.ip, now).await {
			debug!(retry_after_secs, "ip over login attempt threshold");
			return Err(RateLimited {
				scope: LimitScope::Ip,
				retry_after_secs,
			});
		}
		if let Some(retry_after_secs) = self
			.exceeded(&self.identity_key(identity), self.identity, now)
			.await
		{
			debug!(retry_after_secs, "identity over login attempt threshold");
			return Err(RateLimited {
				scope: LimitScope::Identity,
				retry_after_secs,
			});
		}
		Ok(())
	}

	#[instrument(skip(self, identity), fields(ip = %ip))]
	pub async fn record_failure(&self, ip: IpAddr, identity: &str, now: DateTime<Utc>) {
		for (key, limit) in [
			(Self::ip_key(ip), self.ip),
			(self.identity_key(identity), self.identity),
		] {
			if let Err(e) = self.counters.increment(&key, limit.window, now).await {
				warn!(error = %e, "failed to record login failure");
			}
		}
	}

	/// Reset both counters after a successful login.
	#[instrument(skip(self, identity), fields(ip = %ip))]
	pub async fn record_success(&self, ip: IpAddr, identity: &str) {
		for key in [Self::ip_key(ip), self.identity_key(identity)] {
			if let Err(e) = self.counters.delete(&key).await {
				warn!(error = %e, "failed to reset login attempt counter");
			}
		}
	}
}
