// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Principal (user account) model.
//!
//! A principal carries its account status, optional ban metadata, an
//! orthogonal ML block and the timestamps the pipeline gates on. Status is
//! evaluated before the ML block.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use mortar_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{PrincipalId, Role};

/// Lifecycle state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
	#[default]
	Active,
	/// Registered but not yet approved.
	Pending,
	Suspended,
	/// Banned; details live in [`Principal::ban`].
	Banned,
}

impl AccountStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			AccountStatus::Active => "active",
			AccountStatus::Pending => "pending",
			AccountStatus::Suspended => "suspended",
			AccountStatus::Banned => "banned",
		}
	}
}

/// Metadata describing an account ban.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanDetails {
	pub reason: String,
	pub banned_at: DateTime<Utc>,
	/// `None` for a permanent ban.
	pub expires_at: Option<DateTime<Utc>>,
}

impl BanDetails {
	pub fn permanent(reason: impl Into<String>, banned_at: DateTime<Utc>) -> Self {
		Self {
			reason: reason.into(),
			banned_at,
			expires_at: None,
		}
	}

	pub fn temporary(
		reason: impl Into<String>,
		banned_at: DateTime<Utc>,
		expires_at: DateTime<Utc>,
	) -> Self {
		Self {
			reason: reason.into(),
			banned_at,
			expires_at: Some(expires_at),
		}
	}

	pub fn is_permanent(&self) -> bool {
		self.expires_at.is_none()
	}

	/// Whether the ban still blocks access at `now`.
	pub fn is_in_force(&self, now: DateTime<Utc>) -> bool {
		match self.expires_at {
			None => true,
			Some(expires_at) => now < expires_at,
		}
	}

	/// Client-facing summary used in the JSON denial body.
	pub fn to_json(&self) -> serde_json::Value {
		serde_json::json!({
			"reason": self.reason,
			"banned_at": self.banned_at.to_rfc3339(),
			"expires_at": self.expires_at.map(|t| t.to_rfc3339()),
			"permanent": self.is_permanent(),
		})
	}
}

/// Automated risk-model block, independent of the account status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlBlock {
	pub reason: String,
	pub blocked_at: DateTime<Utc>,
}

/// A user account as seen by the security pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
	pub id: PrincipalId,
	pub email: String,
	pub display_name: String,
	/// Argon2 PHC string. `None` for accounts without a password.
	#[serde(default, skip_serializing)]
	pub password_hash: Option<SecretString>,
	pub roles: BTreeSet<Role>,
	pub status: AccountStatus,
	pub ban: Option<BanDetails>,
	pub ml_block: Option<MlBlock>,
	/// Base32 TOTP secret; `None` when two-factor is not configured.
	#[serde(default, skip_serializing)]
	pub two_factor_secret: Option<SecretString>,
	pub two_factor_confirmed_at: Option<DateTime<Utc>>,
	pub password_changed_at: Option<DateTime<Utc>>,
	pub last_login_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

impl Principal {
	/// A new active member account with no password and no two-factor.
	pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
		let mut roles = BTreeSet::new();
		roles.insert(Role::Member);
		Self {
			id: PrincipalId::generate(),
			email: email.into(),
			display_name: display_name.into(),
			password_hash: None,
			roles,
			status: AccountStatus::Active,
			ban: None,
			ml_block: None,
			two_factor_secret: None,
			two_factor_confirmed_at: None,
			password_changed_at: None,
			last_login_at: None,
			created_at: Utc::now(),
		}
	}

	pub fn with_role(mut self, role: Role) -> Self {
		self.roles.insert(role);
		self
	}

	pub fn with_password_hash(mut self, hash: impl Into<String>, changed_at: DateTime<Utc>) -> Self {
		self.password_hash = Some(SecretString::new(hash.into()));
		self.password_changed_at = Some(changed_at);
		self
	}

	pub fn with_status(mut self, status: AccountStatus) -> Self {
		self.status = status;
		self
	}

	pub fn banned(mut self, ban: BanDetails) -> Self {
		self.status = AccountStatus::Banned;
		self.ban = Some(ban);
		self
	}

	pub fn with_ml_block(mut self, block: MlBlock) -> Self {
		self.ml_block = Some(block);
		self
	}

	pub fn with_confirmed_two_factor(
		mut self,
		secret: impl Into<String>,
		confirmed_at: DateTime<Utc>,
	) -> Self {
		self.two_factor_secret = Some(SecretString::new(secret.into()));
		self.two_factor_confirmed_at = Some(confirmed_at);
		self
	}

	pub fn roles(&self) -> &BTreeSet<Role> {
		&self.roles
	}

	pub fn has_role(&self, role: Role) -> bool {
		self.roles.contains(&role)
	}

	pub fn is_admin(&self) -> bool {
		self.has_role(Role::Admin)
	}

	/// True only when a secret exists and setup was confirmed.
	pub fn has_confirmed_two_factor(&self) -> bool {
		self.two_factor_secret.is_some() && self.two_factor_confirmed_at.is_some()
	}

	/// Fingerprint of the credential hash, bound into the session's critical
	/// fields so that a password change elsewhere invalidates the session.
	pub fn credential_fingerprint(&self) -> Option<String> {
		self.password_hash
			.as_ref()
			.map(|hash| hex::encode(Sha256::digest(hash.expose().as_bytes())))
	}

	/// Whether the password is older than `max_age_days` at `now`.
	///
	/// Accounts without a password never expire. A missing change timestamp
	/// falls back to the account creation time.
	pub fn password_expired(&self, max_age_days: u32, now: DateTime<Utc>) -> bool {
		if max_age_days == 0 || self.password_hash.is_none() {
			return false;
		}
		let changed_at = self.password_changed_at.unwrap_or(self.created_at);
		now - changed_at >= Duration::days(i64::from(max_age_days))
	}
}
