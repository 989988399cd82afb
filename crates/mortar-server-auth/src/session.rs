// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server-side session record.
//!
//! A [`SessionRecord`] splits its state into two parts:
//!
//! - [`CriticalFields`]: the login identity and credential fingerprint. These
//!   are covered by the integrity signature and can only be changed from
//!   inside this crate (login, logout, password change).
//! - [`SessionData`]: an open bag that handlers may mutate freely without
//!   tripping the integrity check.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{CsrfToken, PrincipalId, SessionId};

/// Session fields covered by the integrity signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalFields {
	pub(crate) login_identity: Option<PrincipalId>,
	pub(crate) credential_fingerprint: Option<String>,
}

impl CriticalFields {
	pub fn login_identity(&self) -> Option<PrincipalId> {
		self.login_identity
	}

	pub fn credential_fingerprint(&self) -> Option<&str> {
		self.credential_fingerprint.as_deref()
	}

	pub fn is_empty(&self) -> bool {
		self.login_identity.is_none() && self.credential_fingerprint.is_none()
	}

	/// Deterministic key-sorted encoding fed to the signer.
	pub fn canonical_bytes(&self) -> Vec<u8> {
		let mut fields: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
		fields.insert(
			"credential_fingerprint",
			serde_json::Value::from(self.credential_fingerprint.clone()),
		);
		fields.insert(
			"login_identity",
			serde_json::Value::from(self.login_identity.map(|id| id.to_string())),
		);
		// A BTreeMap of JSON values always serializes.
		serde_json::to_vec(&fields).unwrap_or_default()
	}
}

/// Free-form session values that are not integrity-protected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData {
	values: BTreeMap<String, serde_json::Value>,
}

impl SessionData {
	pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
		self.values
			.get(key)
			.and_then(|v| serde_json::from_value(v.clone()).ok())
	}

	pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> bool {
		match serde_json::to_value(value) {
			Ok(value) => {
				self.values.insert(key.into(), value);
				true
			}
			Err(_) => false,
		}
	}

	pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
		self.values.remove(key)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.values.contains_key(key)
	}

	pub fn len(&self) -> usize {
		self.values.len()
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}
}

/// Pending second-factor challenge, stored between the password step and
/// code verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorChallenge {
	pub principal_id: PrincipalId,
	pub nonce: String,
	pub started_at: DateTime<Utc>,
	/// HMAC over principal, nonce and start time.
	pub challenge_signature: Option<String>,
	/// HMAC over principal and the credential fingerprint at challenge time.
	pub password_signature: Option<String>,
	/// Credential fingerprint at challenge time.
	pub credential_fingerprint: Option<String>,
	/// Whether the user asked to be remembered on this device.
	pub remember: bool,
}

impl TwoFactorChallenge {
	/// At least one first-factor proof accompanies the challenge.
	pub fn has_proof(&self) -> bool {
		self.challenge_signature.is_some()
			|| self.password_signature.is_some()
			|| self.credential_fingerprint.is_some()
	}
}

/// Active impersonation: an admin acting as another principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpersonationOverlay {
	pub admin_id: PrincipalId,
	pub target_id: PrincipalId,
	pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashLevel {
	Info,
	Success,
	Warning,
	Error,
}

/// One-shot message shown on the next page render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
	pub level: FlashLevel,
	pub message: String,
}

/// Persisted state of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
	id: SessionId,
	created_at: DateTime<Utc>,
	pub(crate) critical: CriticalFields,
	pub(crate) signature: Option<String>,
	csrf_token: CsrfToken,
	pub last_activity_at: Option<DateTime<Utc>>,
	#[serde(default)]
	pub data: SessionData,
	#[serde(default)]
	pub two_factor: Option<TwoFactorChallenge>,
	#[serde(default)]
	pub impersonation: Option<ImpersonationOverlay>,
	#[serde(default)]
	flashes: Vec<Flash>,
}

impl SessionRecord {
	/// A fresh anonymous session.
	pub fn new(now: DateTime<Utc>) -> Self {
		Self {
			id: SessionId::generate(),
			created_at: now,
			critical: CriticalFields::default(),
			signature: None,
			csrf_token: CsrfToken::generate(),
			last_activity_at: None,
			data: SessionData::default(),
			two_factor: None,
			impersonation: None,
			flashes: Vec::new(),
		}
	}

	pub fn id(&self) -> &SessionId {
		&self.id
	}

	pub fn created_at(&self) -> DateTime<Utc> {
		self.created_at
	}

	pub fn critical(&self) -> &CriticalFields {
		&self.critical
	}

	/// The authenticated principal recorded in the critical fields.
	pub fn principal_id(&self) -> Option<PrincipalId> {
		self.critical.login_identity
	}

	pub fn signature(&self) -> Option<&str> {
		self.signature.as_deref()
	}

	pub fn csrf_token(&self) -> &CsrfToken {
		&self.csrf_token
	}

	/// Bind the session to a principal. Clears the stored signature so the
	/// next signing pass records the new identity.
	pub(crate) fn establish(&mut self, principal_id: PrincipalId, fingerprint: Option<String>) {
		self.critical = CriticalFields {
			login_identity: Some(principal_id),
			credential_fingerprint: fingerprint,
		};
		self.signature = None;
	}

	pub(crate) fn set_signature(&mut self, signature: Option<String>) {
		self.signature = signature;
	}

	/// Issue a new id for the same state. Returns the previous id.
	pub fn regenerate_id(&mut self) -> SessionId {
		self.replace_id(SessionId::generate())
	}

	pub(crate) fn replace_id(&mut self, id: SessionId) -> SessionId {
		std::mem::replace(&mut self.id, id)
	}

	pub fn regenerate_csrf_token(&mut self) {
		self.csrf_token = CsrfToken::generate();
	}

	/// Discard all state and start over under a new id and token.
	/// Returns the id of the discarded session.
	pub(crate) fn invalidate(&mut self, now: DateTime<Utc>) -> SessionId {
		let old = std::mem::replace(self, SessionRecord::new(now));
		old.id
	}

	pub fn flash(&mut self, level: FlashLevel, message: impl Into<String>) {
		self.flashes.push(Flash {
			level,
			message: message.into(),
		});
	}

	pub fn flashes(&self) -> &[Flash] {
		&self.flashes
	}

	pub fn take_flashes(&mut self) -> Vec<Flash> {
		std::mem::take(&mut self.flashes)
	}
}
