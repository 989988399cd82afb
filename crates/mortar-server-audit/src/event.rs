// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Security event model.
//!
//! Every terminal decision the security pipeline makes about a session is
//! recorded as a [`SecurityEvent`]. Events never carry raw session ids or
//! cleartext login identities: session ids are reduced with
//! [`hash_session_id`] and identities arrive pre-hashed from the caller.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Types of security events emitted by the pipeline and the login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
	// Authentication
	Login,
	LoginFailed,
	LoginRateLimited,
	Logout,

	// Two-factor
	TwoFactorChallengeStarted,
	TwoFactorChallengeRejected,
	TwoFactorVerified,

	// Session anomalies
	SessionIntegrityViolation,
	SessionTimedOut,
	SessionSuperseded,
	CredentialsChanged,

	// Account state
	AccountDenied,
	AccountBanned,
	AccountMlBlocked,
	PasswordRotationRequired,
	AccessDenied,

	// Impersonation
	ImpersonationStarted,
	ImpersonationEnded,
	ImpersonationExpired,
}

impl SecurityEventType {
	/// Default severity for this kind of event.
	pub fn default_severity(&self) -> AuditSeverity {
		match self {
			SecurityEventType::Login
			| SecurityEventType::Logout
			| SecurityEventType::TwoFactorChallengeStarted
			| SecurityEventType::TwoFactorVerified => AuditSeverity::Info,
			SecurityEventType::SessionTimedOut
			| SecurityEventType::PasswordRotationRequired
			| SecurityEventType::ImpersonationEnded => AuditSeverity::Notice,
			SecurityEventType::LoginFailed
			| SecurityEventType::TwoFactorChallengeRejected
			| SecurityEventType::AccountDenied
			| SecurityEventType::AccessDenied
			| SecurityEventType::CredentialsChanged
			| SecurityEventType::ImpersonationStarted
			| SecurityEventType::ImpersonationExpired => AuditSeverity::Warning,
			SecurityEventType::LoginRateLimited
			| SecurityEventType::SessionSuperseded
			| SecurityEventType::AccountBanned
			| SecurityEventType::AccountMlBlocked => AuditSeverity::Error,
			SecurityEventType::SessionIntegrityViolation => AuditSeverity::Critical,
		}
	}
}

impl fmt::Display for SecurityEventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			SecurityEventType::Login => "login",
			SecurityEventType::LoginFailed => "login_failed",
			SecurityEventType::LoginRateLimited => "login_rate_limited",
			SecurityEventType::Logout => "logout",
			SecurityEventType::TwoFactorChallengeStarted => "two_factor_challenge_started",
			SecurityEventType::TwoFactorChallengeRejected => "two_factor_challenge_rejected",
			SecurityEventType::TwoFactorVerified => "two_factor_verified",
			SecurityEventType::SessionIntegrityViolation => "session_integrity_violation",
			SecurityEventType::SessionTimedOut => "session_timed_out",
			SecurityEventType::SessionSuperseded => "session_superseded",
			SecurityEventType::CredentialsChanged => "credentials_changed",
			SecurityEventType::AccountDenied => "account_denied",
			SecurityEventType::AccountBanned => "account_banned",
			SecurityEventType::AccountMlBlocked => "account_ml_blocked",
			SecurityEventType::PasswordRotationRequired => "password_rotation_required",
			SecurityEventType::AccessDenied => "access_denied",
			SecurityEventType::ImpersonationStarted => "impersonation_started",
			SecurityEventType::ImpersonationEnded => "impersonation_ended",
			SecurityEventType::ImpersonationExpired => "impersonation_expired",
		};
		write!(f, "{s}")
	}
}

/// RFC 5424 severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
	Debug = 7,
	#[default]
	Info = 6,
	Notice = 5,
	Warning = 4,
	Error = 3,
	Critical = 2,
}

impl PartialOrd for AuditSeverity {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for AuditSeverity {
	fn cmp(&self, other: &Self) -> Ordering {
		// Lower numeric value = higher severity (Critical=2 > Debug=7)
		(*other as u8).cmp(&(*self as u8))
	}
}

/// Reduce a session id to a short, non-reversible fingerprint for logs.
pub fn hash_session_id(session_id: &str) -> String {
	let digest = Sha256::digest(session_id.as_bytes());
	hex::encode(&digest[..8])
}

/// An append-only record of a security-relevant decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
	pub id: Uuid,
	pub timestamp: DateTime<Utc>,
	pub event_type: SecurityEventType,
	pub severity: AuditSeverity,
	/// The principal the event concerns, if known.
	pub principal_id: Option<String>,
	/// Real actor when an admin is impersonating `principal_id`.
	pub impersonator_id: Option<String>,
	pub session_id_hash: Option<String>,
	pub ip_address: Option<String>,
	pub route: Option<String>,
	pub details: serde_json::Value,
}

impl SecurityEvent {
	pub fn builder(event_type: SecurityEventType) -> SecurityEventBuilder {
		SecurityEventBuilder::new(event_type)
	}
}

/// Fluent builder for [`SecurityEvent`].
#[derive(Debug, Clone)]
pub struct SecurityEventBuilder {
	event_type: SecurityEventType,
	severity: AuditSeverity,
	timestamp: Option<DateTime<Utc>>,
	principal_id: Option<String>,
	impersonator_id: Option<String>,
	session_id_hash: Option<String>,
	ip_address: Option<String>,
	route: Option<String>,
	details: serde_json::Value,
}

impl SecurityEventBuilder {
	pub fn new(event_type: SecurityEventType) -> Self {
		Self {
			event_type,
			severity: event_type.default_severity(),
			timestamp: None,
			principal_id: None,
			impersonator_id: None,
			session_id_hash: None,
			ip_address: None,
			route: None,
			details: serde_json::Value::Null,
		}
	}

	pub fn severity(mut self, severity: AuditSeverity) -> Self {
		self.severity = severity;
		self
	}

	pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
		self.timestamp = Some(timestamp);
		self
	}

	pub fn principal(mut self, principal_id: impl ToString) -> Self {
		self.principal_id = Some(principal_id.to_string());
		self
	}

	pub fn impersonator(mut self, admin_id: impl ToString) -> Self {
		self.impersonator_id = Some(admin_id.to_string());
		self
	}

	/// Record the session by fingerprint; the raw id never reaches a sink.
	pub fn session(mut self, session_id: &str) -> Self {
		self.session_id_hash = Some(hash_session_id(session_id));
		self
	}

	pub fn ip(mut self, ip: impl ToString) -> Self {
		self.ip_address = Some(ip.to_string());
		self
	}

	pub fn route(mut self, route: impl Into<String>) -> Self {
		self.route = Some(route.into());
		self
	}

	pub fn details(mut self, details: serde_json::Value) -> Self {
		self.details = details;
		self
	}

	pub fn build(self) -> SecurityEvent {
		SecurityEvent {
			id: Uuid::new_v4(),
			timestamp: self.timestamp.unwrap_or_else(Utc::now),
			event_type: self.event_type,
			severity: self.severity,
			principal_id: self.principal_id,
			impersonator_id: self.impersonator_id,
			session_id_hash: self.session_id_hash,
			ip_address: self.ip_address,
			route: self.route,
			details: self.details,
		}
	}
}
