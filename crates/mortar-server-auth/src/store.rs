// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage seams used by the pipeline.
//!
//! Each trait is the minimum a stage needs; implementations decide where the
//! data lives. In-memory versions are in [`crate::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::principal::Principal;
use crate::session::SessionRecord;
use crate::types::{PrincipalId, SessionId};

/// Session payloads plus the registry that binds session ids to principals.
///
/// The registry enforces one session per principal: logging in binds the new
/// id and evicts the others. An evicted session keeps its payload until it is
/// next presented, so the pipeline can tell "superseded" apart from "expired".
#[async_trait]
pub trait SessionStore: Send + Sync {
	async fn load(&self, id: &SessionId) -> StoreResult<Option<SessionRecord>>;
	async fn save(&self, record: &SessionRecord) -> StoreResult<()>;

	/// Remove the payload and any registry binding.
	async fn delete(&self, id: &SessionId) -> StoreResult<()>;

	/// Whether `id` is still bound to `principal` in the registry.
	async fn exists_for(&self, id: &SessionId, principal: &PrincipalId) -> StoreResult<bool>;

	/// Record activity without rewriting the whole record.
	async fn touch(&self, id: &SessionId, at: DateTime<Utc>) -> StoreResult<()>;

	async fn bind(&self, id: &SessionId, principal: &PrincipalId) -> StoreResult<()>;

	/// Unbind every session of `principal` except `keep`. Returns how many were evicted.
	async fn evict_others(&self, principal: &PrincipalId, keep: &SessionId) -> StoreResult<u64>;

	/// Delete every session last active before `cutoff`, with its binding.
	/// Sessions that never recorded activity are aged from creation.
	async fn purge_idle(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait PrincipalStore: Send + Sync {
	async fn find(&self, id: &PrincipalId) -> StoreResult<Option<Principal>>;
	async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>>;
	async fn record_login(&self, id: &PrincipalId, at: DateTime<Utc>) -> StoreResult<()>;
	async fn update_password(
		&self,
		id: &PrincipalId,
		password_hash: &str,
		changed_at: DateTime<Utc>,
	) -> StoreResult<()>;
}

/// A fixed-window hit counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
	pub hits: u64,
	pub expires_at: DateTime<Utc>,
}

impl Counter {
	pub fn is_live(&self, now: DateTime<Utc>) -> bool {
		now < self.expires_at
	}

	/// Seconds until the window closes, never negative.
	pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
		(self.expires_at - now).num_seconds().max(0)
	}
}

/// Expiring counters for rate limiting.
///
/// `now` is the caller's clock; the window starts on the first hit.
#[async_trait]
pub trait CounterStore: Send + Sync {
	async fn get(&self, key: &str, now: DateTime<Utc>) -> StoreResult<Option<Counter>>;

	/// Atomically increment, opening a `ttl` window if none is live.
	async fn increment(&self, key: &str, ttl: Duration, now: DateTime<Utc>)
		-> StoreResult<Counter>;

	async fn delete(&self, key: &str) -> StoreResult<()>;

	/// Drop counters whose window closed before `now`.
	async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Ban appeals: eligibility and single-use link tokens.
#[async_trait]
pub trait AppealService: Send + Sync {
	async fn is_eligible(&self, principal: &Principal) -> StoreResult<bool>;

	/// Remember an issued link nonce until `expires_at`.
	async fn register_token(
		&self,
		principal: &PrincipalId,
		nonce: &str,
		expires_at: DateTime<Utc>,
	) -> StoreResult<()>;

	/// Mark a nonce as used. Returns `false` if it was unknown or already used.
	async fn consume_token(&self, principal: &PrincipalId, nonce: &str) -> StoreResult<bool>;

	/// Forget nonces whose links expired before `now`, used or not.
	async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
