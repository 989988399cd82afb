// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory store implementations.
//!
//! Used by the demo server and by tests. Each store can be switched offline
//! to exercise the pipeline's degraded paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mortar_common_secret::SecretString;
use tokio::sync::{Mutex, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::principal::Principal;
use crate::session::SessionRecord;
use crate::store::{AppealService, Counter, CounterStore, PrincipalStore, SessionStore};
use crate::types::{PrincipalId, SessionId};

#[derive(Debug, Default)]
struct Outage(AtomicBool);

impl Outage {
	fn set(&self, offline: bool) {
		self.0.store(offline, Ordering::SeqCst);
	}

	fn check(&self, store: &str) -> StoreResult<()> {
		if self.0.load(Ordering::SeqCst) {
			Err(StoreError::Unavailable(format!("{store} is offline")))
		} else {
			Ok(())
		}
	}
}

// =============================================================================
// Sessions
// =============================================================================

#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
	records: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
	bindings: Arc<RwLock<HashMap<SessionId, PrincipalId>>>,
	outage: Arc<Outage>,
}

impl MemorySessionStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Make every call fail with [`StoreError::Unavailable`].
	pub fn set_offline(&self, offline: bool) {
		self.outage.set(offline);
	}

	pub async fn len(&self) -> usize {
		self.records.read().await.len()
	}

	pub async fn is_empty(&self) -> bool {
		self.records.read().await.is_empty()
	}

	/// Ids currently bound to `principal`.
	pub async fn sessions_of(&self, principal: &PrincipalId) -> Vec<SessionId> {
		self.bindings
			.read()
			.await
			.iter()
			.filter(|(_, owner)| *owner == principal)
			.map(|(id, _)| id.clone())
			.collect()
	}
}

#[async_trait]
impl SessionStore for MemorySessionStore {
	async fn load(&self, id: &SessionId) -> StoreResult<Option<SessionRecord>> {
		self.outage.check("session store")?;
		Ok(self.records.read().await.get(id).cloned())
	}

	async fn save(&self, record: &SessionRecord) -> StoreResult<()> {
		self.outage.check("session store")?;
		self.records
			.write()
			.await
			.insert(record.id().clone(), record.clone());
		Ok(())
	}

	async fn delete(&self, id: &SessionId) -> StoreResult<()> {
		self.outage.check("session store")?;
		self.records.write().await.remove(id);
		self.bindings.write().await.remove(id);
		Ok(())
	}

	async fn exists_for(&self, id: &SessionId, principal: &PrincipalId) -> StoreResult<bool> {
		self.outage.check("session store")?;
		Ok(self.bindings.read().await.get(id) == Some(principal))
	}

	async fn touch(&self, id: &SessionId, at: DateTime<Utc>) -> StoreResult<()> {
		self.outage.check("session store")?;
		if let Some(record) = self.records.write().await.get_mut(id) {
			record.last_activity_at = Some(at);
		}
		Ok(())
	}

	async fn bind(&self, id: &SessionId, principal: &PrincipalId) -> StoreResult<()> {
		self.outage.check("session store")?;
		self.bindings.write().await.insert(id.clone(), *principal);
		Ok(())
	}

	async fn evict_others(&self, principal: &PrincipalId, keep: &SessionId) -> StoreResult<u64> {
		self.outage.check("session store")?;
		let mut bindings = self.bindings.write().await;
		let before = bindings.len();
		bindings.retain(|id, owner| id == keep || owner != principal);
		Ok((before - bindings.len()) as u64)
	}

	async fn purge_idle(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
		self.outage.check("session store")?;
		let mut records = self.records.write().await;
		let stale: Vec<SessionId> = records
			.values()
			.filter(|r| r.last_activity_at.unwrap_or_else(|| r.created_at()) < cutoff)
			.map(|r| r.id().clone())
			.collect();
		let mut bindings = self.bindings.write().await;
		for id in &stale {
			records.remove(id);
			bindings.remove(id);
		}
		Ok(stale.len() as u64)
	}
}

// =============================================================================
// Principals
// =============================================================================

#[derive(Debug, Default, Clone)]
pub struct MemoryPrincipalStore {
	principals: Arc<RwLock<HashMap<PrincipalId, Principal>>>,
	outage: Arc<Outage>,
}

impl MemoryPrincipalStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_offline(&self, offline: bool) {
		self.outage.set(offline);
	}

	pub async fn insert(&self, principal: Principal) {
		self.principals.write().await.insert(principal.id, principal);
	}

	/// Apply `f` to a stored principal. Returns `false` if it does not exist.
	pub async fn update<F>(&self, id: &PrincipalId, f: F) -> bool
	where
		F: FnOnce(&mut Principal),
	{
		match self.principals.write().await.get_mut(id) {
			Some(principal) => {
				f(principal);
				true
			}
			None => false,
		}
	}
}

#[async_trait]
impl PrincipalStore for MemoryPrincipalStore {
	async fn find(&self, id: &PrincipalId) -> StoreResult<Option<Principal>> {
		self.outage.check("principal store")?;
		Ok(self.principals.read().await.get(id).cloned())
	}

	async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>> {
		self.outage.check("principal store")?;
		let email = email.trim();
		Ok(self
			.principals
			.read()
			.await
			.values()
			.find(|p| p.email.eq_ignore_ascii_case(email))
			.cloned())
	}

	async fn record_login(&self, id: &PrincipalId, at: DateTime<Utc>) -> StoreResult<()> {
		self.outage.check("principal store")?;
		if let Some(principal) = self.principals.write().await.get_mut(id) {
			principal.last_login_at = Some(at);
		}
		Ok(())
	}

	async fn update_password(
		&self,
		id: &PrincipalId,
		password_hash: &str,
		changed_at: DateTime<Utc>,
	) -> StoreResult<()> {
		self.outage.check("principal store")?;
		if let Some(principal) = self.principals.write().await.get_mut(id) {
			principal.password_hash = Some(SecretString::new(password_hash.to_string()));
			principal.password_changed_at = Some(changed_at);
		}
		Ok(())
	}
}

// =============================================================================
// Counters
// =============================================================================

#[derive(Debug, Default, Clone)]
pub struct MemoryCounterStore {
	counters: Arc<Mutex<HashMap<String, Counter>>>,
	outage: Arc<Outage>,
}

impl MemoryCounterStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_offline(&self, offline: bool) {
		self.outage.set(offline);
	}
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
	async fn get(&self, key: &str, now: DateTime<Utc>) -> StoreResult<Option<Counter>> {
		self.outage.check("counter store")?;
		Ok(self
			.counters
			.lock()
			.await
			.get(key)
			.copied()
			.filter(|c| c.is_live(now)))
	}

	async fn increment(
		&self,
		key: &str,
		ttl: Duration,
		now: DateTime<Utc>,
	) -> StoreResult<Counter> {
		self.outage.check("counter store")?;
		let mut counters = self.counters.lock().await;
		let counter = counters
			.entry(key.to_string())
			.and_modify(|c| {
				if c.is_live(now) {
					c.hits += 1;
				} else {
					*c = Counter {
						hits: 1,
						expires_at: now + ttl,
					};
				}
			})
			.or_insert(Counter {
				hits: 1,
				expires_at: now + ttl,
			});
		Ok(*counter)
	}

	async fn delete(&self, key: &str) -> StoreResult<()> {
		self.outage.check("counter store")?;
		self.counters.lock().await.remove(key);
		Ok(())
	}

	async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
		self.outage.check("counter store")?;
		let mut counters = self.counters.lock().await;
		let before = counters.len();
		counters.retain(|_, c| c.is_live(now));
		Ok((before - counters.len()) as u64)
	}
}

// =============================================================================
// Appeals
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct IssuedToken {
	expires_at: DateTime<Utc>,
	used: bool,
}

/// Every principal is eligible unless explicitly excluded.
#[derive(Debug, Default, Clone)]
pub struct MemoryAppealService {
	ineligible: Arc<RwLock<HashSet<PrincipalId>>>,
	tokens: Arc<Mutex<HashMap<(PrincipalId, String), IssuedToken>>>,
	outage: Arc<Outage>,
}

impl MemoryAppealService {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_offline(&self, offline: bool) {
		self.outage.set(offline);
	}

	pub async fn mark_ineligible(&self, principal: PrincipalId) {
		self.ineligible.write().await.insert(principal);
	}
}

#[async_trait]
impl AppealService for MemoryAppealService {
	async fn is_eligible(&self, principal: &Principal) -> StoreResult<bool> {
		self.outage.check("appeal service")?;
		Ok(!self.ineligible.read().await.contains(&principal.id))
	}

	async fn register_token(
		&self,
		principal: &PrincipalId,
		nonce: &str,
		expires_at: DateTime<Utc>,
	) -> StoreResult<()> {
		self.outage.check("appeal service")?;
		self.tokens.lock().await.insert(
			(*principal, nonce.to_string()),
			IssuedToken {
				expires_at,
				used: false,
			},
		);
		Ok(())
	}

	async fn consume_token(&self, principal: &PrincipalId, nonce: &str) -> StoreResult<bool> {
		self.outage.check("appeal service")?;
		let mut tokens = self.tokens.lock().await;
		let now = Utc::now();
		tokens.retain(|_, t| t.expires_at > now || !t.used);
		match tokens.get_mut(&(*principal, nonce.to_string())) {
			Some(token) if !token.used => {
				token.used = true;
				Ok(true)
			}
			_ => Ok(false),
		}
	}

	async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
		self.outage.check("appeal service")?;
		let mut tokens = self.tokens.lock().await;
		let before = tokens.len();
		tokens.retain(|_, t| t.expires_at > now);
		Ok((before - tokens.len()) as u64)
	}
}
