// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Time-limited, single-use links to the ban appeal form.
//!
//! A link looks like
//! `{base_url}{appeal_path}/{principal}?expires={unix}&nonce={hex}&signature={hex}`.
//! The signature covers principal, expiry and nonce; the nonce is registered
//! with the [`AppealService`] and consumed on first use.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::RngCore;
use serde::Serialize;
use tracing::instrument;
use url::Url;

use crate::error::AppealLinkError;
use crate::principal::Principal;
use crate::services::SecurityServices;
use crate::signing::{Purpose, Signer};
use crate::store::AppealService;
use crate::types::PrincipalId;

/// How long an issued appeal link stays valid.
pub const APPEAL_LINK_TTL_HOURS: i64 = 72;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppealLink {
	pub url: String,
	pub expires_at: DateTime<Utc>,
	#[serde(skip)]
	pub nonce: String,
}

pub struct AppealLinks {
	signer: Arc<Signer>,
	appeals: Arc<dyn AppealService>,
	base_url: String,
	path: String,
	ttl: Duration,
}

fn payload(principal: &PrincipalId, expires: i64, nonce: &str) -> String {
	format!("{principal}|{expires}|{nonce}")
}

impl AppealLinks {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			signer: Arc::clone(&services.signer),
			appeals: Arc::clone(&services.appeals),
			base_url: services.config.http.base_url.clone(),
			path: services.config.routes.appeal_path.clone(),
			ttl: Duration::hours(APPEAL_LINK_TTL_HOURS),
		}
	}

	/// Issue a link if `principal` may appeal. `Ok(None)` when ineligible.
	#[instrument(skip(self, principal), fields(principal_id = %principal.id))]
	pub async fn issue(
		&self,
		principal: &Principal,
		now: DateTime<Utc>,
	) -> Result<Option<AppealLink>, AppealLinkError> {
		let eligible = self
			.appeals
			.is_eligible(principal)
			.await
			.map_err(|e| AppealLinkError::Store(e.to_string()))?;
		if !eligible {
			return Ok(None);
		}

		let mut nonce_bytes = [0u8; 16];
		rand::thread_rng().fill_bytes(&mut nonce_bytes);
		let nonce = hex::encode(nonce_bytes);
		let expires_at = now + self.ttl;
		let expires = expires_at.timestamp();
		let signature = self.signer.sign(
			Purpose::AppealLink,
			payload(&principal.id, expires, &nonce).as_bytes(),
		);

		let mut url = Url::parse(&self.base_url)
			.and_then(|base| base.join(&format!("{}/{}", self.path, principal.id)))
			.map_err(|e| AppealLinkError::InvalidBaseUrl(e.to_string()))?;
		url.query_pairs_mut()
			.append_pair("expires", &expires.to_string())
			.append_pair("nonce", &nonce)
			.append_pair("signature", &signature);

		self.appeals
			.register_token(&principal.id, &nonce, expires_at)
			.await
			.map_err(|e| AppealLinkError::Store(e.to_string()))?;

		Ok(Some(AppealLink {
			url: url.to_string(),
			expires_at: Utc.timestamp_opt(expires, 0).single().unwrap_or(expires_at),
			nonce,
		}))
	}

	/// Check a presented link and consume its nonce.
	#[instrument(skip(self, nonce, signature), fields(principal_id = %principal))]
	pub async fn redeem(
		&self,
		principal: &PrincipalId,
		expires: i64,
		nonce: &str,
		signature: &str,
		now: DateTime<Utc>,
	) -> Result<(), AppealLinkError> {
		if !self.signer.verify(
			Purpose::AppealLink,
			payload(principal, expires, nonce).as_bytes(),
			signature,
		) {
			return Err(AppealLinkError::InvalidSignature);
		}
		if now.timestamp() >= expires {
			return Err(AppealLinkError::Expired);
		}
		let consumed = self
			.appeals
			.consume_token(principal, nonce)
			.await
			.map_err(|e| AppealLinkError::Store(e.to_string()))?;
		if !consumed {
			return Err(AppealLinkError::AlreadyUsed);
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::services::test_support::harness;

	fn query(url: &str, key: &str) -> String {
		Url::parse(url)
			.unwrap()
			.query_pairs()
			.find(|(k, _)| k == key)
			.map(|(_, v)| v.into_owned())
			.unwrap()
	}

	#[tokio::test]
	async fn issued_link_redeems_once() {
		let h = harness();
		let links = AppealLinks::new(&h.services);
		let principal = Principal::new("a@example.com", "A");
		let now = Utc::now();

		let link = links.issue(&principal, now).await.unwrap().unwrap();
		assert!(link.url.contains(&format!("/appeals/{}", principal.id)));

		let expires: i64 = query(&link.url, "expires").parse().unwrap();
		let nonce = query(&link.url, "nonce");
		let signature = query(&link.url, "signature");

		links
			.redeem(&principal.id, expires, &nonce, &signature, now)
			.await
			.unwrap();
		assert_eq!(
			links
				.redeem(&principal.id, expires, &nonce, &signature, now)
				.await,
			Err(AppealLinkError::AlreadyUsed)
		);
	}

	#[tokio::test]
	async fn expired_link_is_rejected() {
		let h = harness();
		let links = AppealLinks::new(&h.services);
		let principal = Principal::new("a@example.com", "A");
		let now = Utc::now();
		let link = links.issue(&principal, now).await.unwrap().unwrap();

		let expires: i64 = query(&link.url, "expires").parse().unwrap();
		let result = links
			.redeem(
				&principal.id,
				expires,
				&query(&link.url, "nonce"),
				&query(&link.url, "signature"),
				now + Duration::hours(APPEAL_LINK_TTL_HOURS),
			)
			.await;
		assert_eq!(result, Err(AppealLinkError::Expired));
	}

	#[tokio::test]
	async fn tampered_expiry_fails_signature() {
		let h = harness();
		let links = AppealLinks::new(&h.services);
		let principal = Principal::new("a@example.com", "A");
		let now = Utc::now();
		let link = links.issue(&principal, now).await.unwrap().unwrap();

		let expires: i64 = query(&link.url, "expires").parse().unwrap();
		let result = links
			.redeem(
				&principal.id,
				expires + 86_400,
				&query(&link.url, "nonce"),
				&query(&link.url, "signature"),
				now,
			)
			.await;
		assert_eq!(result, Err(AppealLinkError::InvalidSignature));
	}

	#[tokio::test]
	async fn ineligible_principal_gets_no_link() {
		let h = harness();
		let principal = Principal::new("a@example.com", "A");
		h.appeals.mark_ineligible(principal.id).await;
		let links = AppealLinks::new(&h.services);
		assert!(links.issue(&principal, Utc::now()).await.unwrap().is_none());
	}
}
