// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pending second-factor challenge.
//!
//! ```text
//! NoChallenge --begin--> AwaitingCode --complete--> Verified
//!                             |  \---abandon---> Abandoned
//!                             \----ttl----> Expired
//! ```
//!
//! The challenge is stored in the session as one value, so clearing it
//! removes the principal marker, the nonce and every first-factor proof at
//! once.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mortar_server_audit::{AuditService, SecurityEventType};
use rand::RngCore;
use serde_json::json;
use tracing::{info, warn};

use crate::context::RequestContext;
use crate::pipeline::{Outcome, Stage};
use crate::principal::Principal;
use crate::response::{Denial, ErrorCode};
use crate::services::SecurityServices;
use crate::session::{FlashLevel, TwoFactorChallenge};
use crate::signing::{Purpose, Signer};
use crate::store::PrincipalStore;
use crate::types::PrincipalId;

const EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Where a session stands with respect to two-factor verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
	NoChallenge,
	AwaitingCode,
	Expired,
}

/// Why a pending challenge was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeRejection {
	Missing,
	NoProof,
	Expired,
	BadSignature,
	/// The principal no longer has a confirmed two-factor secret.
	TwoFactorRemoved,
	/// The principal could not be loaded; treated as a rejection.
	PrincipalUnavailable,
}

impl fmt::Display for ChallengeRejection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			ChallengeRejection::Missing => "missing",
			ChallengeRejection::NoProof => "no_proof",
			ChallengeRejection::Expired => "expired",
			ChallengeRejection::BadSignature => "bad_signature",
			ChallengeRejection::TwoFactorRemoved => "two_factor_removed",
			ChallengeRejection::PrincipalUnavailable => "principal_unavailable",
		};
		f.write_str(s)
	}
}

fn challenge_payload(principal: &PrincipalId, nonce: &str, started_at: DateTime<Utc>) -> String {
	format!("{principal}|{nonce}|{}", started_at.timestamp())
}

fn password_payload(principal: &PrincipalId, fingerprint: &str) -> String {
	format!("{principal}|{fingerprint}")
}

pub struct TwoFactorChallengeGate {
	principals: Arc<dyn PrincipalStore>,
	signer: Arc<Signer>,
	audit: Arc<AuditService>,
	ttl_secs: i64,
	login_path: String,
}

impl TwoFactorChallengeGate {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			principals: Arc::clone(&services.principals),
			signer: Arc::clone(&services.signer),
			audit: Arc::clone(&services.audit),
			ttl_secs: services.config.two_factor.challenge_ttl_secs as i64,
			login_path: services.config.routes.login_path.clone(),
		}
	}

	/// Enter `AwaitingCode` after the first factor succeeded. Replaces any
	/// earlier challenge.
	pub fn begin(&self, ctx: &mut RequestContext, principal: &Principal, remember: bool) {
		let mut nonce_bytes = [0u8; 16];
		rand::thread_rng().fill_bytes(&mut nonce_bytes);
		let nonce = hex::encode(nonce_bytes);
		let started_at = ctx.now;

		let challenge_signature = self.signer.sign(
			Purpose::TwoFactorChallenge,
			challenge_payload(&principal.id, &nonce, started_at).as_bytes(),
		);
		let fingerprint = principal.credential_fingerprint();
		let password_signature = fingerprint.as_deref().map(|fp| {
			self.signer.sign(
				Purpose::TwoFactorPassword,
				password_payload(&principal.id, fp).as_bytes(),
			)
		});

		ctx.session.two_factor = Some(TwoFactorChallenge {
			principal_id: principal.id,
			nonce,
			started_at,
			challenge_signature: Some(challenge_signature),
			password_signature,
			credential_fingerprint: fingerprint,
			remember,
		});

		self.audit.log(
			ctx.event(SecurityEventType::TwoFactorChallengeStarted)
				.principal(principal.id)
				.build(),
		);
	}

	pub fn state(&self, ctx: &RequestContext) -> ChallengeState {
		match &ctx.session.two_factor {
			None => ChallengeState::NoChallenge,
			Some(c) if (ctx.now - c.started_at).num_seconds() >= self.ttl_secs => {
				ChallengeState::Expired
			}
			Some(_) => ChallengeState::AwaitingCode,
		}
	}

	/// Check every invariant of the pending challenge.
	pub async fn validate(
		&self,
		ctx: &RequestContext,
	) -> Result<TwoFactorChallenge, ChallengeRejection> {
		let challenge = ctx
			.session
			.two_factor
			.clone()
			.ok_or(ChallengeRejection::Missing)?;

		if !challenge.has_proof() {
			return Err(ChallengeRejection::NoProof);
		}
		if (ctx.now - challenge.started_at).num_seconds() >= self.ttl_secs {
			return Err(ChallengeRejection::Expired);
		}
		if let Some(signature) = &challenge.challenge_signature {
			let payload =
				challenge_payload(&challenge.principal_id, &challenge.nonce, challenge.started_at);
			if !self
				.signer
				.verify(Purpose::TwoFactorChallenge, payload.as_bytes(), signature)
			{
				return Err(ChallengeRejection::BadSignature);
			}
		}

		let principal = match self.principals.find(&challenge.principal_id).await {
			Ok(Some(principal)) => principal,
			Ok(None) => return Err(ChallengeRejection::TwoFactorRemoved),
			Err(e) => {
				warn!(error = %e, "principal lookup failed during two-factor challenge");
				return Err(ChallengeRejection::PrincipalUnavailable);
			}
		};
		if !principal.has_confirmed_two_factor() {
			return Err(ChallengeRejection::TwoFactorRemoved);
		}

		// The password must not have changed since the first factor.
		if let Some(signature) = &challenge.password_signature {
			let current = principal.credential_fingerprint().unwrap_or_default();
			let payload = password_payload(&challenge.principal_id, &current);
			if !self
				.signer
				.verify(Purpose::TwoFactorPassword, payload.as_bytes(), signature)
			{
				return Err(ChallengeRejection::BadSignature);
			}
		}

		Ok(challenge)
	}

	/// Consume the challenge after the code was verified (`Verified`).
	pub fn complete(&self, ctx: &mut RequestContext) -> Option<TwoFactorChallenge> {
		ctx.session.two_factor.take()
	}

	/// Drop the challenge after a wrong code (`Abandoned`).
	pub fn abandon(&self, ctx: &mut RequestContext) {
		if ctx.session.two_factor.take().is_some() {
			self.audit.log(
				ctx.event(SecurityEventType::TwoFactorChallengeRejected)
					.details(json!({ "reason": "invalid_code" }))
					.build(),
			);
		}
	}
}

#[async_trait]
impl Stage for TwoFactorChallengeGate {
	fn name(&self) -> &'static str {
		"two_factor_challenge_gate"
	}

	async fn process(&self, ctx: &mut RequestContext) -> Outcome {
		let rejection = match self.validate(ctx).await {
			Ok(_) => return Outcome::Continue,
			Err(rejection) => rejection,
		};

		info!(reason = %rejection, route = %ctx.path, "two-factor challenge rejected");
		let mut event = ctx
			.event(SecurityEventType::TwoFactorChallengeRejected)
			.details(json!({ "reason": rejection.to_string() }));
		if let Some(challenge) = &ctx.session.two_factor {
			event = event.principal(challenge.principal_id);
		}
		self.audit.log(event.build());

		ctx.session.two_factor = None;
		Outcome::Halt(
			Denial::new(
				ErrorCode::TwoFactorChallengeExpired,
				EXPIRED_MESSAGE,
				self.login_path.clone(),
			)
			.with_flash_level(FlashLevel::Warning)
			.with_extra("reason", json!(rejection.to_string())),
		)
	}
}

#[cfg(test)]
mod tests {
	use chrono::Duration;

	use super::*;
	use crate::context::test_support::context;
	use crate::services::test_support::{harness, Harness};

	async fn enrolled(h: &Harness) -> Principal {
		let principal = Principal::new("a@example.com", "A")
			.with_password_hash("$argon2id$stub", Utc::now())
			.with_confirmed_two_factor("JBSWY3DPEHPK3PXP", Utc::now());
		h.principals.insert(principal.clone()).await;
		principal
	}

	fn assert_fully_cleared(ctx: &RequestContext) {
		assert!(ctx.session.two_factor.is_none());
	}

	#[tokio::test]
	async fn fresh_challenge_is_awaiting_code() {
		let h = harness();
		let gate = TwoFactorChallengeGate::new(&h.services);
		let principal = enrolled(&h).await;
		let mut ctx = context("/two-factor-challenge");
		assert_eq!(gate.state(&ctx), ChallengeState::NoChallenge);

		gate.begin(&mut ctx, &principal, true);

		assert_eq!(gate.state(&ctx), ChallengeState::AwaitingCode);
		assert!(matches!(gate.process(&mut ctx).await, Outcome::Continue));
		assert!(ctx.session.two_factor.as_ref().unwrap().remember);
	}

	#[tokio::test]
	async fn challenge_at_ttl_is_rejected_and_cleared() {
		let h = harness();
		let gate = TwoFactorChallengeGate::new(&h.services);
		let principal = enrolled(&h).await;
		let mut ctx = context("/two-factor-challenge");
		gate.begin(&mut ctx, &principal, false);
		ctx.now += Duration::seconds(300);

		assert_eq!(gate.state(&ctx), ChallengeState::Expired);
		let Outcome::Halt(denial) = gate.process(&mut ctx).await else {
			panic!("expected rejection");
		};
		assert_eq!(denial.code, ErrorCode::TwoFactorChallengeExpired);
		assert_eq!(denial.redirect_to, "/login");
		assert_fully_cleared(&ctx);
	}

	#[tokio::test]
	async fn challenge_just_inside_ttl_passes() {
		let h = harness();
		let gate = TwoFactorChallengeGate::new(&h.services);
		let principal = enrolled(&h).await;
		let mut ctx = context("/two-factor-challenge");
		gate.begin(&mut ctx, &principal, false);
		ctx.now += Duration::seconds(299);
		assert!(matches!(gate.process(&mut ctx).await, Outcome::Continue));
	}

	#[tokio::test]
	async fn missing_challenge_is_rejected() {
		let h = harness();
		let gate = TwoFactorChallengeGate::new(&h.services);
		let mut ctx = context("/two-factor-challenge");
		assert_eq!(
			gate.validate(&ctx).await.unwrap_err(),
			ChallengeRejection::Missing
		);
		assert!(matches!(gate.process(&mut ctx).await, Outcome::Halt(_)));
	}

	#[tokio::test]
	async fn proofless_challenge_is_rejected() {
		let h = harness();
		let gate = TwoFactorChallengeGate::new(&h.services);
		let principal = enrolled(&h).await;
		let mut ctx = context("/two-factor-challenge");
		gate.begin(&mut ctx, &principal, false);
		if let Some(c) = ctx.session.two_factor.as_mut() {
			c.challenge_signature = None;
			c.password_signature = None;
			c.credential_fingerprint = None;
		}
		assert_eq!(
			gate.validate(&ctx).await.unwrap_err(),
			ChallengeRejection::NoProof
		);
		gate.process(&mut ctx).await;
		assert_fully_cleared(&ctx);
	}

	#[tokio::test]
	async fn removed_two_factor_is_rejected() {
		let h = harness();
		let gate = TwoFactorChallengeGate::new(&h.services);
		let principal = enrolled(&h).await;
		let mut ctx = context("/two-factor-challenge");
		gate.begin(&mut ctx, &principal, false);

		h.principals
			.update(&principal.id, |p| p.two_factor_confirmed_at = None)
			.await;

		assert_eq!(
			gate.validate(&ctx).await.unwrap_err(),
			ChallengeRejection::TwoFactorRemoved
		);
	}

	#[tokio::test]
	async fn password_change_mid_challenge_is_rejected() {
		let h = harness();
		let gate = TwoFactorChallengeGate::new(&h.services);
		let principal = enrolled(&h).await;
		let mut ctx = context("/two-factor-challenge");
		gate.begin(&mut ctx, &principal, false);

		h.principals
			.update(&principal.id, |p| {
				p.password_hash = Some("$argon2id$changed".into())
			})
			.await;

		assert_eq!(
			gate.validate(&ctx).await.unwrap_err(),
			ChallengeRejection::BadSignature
		);
	}

	#[tokio::test]
	async fn forged_principal_fails_signature() {
		let h = harness();
		let gate = TwoFactorChallengeGate::new(&h.services);
		let principal = enrolled(&h).await;
		let other = Principal::new("b@example.com", "B")
			.with_confirmed_two_factor("JBSWY3DPEHPK3PXP", Utc::now());
		h.principals.insert(other.clone()).await;

		let mut ctx = context("/two-factor-challenge");
		gate.begin(&mut ctx, &principal, false);
		if let Some(c) = ctx.session.two_factor.as_mut() {
			c.principal_id = other.id;
		}
		assert_eq!(
			gate.validate(&ctx).await.unwrap_err(),
			ChallengeRejection::BadSignature
		);
	}

	#[tokio::test]
	async fn principal_store_outage_fails_closed() {
		let h = harness();
		let gate = TwoFactorChallengeGate::new(&h.services);
		let principal = enrolled(&h).await;
		let mut ctx = context("/two-factor-challenge");
		gate.begin(&mut ctx, &principal, false);
		h.principals.set_offline(true);
		assert!(matches!(gate.process(&mut ctx).await, Outcome::Halt(_)));
		assert_fully_cleared(&ctx);
	}

	#[tokio::test]
	async fn complete_and_abandon_consume_challenge() {
		let h = harness();
		let gate = TwoFactorChallengeGate::new(&h.services);
		let principal = enrolled(&h).await;

		let mut ctx = context("/two-factor-challenge");
		gate.begin(&mut ctx, &principal, false);
		assert_eq!(gate.complete(&mut ctx).map(|c| c.principal_id), Some(principal.id));
		assert_fully_cleared(&ctx);
		assert!(gate.complete(&mut ctx).is_none());

		gate.begin(&mut ctx, &principal, false);
		gate.abandon(&mut ctx);
		assert_fully_cleared(&ctx);
	}
}
