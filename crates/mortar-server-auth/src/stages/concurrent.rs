// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use mortar_server_audit::{AuditService, SecurityEventType};
use serde_json::json;
use tracing::warn;

use crate::context::RequestContext;
use crate::pipeline::{Outcome, Stage};
use crate::response::{Denial, ErrorCode};
use crate::services::SecurityServices;
use crate::session::FlashLevel;
use crate::store::SessionStore;

const SUPERSEDED_MESSAGE: &str =
	"You have been logged out because your account was signed in on another device.";

/// Rejects sessions that were evicted by a newer login of the same principal.
///
/// A store outage skips the check rather than failing the request.
pub struct ConcurrentSessionEnforcer {
	sessions: Arc<dyn SessionStore>,
	audit: Arc<AuditService>,
	login_path: String,
}

impl ConcurrentSessionEnforcer {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			sessions: Arc::clone(&services.sessions),
			audit: Arc::clone(&services.audit),
			login_path: services.config.routes.login_path.clone(),
		}
	}
}

#[async_trait]
impl Stage for ConcurrentSessionEnforcer {
	fn name(&self) -> &'static str {
		"concurrent_session_enforcer"
	}

	async fn process(&self, ctx: &mut RequestContext) -> Outcome {
		let Some(principal_id) = ctx.session.principal_id() else {
			return Outcome::Continue;
		};
		if ctx.session_is_new {
			return Outcome::Continue;
		}

		match self.sessions.exists_for(ctx.session.id(), &principal_id).await {
			Ok(true) => Outcome::Continue,
			Ok(false) => {
				warn!(principal_id = %principal_id, route = %ctx.path, "session superseded by a newer login");
				self.audit.log(
					ctx.event(SecurityEventType::SessionSuperseded)
						.details(json!({ "reason": "logged_in_elsewhere" }))
						.build(),
				);
				ctx.logout();
				Outcome::Halt(
					Denial::new(
						ErrorCode::SessionSuperseded,
						SUPERSEDED_MESSAGE,
						self.login_path.clone(),
					)
					.with_flash_level(FlashLevel::Warning)
					.with_extra("reason", json!("logged_in_elsewhere")),
				)
			}
			Err(e) => {
				warn!(error = %e, "session registry unavailable, skipping concurrent session check");
				Outcome::Continue
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::test_support::context;
	use crate::services::test_support::harness;
	use crate::types::{PrincipalId, SessionId};

	#[tokio::test]
	async fn bound_session_passes() {
		let h = harness();
		let principal = PrincipalId::generate();
		let mut ctx = context("/api/me");
		ctx.session.establish(principal, None);
		h.sessions.bind(ctx.session.id(), &principal).await.unwrap();

		let outcome = ConcurrentSessionEnforcer::new(&h.services)
			.process(&mut ctx)
			.await;
		assert!(matches!(outcome, Outcome::Continue));
	}

	#[tokio::test]
	async fn evicted_session_is_superseded() {
		let h = harness();
		let principal = PrincipalId::generate();
		let mut ctx = context("/api/me");
		ctx.session.establish(principal, None);
		h.sessions.bind(ctx.session.id(), &principal).await.unwrap();

		let newer = SessionId::generate();
		h.sessions.bind(&newer, &principal).await.unwrap();
		h.sessions.evict_others(&principal, &newer).await.unwrap();

		let Outcome::Halt(denial) = ConcurrentSessionEnforcer::new(&h.services)
			.process(&mut ctx)
			.await
		else {
			panic!("expected superseded");
		};
		assert_eq!(denial.code, ErrorCode::SessionSuperseded);
		assert_eq!(denial.json_body()["reason"], "logged_in_elsewhere");
		assert!(ctx.session.principal_id().is_none());
	}

	#[tokio::test]
	async fn store_outage_skips_check() {
		let h = harness();
		h.sessions.set_offline(true);
		let mut ctx = context("/api/me");
		ctx.session.establish(PrincipalId::generate(), None);

		let outcome = ConcurrentSessionEnforcer::new(&h.services)
			.process(&mut ctx)
			.await;
		assert!(matches!(outcome, Outcome::Continue));
		assert!(ctx.session.principal_id().is_some());
	}

	#[tokio::test]
	async fn unsaved_session_is_not_checked() {
		let h = harness();
		let mut ctx = context("/api/me");
		ctx.session_is_new = true;
		ctx.session.establish(PrincipalId::generate(), None);
		let outcome = ConcurrentSessionEnforcer::new(&h.services)
			.process(&mut ctx)
			.await;
		assert!(matches!(outcome, Outcome::Continue));
	}
}
