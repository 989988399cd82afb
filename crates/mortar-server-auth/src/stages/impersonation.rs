// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA};
use mortar_server_audit::{AuditService, SecurityEventType};
use serde_json::json;
use tracing::{info, warn};

use crate::context::RequestContext;
use crate::pipeline::{Outcome, Stage};
use crate::response::{Denial, ErrorCode};
use crate::services::SecurityServices;
use crate::session::FlashLevel;

const EXPIRED_MESSAGE: &str =
	"Your impersonation session has expired. You are signed in as yourself again.";

/// Mark a response as never cacheable.
pub fn apply_no_store_headers(headers: &mut HeaderMap) {
	headers.insert(
		CACHE_CONTROL,
		HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
	);
	headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
	headers.insert(EXPIRES, HeaderValue::from_static("0"));
}

/// Ends impersonation overlays that outlived their TTL.
///
/// Live impersonated responses are marked no-store. Teardown only removes the
/// overlay; the admin stays logged in.
pub struct ImpersonationGuard {
	audit: Arc<AuditService>,
	ttl_secs: i64,
	admin_landing_path: String,
}

impl ImpersonationGuard {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			audit: Arc::clone(&services.audit),
			ttl_secs: services.config.impersonation.ttl_secs(),
			admin_landing_path: services.config.routes.admin_landing_path.clone(),
		}
	}
}

#[async_trait]
impl Stage for ImpersonationGuard {
	fn name(&self) -> &'static str {
		"impersonation_guard"
	}

	async fn process(&self, ctx: &mut RequestContext) -> Outcome {
		let Some(overlay) = ctx.session.impersonation.clone() else {
			return Outcome::Continue;
		};

		let actor_is_admin = ctx
			.principal
			.as_ref()
			.is_some_and(|p| p.id == overlay.admin_id && p.is_admin());
		if !actor_is_admin || ctx.impersonated.is_none() {
			warn!(admin_id = %overlay.admin_id, target_id = %overlay.target_id, "dropping invalid impersonation overlay");
			ctx.session.impersonation = None;
			ctx.impersonated = None;
			return Outcome::Continue;
		}

		let elapsed = (ctx.now - overlay.started_at).num_seconds();
		if elapsed >= self.ttl_secs {
			info!(admin_id = %overlay.admin_id, target_id = %overlay.target_id, elapsed_secs = elapsed, "impersonation expired");
			self.audit.log(
				ctx.event(SecurityEventType::ImpersonationExpired)
					.details(json!({ "elapsed_secs": elapsed }))
					.build(),
			);
			ctx.session.impersonation = None;
			ctx.impersonated = None;
			apply_no_store_headers(&mut ctx.response_headers);
			return Outcome::Halt(
				Denial::new(
					ErrorCode::ImpersonationExpired,
					EXPIRED_MESSAGE,
					self.admin_landing_path.clone(),
				)
				.with_flash_level(FlashLevel::Warning)
				.with_extra("restored_principal_id", json!(overlay.admin_id.to_string())),
			);
		}

		apply_no_store_headers(&mut ctx.response_headers);
		Outcome::Continue
	}
}

#[cfg(test)]
mod tests {
	use chrono::Duration;

	use super::*;
	use crate::context::test_support::context;
	use crate::principal::Principal;
	use crate::services::test_support::harness;
	use crate::session::ImpersonationOverlay;
	use crate::types::Role;

	const TTL: i64 = 30 * 60;

	fn impersonating_for(secs: i64) -> (RequestContext, Principal, Principal) {
		let admin = Principal::new("admin@example.com", "Admin").with_role(Role::Admin);
		let target = Principal::new("user@example.com", "User");
		let mut ctx = context("/dashboard");
		ctx.session.establish(admin.id, None);
		ctx.session.impersonation = Some(ImpersonationOverlay {
			admin_id: admin.id,
			target_id: target.id,
			started_at: ctx.now - Duration::seconds(secs),
		});
		ctx.principal = Some(admin.clone());
		ctx.impersonated = Some(target.clone());
		(ctx, admin, target)
	}

	#[tokio::test]
	async fn one_second_before_ttl_passes_with_no_store() {
		let h = harness();
		let (mut ctx, _, target) = impersonating_for(TTL - 1);

		let outcome = ImpersonationGuard::new(&h.services).process(&mut ctx).await;

		assert!(matches!(outcome, Outcome::Continue));
		assert_eq!(ctx.effective_principal().map(|p| p.id), Some(target.id));
		assert_eq!(
			ctx.response_headers[CACHE_CONTROL],
			"no-store, no-cache, must-revalidate, private"
		);
		assert_eq!(ctx.response_headers[PRAGMA], "no-cache");
		assert_eq!(ctx.response_headers[EXPIRES], "0");
	}

	#[tokio::test]
	async fn one_second_after_ttl_restores_admin() {
		let h = harness();
		let (mut ctx, admin, _) = impersonating_for(TTL + 1);

		let Outcome::Halt(denial) = ImpersonationGuard::new(&h.services).process(&mut ctx).await
		else {
			panic!("expected expiry");
		};

		assert_eq!(denial.code, ErrorCode::ImpersonationExpired);
		assert_eq!(denial.status.as_u16(), 440);
		assert_eq!(denial.redirect_to, "/admin");
		assert!(ctx.session.impersonation.is_none());
		assert_eq!(ctx.effective_principal().map(|p| p.id), Some(admin.id));
		assert_eq!(ctx.session.principal_id(), Some(admin.id));
	}

	#[tokio::test]
	async fn overlay_for_non_admin_is_dropped() {
		let h = harness();
		let (mut ctx, admin, _) = impersonating_for(10);
		ctx.principal = Some(Principal {
			roles: Default::default(),
			..admin
		});

		let outcome = ImpersonationGuard::new(&h.services).process(&mut ctx).await;

		assert!(matches!(outcome, Outcome::Continue));
		assert!(ctx.session.impersonation.is_none());
		assert!(ctx.impersonated.is_none());
		assert!(ctx.response_headers.get(CACHE_CONTROL).is_none());
	}

	#[tokio::test]
	async fn no_overlay_no_headers() {
		let h = harness();
		let mut ctx = context("/");
		ImpersonationGuard::new(&h.services).process(&mut ctx).await;
		assert!(ctx.response_headers.is_empty());
	}
}
