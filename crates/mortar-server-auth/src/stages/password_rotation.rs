// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use mortar_server_audit::{AuditService, SecurityEventType};
use serde_json::json;
use tracing::info;

use crate::context::RequestContext;
use crate::pipeline::{Outcome, Stage};
use crate::response::{Denial, ErrorCode};
use crate::services::SecurityServices;
use crate::session::FlashLevel;

const EXPIRED_MESSAGE: &str = "Your password has expired. Please choose a new one to continue.";

/// Sends principals with an expired password to the change-password form.
///
/// Skipped while impersonating and on the change-password and logout routes.
pub struct PasswordRotationGate {
	audit: Arc<AuditService>,
	max_age_days: u32,
	change_path: String,
	logout_path: String,
}

impl PasswordRotationGate {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			audit: Arc::clone(&services.audit),
			max_age_days: services.config.password.max_age_days,
			change_path: services.config.routes.password_change_path.clone(),
			logout_path: services.config.routes.logout_path.clone(),
		}
	}

	fn is_exempt(&self, path: &str) -> bool {
		path == self.logout_path
			|| path == self.change_path
			|| path
				.strip_prefix(self.change_path.as_str())
				.is_some_and(|rest| rest.starts_with('/'))
	}
}

#[async_trait]
impl Stage for PasswordRotationGate {
	fn name(&self) -> &'static str {
		"password_rotation_gate"
	}

	async fn process(&self, ctx: &mut RequestContext) -> Outcome {
		if self.max_age_days == 0 || ctx.is_impersonating() || self.is_exempt(&ctx.path) {
			return Outcome::Continue;
		}
		let Some(principal) = ctx.principal.as_ref() else {
			return Outcome::Continue;
		};
		if !principal.password_expired(self.max_age_days, ctx.now) {
			return Outcome::Continue;
		}

		info!(principal_id = %principal.id, "password rotation required");
		self.audit.log(
			ctx.event(SecurityEventType::PasswordRotationRequired)
				.details(json!({ "max_age_days": self.max_age_days }))
				.build(),
		);
		Outcome::Halt(
			Denial::new(ErrorCode::PasswordExpired, EXPIRED_MESSAGE, self.change_path.clone())
				.with_flash_level(FlashLevel::Warning)
				.with_extra("password_change_url", json!(self.change_path)),
		)
	}
}

#[cfg(test)]
mod tests {
	use chrono::Duration;

	use super::*;
	use crate::context::test_support::context;
	use crate::principal::Principal;
	use crate::services::test_support::harness;

	fn with_password_age(path: &str, days: i64) -> RequestContext {
		let mut ctx = context(path);
		let principal = Principal::new("a@example.com", "A")
			.with_password_hash("$argon2id$stub", ctx.now - Duration::days(days));
		ctx.session.establish(principal.id, principal.credential_fingerprint());
		ctx.principal = Some(principal);
		ctx
	}

	#[tokio::test]
	async fn fresh_password_passes() {
		let h = harness();
		let mut ctx = with_password_age("/dashboard", 10);
		let outcome = PasswordRotationGate::new(&h.services).process(&mut ctx).await;
		assert!(matches!(outcome, Outcome::Continue));
	}

	#[tokio::test]
	async fn expired_password_redirects_without_logout() {
		let h = harness();
		let mut ctx = with_password_age("/dashboard", 120);
		let Outcome::Halt(denial) = PasswordRotationGate::new(&h.services).process(&mut ctx).await
		else {
			panic!("expected rotation");
		};
		assert_eq!(denial.code, ErrorCode::PasswordExpired);
		assert_eq!(denial.status.as_u16(), 403);
		assert_eq!(denial.redirect_to, "/account/password");
		assert!(ctx.session.principal_id().is_some());
	}

	#[tokio::test]
	async fn change_and_logout_routes_are_exempt() {
		let h = harness();
		let gate = PasswordRotationGate::new(&h.services);
		for path in ["/account/password", "/account/password/update", "/logout"] {
			let mut ctx = with_password_age(path, 120);
			assert!(
				matches!(gate.process(&mut ctx).await, Outcome::Continue),
				"{path} should be exempt"
			);
		}
		let mut ctx = with_password_age("/account/passwords-export", 120);
		assert!(matches!(gate.process(&mut ctx).await, Outcome::Halt(_)));
	}
}
