// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use mortar_server_audit::{AuditService, SecurityEventType};
use serde_json::json;
use tracing::debug;

use crate::context::RequestContext;
use crate::pipeline::{Outcome, Stage};
use crate::response::{Denial, ErrorCode};
use crate::services::SecurityServices;
use crate::types::Role;

/// Where browsers are sent after a role denial.
const HOME_PATH: &str = "/";

/// Rejects anonymous requests.
pub struct RequireAuthentication {
	login_path: String,
}

impl RequireAuthentication {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			login_path: services.config.routes.login_path.clone(),
		}
	}
}

#[async_trait]
impl Stage for RequireAuthentication {
	fn name(&self) -> &'static str {
		"require_authentication"
	}

	async fn process(&self, ctx: &mut RequestContext) -> Outcome {
		if ctx.is_authenticated() {
			return Outcome::Continue;
		}
		debug!(route = %ctx.path, "unauthenticated request");
		Outcome::Halt(Denial::new(
			ErrorCode::Unauthenticated,
			"Please log in to continue.",
			self.login_path.clone(),
		))
	}
}

/// Rejects requests whose effective principal lacks a role.
pub struct RequireRole {
	role: Role,
	audit: Arc<AuditService>,
	login_path: String,
}

impl RequireRole {
	pub fn new(services: &SecurityServices, role: Role) -> Self {
		Self {
			role,
			audit: Arc::clone(&services.audit),
			login_path: services.config.routes.login_path.clone(),
		}
	}
}

#[async_trait]
impl Stage for RequireRole {
	fn name(&self) -> &'static str {
		"require_role"
	}

	async fn process(&self, ctx: &mut RequestContext) -> Outcome {
		let Some(principal) = ctx.effective_principal() else {
			return Outcome::Halt(Denial::new(
				ErrorCode::Unauthenticated,
				"Please log in to continue.",
				self.login_path.clone(),
			));
		};
		if principal.has_role(self.role) {
			return Outcome::Continue;
		}

		debug!(principal_id = %principal.id, role = %self.role, route = %ctx.path, "missing role");
		self.audit.log(
			ctx.event(SecurityEventType::AccessDenied)
				.details(json!({ "required_role": self.role }))
				.build(),
		);
		Outcome::Halt(Denial::new(
			ErrorCode::Forbidden,
			"You do not have permission to access this page.",
			HOME_PATH,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::context::test_support::context;
	use crate::principal::Principal;
	use crate::services::test_support::harness;

	#[tokio::test]
	async fn anonymous_is_unauthenticated() {
		let h = harness();
		let mut ctx = context("/api/me");
		let Outcome::Halt(denial) = RequireAuthentication::new(&h.services)
			.process(&mut ctx)
			.await
		else {
			panic!("expected denial");
		};
		assert_eq!(denial.status.as_u16(), 401);
	}

	#[tokio::test]
	async fn member_cannot_reach_admin() {
		let h = harness();
		let mut ctx = context("/admin");
		ctx.principal = Some(Principal::new("a@example.com", "A"));
		let Outcome::Halt(denial) = RequireRole::new(&h.services, Role::Admin)
			.process(&mut ctx)
			.await
		else {
			panic!("expected denial");
		};
		assert_eq!(denial.code, ErrorCode::Forbidden);
		assert_eq!(denial.status.as_u16(), 403);
	}

	#[tokio::test]
	async fn impersonating_admin_acts_as_target() {
		let h = harness();
		let mut ctx = context("/admin");
		ctx.principal = Some(Principal::new("admin@example.com", "Admin").with_role(Role::Admin));
		ctx.impersonated = Some(Principal::new("user@example.com", "User"));
		let outcome = RequireRole::new(&h.services, Role::Admin)
			.process(&mut ctx)
			.await;
		assert!(matches!(outcome, Outcome::Halt(_)));
	}

	#[tokio::test]
	async fn admin_passes() {
		let h = harness();
		let mut ctx = context("/admin");
		ctx.principal = Some(Principal::new("admin@example.com", "Admin").with_role(Role::Admin));
		let outcome = RequireRole::new(&h.services, Role::Admin)
			.process(&mut ctx)
			.await;
		assert!(matches!(outcome, Outcome::Continue));
	}
}
