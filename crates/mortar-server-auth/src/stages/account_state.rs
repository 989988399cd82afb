// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mortar_server_audit::{AuditService, SecurityEventType};
use serde_json::json;
use tracing::{info, warn};

use crate::appeal::AppealLinks;
use crate::context::RequestContext;
use crate::pipeline::{Outcome, Stage};
use crate::principal::{AccountStatus, BanDetails, Principal};
use crate::response::{Denial, ErrorCode};
use crate::services::SecurityServices;

const PENDING_MESSAGE: &str = "Your account is pending approval. You will be notified once it is active.";
const SUSPENDED_MESSAGE: &str = "Your account has been suspended. Please contact support.";
const ML_BLOCKED_MESSAGE: &str =
	"Your account has been temporarily blocked due to suspicious activity. Please contact support.";

/// Denies principals whose account is not active.
///
/// Status is checked first, then the ML block. Every denial destroys the
/// session. No principal state is written.
pub struct AccountStateGate {
	audit: Arc<AuditService>,
	appeals: AppealLinks,
	login_path: String,
}

impl AccountStateGate {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			audit: Arc::clone(&services.audit),
			appeals: AppealLinks::new(services),
			login_path: services.config.routes.login_path.clone(),
		}
	}

	fn deny_status(&self, ctx: &mut RequestContext, code: ErrorCode, message: &str) -> Outcome {
		let status = ctx
			.principal
			.as_ref()
			.map(|p| p.status.as_str())
			.unwrap_or_default();
		info!(status, route = %ctx.path, "account not active, logging out");
		self.audit.log(
			ctx.event(SecurityEventType::AccountDenied)
				.details(json!({ "status": status }))
				.build(),
		);
		ctx.logout();
		Outcome::Halt(Denial::new(code, message, self.login_path.clone()))
	}

	async fn deny_banned(&self, ctx: &mut RequestContext, principal: &Principal) -> Outcome {
		let ban = principal
			.ban
			.clone()
			.unwrap_or_else(|| BanDetails::permanent("Violation of terms of service", ctx.now));

		let appeal = match self.appeals.issue(principal, ctx.now).await {
			Ok(link) => link,
			Err(e) => {
				warn!(error = %e, "could not issue appeal link, omitting it");
				None
			}
		};

		self.audit.log(
			ctx.event(SecurityEventType::AccountBanned)
				.details(json!({
					"permanent": ban.is_permanent(),
					"appeal_offered": appeal.is_some(),
				}))
				.build(),
		);
		ctx.logout();

		let mut denial = Denial::new(
			ErrorCode::AccountBanned,
			ban_message(&ban),
			self.login_path.clone(),
		)
		.with_extra("ban", ban.to_json());
		if let Some(link) = appeal {
			denial = denial.with_extra(
				"appeal",
				json!({ "url": link.url, "expires_at": link.expires_at.to_rfc3339() }),
			);
		}
		Outcome::Halt(denial)
	}
}

fn ban_message(ban: &BanDetails) -> String {
	match ban.expires_at {
		None => format!(
			"Your account has been banned. Reason: {}. This ban is permanent.",
			ban.reason
		),
		Some(expires_at) => format!(
			"Your account has been banned. Reason: {}. The ban expires on {}.",
			ban.reason,
			format_date(expires_at)
		),
	}
}

fn format_date(at: DateTime<Utc>) -> String {
	at.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[async_trait]
impl Stage for AccountStateGate {
	fn name(&self) -> &'static str {
		"account_state_gate"
	}

	async fn process(&self, ctx: &mut RequestContext) -> Outcome {
		let Some(principal) = ctx.principal.clone() else {
			return Outcome::Continue;
		};

		match principal.status {
			AccountStatus::Active => {}
			AccountStatus::Pending => {
				return self.deny_status(ctx, ErrorCode::AccountPending, PENDING_MESSAGE);
			}
			AccountStatus::Suspended => {
				return self.deny_status(ctx, ErrorCode::AccountSuspended, SUSPENDED_MESSAGE);
			}
			AccountStatus::Banned => {
				let in_force = principal
					.ban
					.as_ref()
					.map_or(true, |ban| ban.is_in_force(ctx.now));
				if in_force {
					return self.deny_banned(ctx, &principal).await;
				}
			}
		}

		if let Some(block) = &principal.ml_block {
			warn!(route = %ctx.path, "principal blocked by risk model, logging out");
			self.audit.log(
				ctx.event(SecurityEventType::AccountMlBlocked)
					.details(json!({ "reason": block.reason }))
					.build(),
			);
			ctx.logout();
			return Outcome::Halt(
				Denial::new(
					ErrorCode::AccountMlBlocked,
					ML_BLOCKED_MESSAGE,
					self.login_path.clone(),
				)
				.with_extra(
					"block",
					json!({
						"reason": block.reason,
						"blocked_at": block.blocked_at.to_rfc3339(),
					}),
				),
			);
		}

		Outcome::Continue
	}
}
