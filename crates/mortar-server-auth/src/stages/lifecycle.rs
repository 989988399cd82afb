// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderValue;
use mortar_server_audit::{AuditService, SecurityEventType};
use serde_json::json;
use tracing::{info, warn};

use crate::context::RequestContext;
use crate::pipeline::{Outcome, Stage};
use crate::response::{Denial, ErrorCode};
use crate::services::SecurityServices;
use crate::session::FlashLevel;
use crate::store::SessionStore;

/// Response header carrying the seconds left before an idle logout.
pub const SESSION_TIMEOUT_WARNING_HEADER: &str = "x-session-timeout-warning";

const TIMEOUT_MESSAGE: &str = "Your session has expired due to inactivity. Please log in again.";

/// Enforces the idle timeout and keeps the last-activity marker fresh.
pub struct SessionLifecycleManager {
	sessions: Arc<dyn SessionStore>,
	audit: Arc<AuditService>,
	idle_timeout_secs: i64,
	warning_secs: i64,
	login_path: String,
}

impl SessionLifecycleManager {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			sessions: Arc::clone(&services.sessions),
			audit: Arc::clone(&services.audit),
			idle_timeout_secs: services.config.session.idle_timeout_secs(),
			warning_secs: services.config.session.warning_secs(),
			login_path: services.config.routes.login_path.clone(),
		}
	}
}

#[async_trait]
impl Stage for SessionLifecycleManager {
	fn name(&self) -> &'static str {
		"session_lifecycle_manager"
	}

	async fn process(&self, ctx: &mut RequestContext) -> Outcome {
		if ctx.session.principal_id().is_none() {
			ctx.session.last_activity_at = None;
			return Outcome::Continue;
		}

		if let Some(last_activity) = ctx.session.last_activity_at {
			let elapsed = (ctx.now - last_activity).num_seconds();

			if elapsed >= self.idle_timeout_secs {
				info!(elapsed_secs = elapsed, route = %ctx.path, "session idle timeout");
				self.audit.log(
					ctx.event(SecurityEventType::SessionTimedOut)
						.details(json!({ "idle_secs": elapsed }))
						.build(),
				);
				ctx.logout();
				return Outcome::Halt(
					Denial::new(ErrorCode::SessionTimeout, TIMEOUT_MESSAGE, self.login_path.clone())
						.with_flash_level(FlashLevel::Warning)
						.with_extra("reason", json!("idle_timeout"))
						.with_extra("idle_timeout_secs", json!(self.idle_timeout_secs)),
				);
			}

			let remaining = self.idle_timeout_secs - elapsed;
			if remaining <= self.warning_secs {
				ctx.response_headers.insert(
					SESSION_TIMEOUT_WARNING_HEADER,
					HeaderValue::from(remaining),
				);
			}
		}

		ctx.session.last_activity_at = Some(ctx.now);
		if !ctx.session_is_new {
			if let Err(e) = self.sessions.touch(ctx.session.id(), ctx.now).await {
				warn!(error = %e, "failed to record session activity");
			}
		}

		Outcome::Continue
	}
}
