// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::pipeline::{Outcome, Stage};
use crate::services::SecurityServices;
use crate::store::PrincipalStore;

/// Loads the session's principal, and the impersonation target if any.
///
/// Never halts: a failed or empty lookup leaves the request unauthenticated.
pub struct IdentityResolver {
	principals: Arc<dyn PrincipalStore>,
}

impl IdentityResolver {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			principals: Arc::clone(&services.principals),
		}
	}
}

#[async_trait]
impl Stage for IdentityResolver {
	fn name(&self) -> &'static str {
		"identity_resolver"
	}

	async fn process(&self, ctx: &mut RequestContext) -> Outcome {
		ctx.principal = None;
		ctx.impersonated = None;

		let Some(principal_id) = ctx.session.principal_id() else {
			return Outcome::Continue;
		};

		match self.principals.find(&principal_id).await {
			Ok(Some(principal)) => ctx.principal = Some(principal),
			Ok(None) => {
				debug!(principal_id = %principal_id, "session bound to unknown principal");
				return Outcome::Continue;
			}
			Err(e) => {
				warn!(principal_id = %principal_id, error = %e, "principal lookup failed, continuing unauthenticated");
				return Outcome::Continue;
			}
		}

		let Some(overlay) = ctx.session.impersonation.as_ref() else {
			return Outcome::Continue;
		};
		if overlay.admin_id != principal_id {
			return Outcome::Continue;
		}

		let target_id = overlay.target_id;
		match self.principals.find(&target_id).await {
			Ok(target) => ctx.impersonated = target,
			Err(e) => {
				warn!(target_id = %target_id, error = %e, "impersonation target lookup failed");
			}
		}

		Outcome::Continue
	}
}
