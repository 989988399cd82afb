// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The only code paths allowed to change a session's critical fields.
//!
//! [`LoginCoordinator`] runs the password step behind the rate limiter,
//! hands off to the two-factor challenge, binds the session in the registry
//! (evicting the principal's other sessions) and handles logout, password
//! changes and impersonation.

use std::sync::Arc;

use mortar_server_audit::{AuditService, SecurityEventType};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::context::RequestContext;
use crate::error::{AuthError, Result};
use crate::password::{hash_password, verify_dummy, verify_password};
use crate::principal::Principal;
use crate::rate_limit::{RateLimited, RateLimitedAuthGuard};
use crate::response::Denial;
use crate::services::SecurityServices;
use crate::session::ImpersonationOverlay;
use crate::store::{PrincipalStore, SessionStore};
use crate::totp;
use crate::two_factor::TwoFactorChallengeGate;
use crate::types::{PrincipalId, SessionId};

#[derive(Debug)]
pub enum LoginOutcome {
	/// The session now belongs to this principal.
	Authenticated(Box<Principal>),
	/// First factor accepted; a code is required.
	TwoFactorRequired,
	/// Wrong identity, password or code. Deliberately unspecific.
	InvalidCredentials,
	/// Refused before checking credentials.
	Throttled(Denial),
}

pub struct LoginCoordinator {
	sessions: Arc<dyn SessionStore>,
	principals: Arc<dyn PrincipalStore>,
	audit: Arc<AuditService>,
	rate_limit: RateLimitedAuthGuard,
	two_factor: TwoFactorChallengeGate,
	login_path: String,
}

impl LoginCoordinator {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			sessions: Arc::clone(&services.sessions),
			principals: Arc::clone(&services.principals),
			audit: Arc::clone(&services.audit),
			rate_limit: RateLimitedAuthGuard::new(services),
			two_factor: TwoFactorChallengeGate::new(services),
			login_path: services.config.routes.login_path.clone(),
		}
	}

	pub fn two_factor(&self) -> &TwoFactorChallengeGate {
		&self.two_factor
	}

	/// Password step of a login.
	#[instrument(skip(self, ctx, email, password), fields(ip = %ctx.client_ip))]
	pub async fn attempt(
		&self,
		ctx: &mut RequestContext,
		email: &str,
		password: &str,
		remember: bool,
	) -> Result<LoginOutcome> {
		if let Err(limited) = self.rate_limit.check(ctx.client_ip, email, ctx.now).await {
			return Ok(self.throttled(ctx, email, limited));
		}

		let principal = self.principals.find_by_email(email).await?;
		let verified = match principal.as_ref().and_then(|p| p.password_hash.as_ref()) {
			Some(hash) => verify_password(password, hash.expose()),
			None => verify_dummy(password),
		};

		let principal = match principal {
			Some(principal) if verified => principal,
			_ => {
				self.rate_limit
					.record_failure(ctx.client_ip, email, ctx.now)
					.await;
				self.audit.log(
					ctx.event(SecurityEventType::LoginFailed)
						.details(json!({ "identity_hash": self.rate_limit.identity_hash(email) }))
						.build(),
				);
				return Ok(LoginOutcome::InvalidCredentials);
			}
		};

		// Counters are only reset once the session is fully established.
		if principal.has_confirmed_two_factor() {
			self.two_factor.begin(ctx, &principal, remember);
			return Ok(LoginOutcome::TwoFactorRequired);
		}

		self.establish(ctx, principal).await
	}

	/// Second step of a login. The challenge is consumed whatever the result.
	///
	/// Wrong codes count against the same counters as wrong passwords.
	#[instrument(skip(self, ctx, code), fields(ip = %ctx.client_ip))]
	pub async fn verify_second_factor(
		&self,
		ctx: &mut RequestContext,
		code: &str,
	) -> Result<LoginOutcome> {
		let challenge = match self.two_factor.validate(ctx).await {
			Ok(challenge) => challenge,
			Err(rejection) => {
				info!(%rejection, "second factor submitted without a valid challenge");
				ctx.session.two_factor = None;
				return Err(AuthError::NoPendingChallenge);
			}
		};

		let principal = self
			.principals
			.find(&challenge.principal_id)
			.await?
			.ok_or(AuthError::PrincipalNotFound(challenge.principal_id))?;

		if let Err(limited) = self
			.rate_limit
			.check(ctx.client_ip, &principal.email, ctx.now)
			.await
		{
			ctx.session.two_factor = None;
			return Ok(self.throttled(ctx, &principal.email, limited));
		}

		let valid = principal
			.two_factor_secret
			.as_ref()
			.is_some_and(|secret| totp::verify_code(secret, code, ctx.now));
		if !valid {
			self.rate_limit
				.record_failure(ctx.client_ip, &principal.email, ctx.now)
				.await;
			self.two_factor.abandon(ctx);
			return Ok(LoginOutcome::InvalidCredentials);
		}

		self.two_factor.complete(ctx);
		self.audit.log(
			ctx.event(SecurityEventType::TwoFactorVerified)
				.principal(principal.id)
				.build(),
		);
		self.establish(ctx, principal).await
	}

	fn throttled(
		&self,
		ctx: &RequestContext,
		identity: &str,
		limited: RateLimited,
	) -> LoginOutcome {
		info!(scope = %limited.scope, "login attempt throttled");
		self.audit.log(
			ctx.event(SecurityEventType::LoginRateLimited)
				.details(json!({
					"identity_hash": self.rate_limit.identity_hash(identity),
					"scope": limited.scope.to_string(),
					"retry_after_secs": limited.retry_after_secs,
				}))
				.build(),
		);
		LoginOutcome::Throttled(limited.into_denial(&self.login_path))
	}

	/// Bind the session to `principal` under a fresh id and evict the
	/// principal's other sessions.
	///
	/// The registry is updated first. If that fails the request's session is
	/// left exactly as it was.
	#[instrument(skip(self, ctx, principal), fields(principal_id = %principal.id))]
	pub async fn establish(
		&self,
		ctx: &mut RequestContext,
		principal: Principal,
	) -> Result<LoginOutcome> {
		let new_id = SessionId::generate();
		self.sessions.bind(&new_id, &principal.id).await?;
		let evicted = match self.sessions.evict_others(&principal.id, &new_id).await {
			Ok(evicted) => evicted,
			Err(e) => {
				if let Err(unbind) = self.sessions.delete(&new_id).await {
					warn!(error = %unbind, "failed to roll back session binding");
				}
				return Err(e.into());
			}
		};

		ctx.session.two_factor = None;
		ctx.session.impersonation = None;
		ctx.impersonated = None;
		ctx.rotate_session_id(new_id);
		ctx.session.regenerate_csrf_token();
		ctx.session
			.establish(principal.id, principal.credential_fingerprint());
		ctx.session.last_activity_at = Some(ctx.now);

		self.rate_limit
			.record_success(ctx.client_ip, &principal.email)
			.await;
		if let Err(e) = self.principals.record_login(&principal.id, ctx.now).await {
			warn!(error = %e, "failed to record last login");
		}

		ctx.principal = Some(principal.clone());
		info!(evicted, "login established");
		self.audit.log(
			ctx.event(SecurityEventType::Login)
				.details(json!({ "evicted_sessions": evicted }))
				.build(),
		);
		Ok(LoginOutcome::Authenticated(Box::new(principal)))
	}

	#[instrument(skip(self, ctx), fields(route = %ctx.path))]
	pub async fn logout(&self, ctx: &mut RequestContext) {
		if ctx.session.principal_id().is_some() {
			self.audit.log(ctx.event(SecurityEventType::Logout).build());
		}
		ctx.logout();
	}

	/// Change the current principal's password. Returns `false` when the
	/// current password is wrong. Other sessions are evicted.
	#[instrument(skip_all, fields(route = %ctx.path))]
	pub async fn change_password(
		&self,
		ctx: &mut RequestContext,
		current_password: &str,
		new_password: &str,
	) -> Result<bool> {
		let principal = ctx
			.principal
			.clone()
			.ok_or_else(|| AuthError::NotPermitted("not logged in".to_string()))?;
		if ctx.is_impersonating() {
			return Err(AuthError::NotPermitted(
				"cannot change password while impersonating".to_string(),
			));
		}

		let current_ok = principal
			.password_hash
			.as_ref()
			.is_some_and(|hash| verify_password(current_password, hash.expose()));
		if !current_ok {
			return Ok(false);
		}

		let hash = hash_password(new_password)?;
		self.principals
			.update_password(&principal.id, &hash, ctx.now)
			.await?;
		let updated = self
			.principals
			.find(&principal.id)
			.await?
			.ok_or(AuthError::PrincipalNotFound(principal.id))?;

		self.establish(ctx, updated).await?;
		Ok(true)
	}

	/// Start acting as `target_id`. Only admins may impersonate, and never
	/// another admin or themselves.
	#[instrument(skip(self, ctx, target_id), fields(target_id = %target_id))]
	pub async fn start_impersonation(
		&self,
		ctx: &mut RequestContext,
		target_id: PrincipalId,
	) -> Result<()> {
		let admin = ctx
			.principal
			.clone()
			.filter(|p| p.is_admin())
			.ok_or_else(|| AuthError::NotPermitted("impersonation requires admin".to_string()))?;
		if ctx.is_impersonating() {
			return Err(AuthError::NotPermitted("already impersonating".to_string()));
		}
		if admin.id == target_id {
			return Err(AuthError::NotPermitted("cannot impersonate yourself".to_string()));
		}

		let target = self
			.principals
			.find(&target_id)
			.await?
			.ok_or(AuthError::PrincipalNotFound(target_id))?;
		if target.is_admin() {
			return Err(AuthError::NotPermitted(
				"cannot impersonate another admin".to_string(),
			));
		}

		ctx.session.impersonation = Some(ImpersonationOverlay {
			admin_id: admin.id,
			target_id,
			started_at: ctx.now,
		});
		ctx.impersonated = Some(target);
		self.audit
			.log(ctx.event(SecurityEventType::ImpersonationStarted).build());
		Ok(())
	}

	/// End impersonation explicitly. Returns `false` if none was active.
	pub fn stop_impersonation(&self, ctx: &mut RequestContext) -> bool {
		if ctx.session.impersonation.is_none() {
			return false;
		}
		self.audit
			.log(ctx.event(SecurityEventType::ImpersonationEnded).build());
		ctx.session.impersonation = None;
		ctx.impersonated = None;
		true
	}
}
