// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use mortar_server_audit::{AuditService, SecurityEventType};
use tracing::{debug, error, warn};

use crate::context::RequestContext;
use crate::pipeline::{Outcome, Stage};
use crate::response::{Denial, ErrorCode};
use crate::services::SecurityServices;
use crate::signing::{constant_time_eq, Purpose, Signer};

const VIOLATION_MESSAGE: &str = "Your session is no longer valid. Please log in again.";
const CREDENTIALS_CHANGED_MESSAGE: &str =
	"Your password was changed. Please log in again.";

/// Detects out-of-band changes to the session's critical fields.
///
/// The signature is checked before the handler and recomputed after it. A
/// session without a stored signature is not checked; it is signed on the
/// way out. Independently of signing, the credential fingerprint bound at
/// login must still match the principal's current password hash.
pub struct SessionIntegrityValidator {
	signer: Arc<Signer>,
	audit: Arc<AuditService>,
	enabled: bool,
	login_path: String,
}

impl SessionIntegrityValidator {
	pub fn new(services: &SecurityServices) -> Self {
		Self {
			signer: Arc::clone(&services.signer),
			audit: Arc::clone(&services.audit),
			enabled: services.config.session.integrity_check_enabled,
			login_path: services.config.routes.login_path.clone(),
		}
	}

	fn signature_mismatch(&self, ctx: &RequestContext) -> bool {
		if !self.enabled {
			return false;
		}
		ctx.session.signature().is_some_and(|stored| {
			let payload = ctx.session.critical().canonical_bytes();
			!self.signer.verify(Purpose::SessionIntegrity, &payload, stored)
		})
	}
}

/// The session was bound to a credential the principal no longer has.
fn credential_changed(ctx: &RequestContext) -> bool {
	let Some(principal) = ctx.principal.as_ref() else {
		return false;
	};
	if ctx.session.principal_id() != Some(principal.id) {
		return false;
	}
	let current = principal.credential_fingerprint();
	match (ctx.session.critical().credential_fingerprint(), current.as_deref()) {
		(None, None) => false,
		(Some(bound), Some(current)) => !constant_time_eq(bound.as_bytes(), current.as_bytes()),
		_ => true,
	}
}

#[async_trait]
impl Stage for SessionIntegrityValidator {
	fn name(&self) -> &'static str {
		"session_integrity_validator"
	}

	async fn process(&self, ctx: &mut RequestContext) -> Outcome {
		if self.signature_mismatch(ctx) {
			let principal_id = ctx.session.principal_id();
			error!(
				principal_id = ?principal_id,
				session = %mortar_server_audit::hash_session_id(ctx.session.id().as_str()),
				ip = %ctx.client_ip,
				route = %ctx.path,
				timestamp = %ctx.now,
				"session integrity violation"
			);
			self.audit
				.log(ctx.event(SecurityEventType::SessionIntegrityViolation).build());

			ctx.logout();
			return Outcome::Halt(Denial::new(
				ErrorCode::SessionIntegrityViolation,
				VIOLATION_MESSAGE,
				self.login_path.clone(),
			));
		}

		if credential_changed(ctx) {
			warn!(
				principal_id = ?ctx.session.principal_id(),
				route = %ctx.path,
				"credentials changed since login, ending session"
			);
			self.audit
				.log(ctx.event(SecurityEventType::CredentialsChanged).build());

			ctx.logout();
			return Outcome::Halt(Denial::new(
				ErrorCode::CredentialsChanged,
				CREDENTIALS_CHANGED_MESSAGE,
				self.login_path.clone(),
			));
		}

		Outcome::Continue
	}

	async fn after(&self, ctx: &mut RequestContext) {
		if !self.enabled {
			return;
		}
		if ctx.session.critical().is_empty() {
			ctx.session.set_signature(None);
			return;
		}
		let payload = ctx.session.critical().canonical_bytes();
		let signature = self.signer.sign(Purpose::SessionIntegrity, &payload);
		debug!("session signature refreshed");
		ctx.session.set_signature(Some(signature));
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;
	use crate::context::test_support::context;
	use crate::services::test_support::harness;
	use crate::types::PrincipalId;

	async fn signed_context(validator: &SessionIntegrityValidator) -> RequestContext {
		let mut ctx = context("/api/me");
		ctx.session.establish(PrincipalId::generate(), Some("fp".to_string()));
		validator.after(&mut ctx).await;
		ctx
	}

	#[tokio::test]
	async fn first_request_is_signed_after_handler() {
		let h = harness();
		let validator = SessionIntegrityValidator::new(&h.services);
		let mut ctx = context("/api/me");
		ctx.session.establish(PrincipalId::generate(), None);

		assert!(matches!(validator.process(&mut ctx).await, Outcome::Continue));
		assert!(ctx.session.signature().is_none());

		validator.after(&mut ctx).await;
		assert!(ctx.session.signature().is_some());
	}

	#[tokio::test]
	async fn untouched_session_passes() {
		let h = harness();
		let validator = SessionIntegrityValidator::new(&h.services);
		let mut ctx = signed_context(&validator).await;
		assert!(matches!(validator.process(&mut ctx).await, Outcome::Continue));
	}

	#[tokio::test]
	async fn swapped_identity_is_a_violation() {
		let h = harness();
		let validator = SessionIntegrityValidator::new(&h.services);
		let mut ctx = signed_context(&validator).await;
		let old_token = ctx.session.csrf_token().clone();

		ctx.session.critical.login_identity = Some(PrincipalId::generate());

		let Outcome::Halt(denial) = validator.process(&mut ctx).await else {
			panic!("expected violation");
		};
		assert_eq!(denial.code, ErrorCode::SessionIntegrityViolation);
		assert_eq!(denial.status.as_u16(), 419);
		assert!(ctx.session.principal_id().is_none());
		assert_ne!(ctx.session.csrf_token(), &old_token);
		assert!(!ctx.take_discarded_sessions().is_empty());
	}

	#[tokio::test]
	async fn changed_fingerprint_is_a_violation() {
		let h = harness();
		let validator = SessionIntegrityValidator::new(&h.services);
		let mut ctx = signed_context(&validator).await;
		ctx.session.critical.credential_fingerprint = Some("other".to_string());
		assert!(matches!(validator.process(&mut ctx).await, Outcome::Halt(_)));
	}

	#[tokio::test]
	async fn logout_in_handler_clears_signature() {
		let h = harness();
		let validator = SessionIntegrityValidator::new(&h.services);
		let mut ctx = signed_context(&validator).await;
		ctx.logout();
		validator.after(&mut ctx).await;
		assert!(ctx.session.signature().is_none());
	}

	#[tokio::test]
	async fn disabled_validator_skips_checks() {
		let mut config = mortar_server_config::ServerConfig::default();
		config.session.integrity_check_enabled = false;
		let h = crate::services::test_support::harness_with(config);
		let validator = SessionIntegrityValidator::new(&h.services);
		let mut ctx = context("/api/me");
		ctx.session.establish(PrincipalId::generate(), None);
		ctx.session.set_signature(Some("garbage".to_string()));
		assert!(matches!(validator.process(&mut ctx).await, Outcome::Continue));
	}

	mod credentials {
		use std::time::Duration as StdDuration;

		use super::*;
		use crate::pipeline::{Decision, Pipeline};
		use crate::principal::Principal;
		use crate::store::{PrincipalStore, SessionStore};

		fn with_password(hash: &str) -> Principal {
			Principal::new("carol@example.com", "Carol").with_password_hash(hash, chrono::Utc::now())
		}

		#[tokio::test]
		async fn password_reset_elsewhere_ends_session() {
			let h = harness();
			let validator = SessionIntegrityValidator::new(&h.services);
			let principal = with_password("$argon2id$one");
			let mut ctx = context("/api/me");
			ctx.session
				.establish(principal.id, principal.credential_fingerprint());
			validator.after(&mut ctx).await;

			let mut reset = principal.clone();
			reset.password_hash = Some("$argon2id$two".into());
			ctx.principal = Some(reset);

			let Outcome::Halt(denial) = validator.process(&mut ctx).await else {
				panic!("expected the session to end");
			};
			assert_eq!(denial.code, ErrorCode::CredentialsChanged);
			assert_eq!(denial.status.as_u16(), 419);
			assert!(ctx.session.principal_id().is_none());
			h.audit_sink
				.wait_for(SecurityEventType::CredentialsChanged, StdDuration::from_secs(1))
				.await
				.unwrap();
		}

		#[tokio::test]
		async fn password_added_to_passwordless_account_ends_session() {
			let h = harness();
			let validator = SessionIntegrityValidator::new(&h.services);
			let principal = with_password("$argon2id$one");
			let mut ctx = context("/api/me");
			ctx.session.establish(principal.id, None);
			ctx.principal = Some(principal);
			assert!(matches!(validator.process(&mut ctx).await, Outcome::Halt(_)));
		}

		#[tokio::test]
		async fn matching_credential_passes_even_when_signing_is_disabled() {
			let mut config = mortar_server_config::ServerConfig::default();
			config.session.integrity_check_enabled = false;
			let h = crate::services::test_support::harness_with(config);
			let validator = SessionIntegrityValidator::new(&h.services);
			let principal = with_password("$argon2id$one");
			let mut ctx = context("/api/me");
			ctx.session
				.establish(principal.id, principal.credential_fingerprint());
			ctx.principal = Some(principal.clone());
			assert!(matches!(validator.process(&mut ctx).await, Outcome::Continue));

			let mut reset = principal;
			reset.password_hash = Some("$argon2id$two".into());
			ctx.principal = Some(reset);
			assert!(matches!(validator.process(&mut ctx).await, Outcome::Halt(_)));
		}

		#[tokio::test]
		async fn store_side_reset_is_caught_by_the_standard_pipeline() {
			let h = harness();
			let principal = with_password("$argon2id$one");
			h.principals.insert(principal.clone()).await;
			let pipeline = Pipeline::standard(&h.services);

			let mut ctx = context("/api/me");
			ctx.session
				.establish(principal.id, principal.credential_fingerprint());
			ctx.session.last_activity_at = Some(ctx.now);
			h.sessions.bind(ctx.session.id(), &principal.id).await.unwrap();

			assert!(matches!(pipeline.run_before(&mut ctx).await, Decision::Proceed));
			pipeline.run_after(&mut ctx).await;
			assert!(ctx.session.signature().is_some());

			h.principals
				.update_password(&principal.id, "$argon2id$reset", ctx.now)
				.await
				.unwrap();

			let Decision::Respond(response) = pipeline.run_before(&mut ctx).await else {
				panic!("expected the session to end");
			};
			assert_eq!(response.status.as_u16(), 419);
			assert!(ctx.session.principal_id().is_none());
		}
	}

	mod proptests {
		use super::*;

		proptest! {
			#[test]
			fn non_critical_mutation_never_trips(
				entries in proptest::collection::vec(("[a-z_]{1,12}", any::<i64>()), 0..16)
			) {
				let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
				rt.block_on(async {
					let h = harness();
					let validator = SessionIntegrityValidator::new(&h.services);
					let mut ctx = signed_context(&validator).await;

					for (key, value) in &entries {
						ctx.session.data.insert(key.clone(), *value);
					}
					ctx.session.last_activity_at = Some(ctx.now);
					ctx.session.flash(crate::session::FlashLevel::Info, "saved");
					ctx.session.regenerate_csrf_token();

					prop_assert!(matches!(validator.process(&mut ctx).await, Outcome::Continue));
					Ok(())
				})?;
			}

			#[test]
			fn any_identity_swap_is_detected(seed in any::<u128>()) {
				let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
				rt.block_on(async {
					let h = harness();
					let validator = SessionIntegrityValidator::new(&h.services);
					let mut ctx = signed_context(&validator).await;
					let forged = PrincipalId::new(uuid::Uuid::from_u128(seed));
					prop_assume!(Some(forged) != ctx.session.principal_id());

					ctx.session.critical.login_identity = Some(forged);

					prop_assert!(matches!(validator.process(&mut ctx).await, Outcome::Halt(_)));
					Ok(())
				})?;
			}
		}
	}
}
