// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ordered composition of security stages.
//!
//! Stages run front to back before the handler. The first stage that halts
//! decides the response and later stages never run. After the handler, the
//! `after` hooks run back to front so the outermost stage sees the final
//! state last.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::context::RequestContext;
use crate::response::{Denial, GateResponse};
use crate::services::SecurityServices;
use crate::stages::{
	AccountStateGate, ConcurrentSessionEnforcer, IdentityResolver, ImpersonationGuard,
	PasswordRotationGate, RequireAuthentication, RequireRole, SessionIntegrityValidator,
	SessionLifecycleManager,
};
use crate::two_factor::TwoFactorChallengeGate;
use crate::types::Role;

/// Result of a stage's pre-handler check.
#[derive(Debug)]
pub enum Outcome {
	Continue,
	Halt(Denial),
}

#[async_trait]
pub trait Stage: Send + Sync {
	fn name(&self) -> &'static str;

	async fn process(&self, ctx: &mut RequestContext) -> Outcome;

	/// Post-handler hook. Only runs when every stage continued.
	async fn after(&self, _ctx: &mut RequestContext) {}
}

/// What the caller should do after the pre-handler pass.
#[derive(Debug)]
pub enum Decision {
	/// Run the handler, then [`Pipeline::run_after`].
	Proceed,
	/// Send this response instead of running the handler.
	Respond(GateResponse),
}

#[derive(Clone, Default)]
pub struct Pipeline {
	stages: Vec<Arc<dyn Stage>>,
}

impl std::fmt::Debug for Pipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Pipeline")
			.field("stages", &self.stage_names())
			.finish()
	}
}

impl Pipeline {
	pub fn builder() -> PipelineBuilder {
		PipelineBuilder::default()
	}

	/// The per-request chain for authenticated areas.
	pub fn standard(services: &SecurityServices) -> Self {
		Self::builder()
			.stage(IdentityResolver::new(services))
			.stage(AccountStateGate::new(services))
			.stage(SessionIntegrityValidator::new(services))
			.stage(ConcurrentSessionEnforcer::new(services))
			.stage(SessionLifecycleManager::new(services))
			.stage(ImpersonationGuard::new(services))
			.stage(PasswordRotationGate::new(services))
			.build()
	}

	/// [`Pipeline::standard`] followed by an authentication requirement.
	pub fn authenticated(services: &SecurityServices) -> Self {
		Self::standard(services)
			.extended()
			.stage(RequireAuthentication::new(services))
			.build()
	}

	/// [`Pipeline::authenticated`] restricted to principals holding `role`.
	pub fn with_role(services: &SecurityServices, role: Role) -> Self {
		Self::authenticated(services)
			.extended()
			.stage(RequireRole::new(services, role))
			.build()
	}

	/// [`Pipeline::standard`] followed by the pending-challenge check, for the
	/// second-factor form.
	pub fn two_factor(services: &SecurityServices) -> Self {
		Self::standard(services)
			.extended()
			.stage(TwoFactorChallengeGate::new(services))
			.build()
	}

	/// Continue building from this pipeline's stages.
	pub fn extended(self) -> PipelineBuilder {
		PipelineBuilder {
			stages: self.stages,
		}
	}

	pub fn stage_names(&self) -> Vec<&'static str> {
		self.stages.iter().map(|s| s.name()).collect()
	}

	#[instrument(level = "debug", skip_all, fields(path = %ctx.path))]
	pub async fn run_before(&self, ctx: &mut RequestContext) -> Decision {
		for stage in &self.stages {
			match stage.process(ctx).await {
				Outcome::Continue => {}
				Outcome::Halt(denial) => {
					debug!(stage = stage.name(), code = %denial.code, "request halted");
					return Decision::Respond(denial.render(ctx));
				}
			}
		}
		Decision::Proceed
	}

	#[instrument(level = "debug", skip_all, fields(path = %ctx.path))]
	pub async fn run_after(&self, ctx: &mut RequestContext) {
		for stage in self.stages.iter().rev() {
			stage.after(ctx).await;
		}
	}
}

#[derive(Default)]
pub struct PipelineBuilder {
	stages: Vec<Arc<dyn Stage>>,
}

impl PipelineBuilder {
	pub fn stage<S: Stage + 'static>(mut self, stage: S) -> Self {
		self.stages.push(Arc::new(stage));
		self
	}

	pub fn build(self) -> Pipeline {
		Pipeline {
			stages: self.stages,
		}
	}
}
