// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request security pipeline for the mortar server.
//!
//! Every authenticated request passes through an ordered [`Pipeline`] of
//! [`Stage`]s that resolve the principal, enforce account state, detect
//! tampered or superseded sessions, apply idle timeouts and police
//! impersonation. A stage either lets the request continue or halts it with
//! a [`Denial`], rendered as JSON for API clients and as a flash plus
//! redirect for browsers.
//!
//! Login, two-factor completion, logout, password changes and impersonation
//! go through [`LoginCoordinator`], the only code allowed to rewrite a
//! session's critical fields.

pub mod appeal;
pub mod cleanup;
pub mod context;
pub mod error;
pub mod login;
pub mod memory;
pub mod password;
pub mod pipeline;
pub mod principal;
pub mod rate_limit;
pub mod response;
pub mod services;
pub mod session;
pub mod signing;
pub mod stages;
pub mod store;
pub mod totp;
pub mod two_factor;
pub mod types;

pub use appeal::{AppealLink, AppealLinks, APPEAL_LINK_TTL_HOURS};
pub use cleanup::{CleanupReport, StoreCleanup};
pub use context::{RequestContext, X_REQUESTED_WITH};
pub use error::{AppealLinkError, AuthError, Result, StoreError, StoreResult};
pub use login::{LoginCoordinator, LoginOutcome};
pub use memory::{
	MemoryAppealService, MemoryCounterStore, MemoryPrincipalStore, MemorySessionStore,
};
pub use password::{hash_password, verify_password};
pub use pipeline::{Decision, Outcome, Pipeline, PipelineBuilder, Stage};
pub use principal::{AccountStatus, BanDetails, MlBlock, Principal};
pub use rate_limit::{LimitScope, RateLimited, RateLimitedAuthGuard};
pub use response::{
	Denial, ErrorCode, GateBody, GateResponse, STATUS_IMPERSONATION_EXPIRED,
	STATUS_SESSION_EXPIRED,
};
pub use services::SecurityServices;
pub use session::{
	CriticalFields, Flash, FlashLevel, ImpersonationOverlay, SessionData, SessionRecord,
	TwoFactorChallenge,
};
pub use signing::{constant_time_eq, Purpose, Signer};
pub use stages::{
	AccountStateGate, ConcurrentSessionEnforcer, IdentityResolver, ImpersonationGuard,
	PasswordRotationGate, RequireAuthentication, RequireRole, SessionIntegrityValidator,
	SessionLifecycleManager, SESSION_TIMEOUT_WARNING_HEADER,
};
pub use store::{AppealService, Counter, CounterStore, PrincipalStore, SessionStore};
pub use two_factor::{ChallengeRejection, ChallengeState, TwoFactorChallengeGate};
pub use types::{CsrfToken, PrincipalId, Role, SessionId};
