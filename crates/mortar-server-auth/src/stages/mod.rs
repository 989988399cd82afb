// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The per-request security stages, in the order [`crate::Pipeline::standard`]
//! runs them.

mod account_state;
mod concurrent;
mod identity;
mod impersonation;
mod integrity;
mod lifecycle;
mod password_rotation;
mod require;

pub use account_state::AccountStateGate;
pub use concurrent::ConcurrentSessionEnforcer;
pub use identity::IdentityResolver;
pub use impersonation::{apply_no_store_headers, ImpersonationGuard};
pub use integrity::SessionIntegrityValidator;
pub use lifecycle::{SessionLifecycleManager, SESSION_TIMEOUT_WARNING_HEADER};
pub use password_rotation::PasswordRotationGate;
pub use require::{RequireAuthentication, RequireRole};
