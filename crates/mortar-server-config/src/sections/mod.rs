// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod audit;
mod http;
mod impersonation;
mod logging;
mod password;
mod rate_limit;
mod routes;
mod session;
mod two_factor;

pub use audit::{AuditConfig, AuditConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use impersonation::{ImpersonationConfig, ImpersonationConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use password::{PasswordPolicyConfig, PasswordPolicyConfigLayer};
pub use rate_limit::{RateLimitConfig, RateLimitConfigLayer};
pub use routes::{RoutesConfig, RoutesConfigLayer};
pub use session::{SessionConfig, SessionConfigLayer, DEFAULT_SESSION_COOKIE_NAME};
pub use two_factor::{TwoFactorConfig, TwoFactorConfigLayer};
