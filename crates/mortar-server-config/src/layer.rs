// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration layer merged across sources.

use serde::Deserialize;

use crate::sections::{
	AuditConfigLayer, HttpConfigLayer, ImpersonationConfigLayer, LoggingConfigLayer,
	PasswordPolicyConfigLayer, RateLimitConfigLayer, RoutesConfigLayer, SessionConfigLayer,
	TwoFactorConfigLayer,
};

/// One source's view of the configuration. Every section is optional so a
/// higher-precedence source only overrides what it actually sets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub session: Option<SessionConfigLayer>,
	#[serde(default)]
	pub impersonation: Option<ImpersonationConfigLayer>,
	#[serde(default)]
	pub two_factor: Option<TwoFactorConfigLayer>,
	#[serde(default)]
	pub rate_limit: Option<RateLimitConfigLayer>,
	#[serde(default)]
	pub password: Option<PasswordPolicyConfigLayer>,
	#[serde(default)]
	pub routes: Option<RoutesConfigLayer>,
	#[serde(default)]
	pub audit: Option<AuditConfigLayer>,
}

macro_rules! merge_section {
	($self:ident, $other:ident, $field:ident) => {
		if let Some(incoming) = $other.$field {
			match $self.$field.as_mut() {
				Some(existing) => existing.merge(incoming),
				None => $self.$field = Some(incoming),
			}
		}
	};
}

impl ServerConfigLayer {
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section!(self, other, http);
		merge_section!(self, other, logging);
		merge_section!(self, other, session);
		merge_section!(self, other, impersonation);
		merge_section!(self, other, two_factor);
		merge_section!(self, other, rate_limit);
		merge_section!(self, other, password);
		merge_section!(self, other, routes);
		merge_section!(self, other, audit);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_fills_missing_sections() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer {
			session: Some(SessionConfigLayer {
				idle_timeout_minutes: Some(45),
				..Default::default()
			}),
			..Default::default()
		});
		assert_eq!(
			base.session.unwrap().idle_timeout_minutes,
			Some(45)
		);
	}

	#[test]
	fn test_merge_field_level_override() {
		let mut base = ServerConfigLayer {
			session: Some(SessionConfigLayer {
				idle_timeout_minutes: Some(45),
				warning_minutes: Some(10),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			session: Some(SessionConfigLayer {
				warning_minutes: Some(2),
				..Default::default()
			}),
			..Default::default()
		});
		let session = base.session.unwrap();
		assert_eq!(session.idle_timeout_minutes, Some(45));
		assert_eq!(session.warning_minutes, Some(2));
	}
}
