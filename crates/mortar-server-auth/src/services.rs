// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared handles the stages are built from.

use std::sync::Arc;

use mortar_common_secret::SecretString;
use mortar_server_audit::AuditService;
use mortar_server_config::ServerConfig;

use crate::signing::Signer;
use crate::store::{AppealService, CounterStore, PrincipalStore, SessionStore};

/// Stores, audit, signing key and policy for one server instance.
#[derive(Clone)]
pub struct SecurityServices {
	pub sessions: Arc<dyn SessionStore>,
	pub principals: Arc<dyn PrincipalStore>,
	pub counters: Arc<dyn CounterStore>,
	pub appeals: Arc<dyn AppealService>,
	pub audit: Arc<AuditService>,
	pub signer: Arc<Signer>,
	pub identity_salt: SecretString,
	pub config: Arc<ServerConfig>,
}

impl std::fmt::Debug for SecurityServices {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SecurityServices")
			.field("audit", &self.audit)
			.field("integrity_check", &self.config.session.integrity_check_enabled)
			.finish_non_exhaustive()
	}
}
