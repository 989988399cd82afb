// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;

use super::{AuditSink, AuditSinkError};
use crate::event::{AuditSeverity, SecurityEvent};

/// Writes security events to the `mortar::security` tracing target.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
	fn name(&self) -> &str {
		"tracing"
	}

	async fn publish(&self, event: Arc<SecurityEvent>) -> Result<(), AuditSinkError> {
		let principal_id = event.principal_id.as_deref().unwrap_or("-");
		let session = event.session_id_hash.as_deref().unwrap_or("-");
		let ip = event.ip_address.as_deref().unwrap_or("-");
		let route = event.route.as_deref().unwrap_or("-");

		match event.severity {
			AuditSeverity::Critical | AuditSeverity::Error => tracing::error!(
				target: "mortar::security",
				event_type = %event.event_type,
				principal_id,
				session,
				ip,
				route,
				details = %event.details,
				"security event"
			),
			AuditSeverity::Warning => tracing::warn!(
				target: "mortar::security",
				event_type = %event.event_type,
				principal_id,
				session,
				ip,
				route,
				details = %event.details,
				"security event"
			),
			_ => tracing::info!(
				target: "mortar::security",
				event_type = %event.event_type,
				principal_id,
				session,
				ip,
				route,
				details = %event.details,
				"security event"
			),
		}
		Ok(())
	}
}
