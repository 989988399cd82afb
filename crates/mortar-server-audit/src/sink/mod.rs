// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Destinations for security events.

use std::sync::Arc;

use async_trait::async_trait;

pub use crate::error::AuditSinkError;
use crate::event::{AuditSeverity, SecurityEvent};

pub mod memory;
pub mod tracing;

/// A destination for security events.
///
/// Sinks run on the audit service's background task; a failing sink is
/// logged and skipped, it never reaches the request that produced the event.
#[async_trait]
pub trait AuditSink: Send + Sync {
	fn name(&self) -> &str;

	/// Lowest severity this sink accepts.
	fn min_severity(&self) -> AuditSeverity {
		AuditSeverity::Debug
	}

	async fn publish(&self, event: Arc<SecurityEvent>) -> Result<(), AuditSinkError>;
}
