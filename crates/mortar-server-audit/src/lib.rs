// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod error;
pub mod event;
pub mod pipeline;
pub mod sink;

pub use error::{AuditError, AuditResult, AuditSinkError};
pub use event::{
	hash_session_id, AuditSeverity, SecurityEvent, SecurityEventBuilder, SecurityEventType,
};
pub use pipeline::AuditService;
pub use sink::memory::MemoryAuditSink;
pub use sink::tracing::TracingAuditSink;
pub use sink::AuditSink;

pub use mortar_server_config::AuditConfig;

use std::sync::Arc;

/// Build the audit service described by `config`.
pub fn from_config(config: &AuditConfig, sinks: Vec<Arc<dyn AuditSink>>) -> AuditService {
	if config.enabled {
		AuditService::new(config.queue_capacity, sinks)
	} else {
		AuditService::disabled()
	}
}
