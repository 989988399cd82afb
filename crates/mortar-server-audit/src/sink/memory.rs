// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AuditSink, AuditSinkError};
use crate::event::{SecurityEvent, SecurityEventType};

/// Keeps published events in memory. Used by tests and local development.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
	events: Arc<Mutex<Vec<Arc<SecurityEvent>>>>,
}

impl MemoryAuditSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn events(&self) -> Vec<Arc<SecurityEvent>> {
		self.events.lock().await.clone()
	}

	pub async fn events_of(&self, event_type: SecurityEventType) -> Vec<Arc<SecurityEvent>> {
		self
			.events
			.lock()
			.await
			.iter()
			.filter(|e| e.event_type == event_type)
			.cloned()
			.collect()
	}

	/// Wait until at least one event of `event_type` arrives or `timeout` elapses.
	pub async fn wait_for(
		&self,
		event_type: SecurityEventType,
		timeout: Duration,
	) -> Option<Arc<SecurityEvent>> {
		let deadline = tokio::time::Instant::now() + timeout;
		loop {
			if let Some(event) = self.events_of(event_type).await.into_iter().next() {
				return Some(event);
			}
			if tokio::time::Instant::now() >= deadline {
				return None;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	}
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
	fn name(&self) -> &str {
		"memory"
	}

	async fn publish(&self, event: Arc<SecurityEvent>) -> Result<(), AuditSinkError> {
		self.events.lock().await.push(event);
		Ok(())
	}
}
