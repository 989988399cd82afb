// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::event::SecurityEvent;
use crate::sink::AuditSink;

/// Queue in front of the audit sinks.
///
/// [`AuditService::log`] never waits: when the queue is full or the service is
/// disabled the event is dropped and counted as a warning. Callers on the
/// request path therefore cannot be slowed down or failed by audit logging.
pub struct AuditService {
	tx: Option<mpsc::Sender<SecurityEvent>>,
}

impl AuditService {
	/// Start the background dispatcher. Must be called inside a tokio runtime.
	pub fn new(queue_capacity: usize, sinks: Vec<Arc<dyn AuditSink>>) -> Self {
		let (tx, rx) = mpsc::channel(queue_capacity.max(1));

		tokio::spawn(Self::background_task(rx, sinks));

		Self { tx: Some(tx) }
	}

	/// A service that discards every event.
	pub fn disabled() -> Self {
		Self { tx: None }
	}

	async fn background_task(
		mut rx: mpsc::Receiver<SecurityEvent>,
		sinks: Vec<Arc<dyn AuditSink>>,
	) {
		while let Some(event) = rx.recv().await {
			let event = Arc::new(event);

			for sink in &sinks {
				if event.severity < sink.min_severity() {
					continue;
				}

				let sink = Arc::clone(sink);
				let event = Arc::clone(&event);

				tokio::spawn(async move {
					if let Err(e) = sink.publish(event).await {
						warn!(sink = sink.name(), error = %e, "audit sink publish failed");
					}
				});
			}
		}
	}

	/// Queue an event for processing.
	///
	/// Returns `true` if the event was queued, `false` if dropped.
	#[instrument(level = "trace", skip(self, event), fields(event_type = %event.event_type))]
	pub fn log(&self, event: SecurityEvent) -> bool {
		let Some(tx) = &self.tx else {
			return false;
		};
		match tx.try_send(event) {
			Ok(()) => true,
			Err(e) => {
				warn!(error = %e, "dropping security event");
				false
			}
		}
	}
}

impl std::fmt::Debug for AuditService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AuditService")
			.field("enabled", &self.tx.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::event::{AuditSeverity, SecurityEventType};
	use crate::sink::memory::MemoryAuditSink;
	use crate::sink::AuditSinkError;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use tokio::time::{sleep, Duration};

	struct FailingSink {
		attempts: Arc<AtomicUsize>,
	}

	#[async_trait]
	impl AuditSink for FailingSink {
		fn name(&self) -> &str {
			"failing"
		}

		async fn publish(&self, _event: Arc<SecurityEvent>) -> Result<(), AuditSinkError> {
			self.attempts.fetch_add(1, Ordering::SeqCst);
			Err(AuditSinkError::Permanent("sink offline".to_string()))
		}
	}

	struct ErrorsOnlySink {
		inner: MemoryAuditSink,
	}

	#[async_trait]
	impl AuditSink for ErrorsOnlySink {
		fn name(&self) -> &str {
			"errors-only"
		}

		fn min_severity(&self) -> AuditSeverity {
			AuditSeverity::Error
		}

		async fn publish(&self, event: Arc<SecurityEvent>) -> Result<(), AuditSinkError> {
			self.inner.publish(event).await
		}
	}

	#[tokio::test]
	async fn delivers_events_to_sinks() {
		let sink = MemoryAuditSink::new();
		let service = AuditService::new(16, vec![Arc::new(sink.clone())]);

		assert!(service.log(SecurityEvent::builder(SecurityEventType::Login).build()));

		let event = sink
			.wait_for(SecurityEventType::Login, Duration::from_secs(1))
			.await;
		assert!(event.is_some());
	}

	#[tokio::test]
	async fn failing_sink_does_not_affect_other_sinks() {
		let attempts = Arc::new(AtomicUsize::new(0));
		let memory = MemoryAuditSink::new();
		let service = AuditService::new(
			16,
			vec![
				Arc::new(FailingSink {
					attempts: Arc::clone(&attempts),
				}),
				Arc::new(memory.clone()),
			],
		);

		assert!(service.log(SecurityEvent::builder(SecurityEventType::Logout).build()));
		assert!(memory
			.wait_for(SecurityEventType::Logout, Duration::from_secs(1))
			.await
			.is_some());
		sleep(Duration::from_millis(20)).await;
		assert_eq!(attempts.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn sink_severity_threshold_is_applied() {
		let memory = MemoryAuditSink::new();
		let service = AuditService::new(
			16,
			vec![Arc::new(ErrorsOnlySink {
				inner: memory.clone(),
			})],
		);

		service.log(SecurityEvent::builder(SecurityEventType::Login).build());
		service.log(SecurityEvent::builder(SecurityEventType::SessionIntegrityViolation).build());

		assert!(memory
			.wait_for(
				SecurityEventType::SessionIntegrityViolation,
				Duration::from_secs(1)
			)
			.await
			.is_some());
		sleep(Duration::from_millis(20)).await;
		assert!(memory.events_of(SecurityEventType::Login).await.is_empty());
	}

	#[tokio::test]
	async fn disabled_service_drops_events() {
		let service = AuditService::disabled();
		assert!(!service.log(SecurityEvent::builder(SecurityEventType::Login).build()));
	}
}
