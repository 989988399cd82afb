// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic purge of idle sessions, closed rate-limit windows and expired
//! appeal nonces.
//!
//! Sessions are kept for one extra idle period past their timeout so that a
//! returning client still gets the "session expired" notice rather than a
//! silent fresh session.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::services::SecurityServices;
use crate::store::{AppealService, CounterStore, SessionStore};

/// What one cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
	pub sessions_deleted: u64,
	pub counters_deleted: u64,
	pub tokens_deleted: u64,
}

impl CleanupReport {
	pub fn total(&self) -> u64 {
		self.sessions_deleted + self.counters_deleted + self.tokens_deleted
	}
}

#[derive(Clone)]
pub struct StoreCleanup {
	sessions: Arc<dyn SessionStore>,
	counters: Arc<dyn CounterStore>,
	appeals: Arc<dyn AppealService>,
	retention: Duration,
	interval: StdDuration,
}

impl StoreCleanup {
	pub fn new(services: &SecurityServices) -> Self {
		let session = &services.config.session;
		Self {
			sessions: Arc::clone(&services.sessions),
			counters: Arc::clone(&services.counters),
			appeals: Arc::clone(&services.appeals),
			retention: Duration::seconds(session.idle_timeout_secs() * 2),
			interval: StdDuration::from_secs(session.cleanup_interval_secs),
		}
	}

	/// One pass over every store. A failing store is logged and skipped.
	#[instrument(skip(self), fields(job_id = "store-cleanup"))]
	pub async fn run(&self, now: DateTime<Utc>) -> CleanupReport {
		let sessions_deleted = match self.sessions.purge_idle(now - self.retention).await {
			Ok(n) => n,
			Err(e) => {
				warn!(error = %e, "failed to purge idle sessions");
				0
			}
		};
		let counters_deleted = match self.counters.purge_expired(now).await {
			Ok(n) => n,
			Err(e) => {
				warn!(error = %e, "failed to purge expired counters");
				0
			}
		};
		let tokens_deleted = match self.appeals.purge_expired(now).await {
			Ok(n) => n,
			Err(e) => {
				warn!(error = %e, "failed to purge expired appeal tokens");
				0
			}
		};

		let report = CleanupReport {
			sessions_deleted,
			counters_deleted,
			tokens_deleted,
		};
		info!(
			sessions_deleted,
			counters_deleted,
			tokens_deleted,
			total = report.total(),
			"Store cleanup completed"
		);
		report
	}

	/// Run [`StoreCleanup::run`] every `cleanup_interval_secs` until the
	/// handle is aborted. The first pass happens one interval after spawning.
	pub fn spawn(self) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(self.interval);
			ticker.tick().await;

			loop {
				ticker.tick().await;
				debug!("Running store cleanup");
				self.run(Utc::now()).await;
			}
		})
	}

	#[cfg(test)]
	fn every(mut self, interval: StdDuration) -> Self {
		self.interval = interval;
		self
	}
}
