// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-request state threaded through the pipeline stages.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use http::header::{HeaderMap, ACCEPT};
use http::Method;
use mortar_server_audit::{SecurityEventBuilder, SecurityEventType};

use crate::principal::Principal;
use crate::session::SessionRecord;
use crate::types::SessionId;

pub const X_REQUESTED_WITH: &str = "x-requested-with";

/// Everything a stage may read or change while handling one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
	pub method: Method,
	pub path: String,
	pub headers: HeaderMap,
	pub client_ip: IpAddr,
	/// Clock reading used by every time-based check for this request.
	pub now: DateTime<Utc>,
	pub session: SessionRecord,
	/// The session has not been persisted yet.
	pub session_is_new: bool,
	/// The real authenticated principal (the admin, when impersonating).
	pub principal: Option<Principal>,
	/// The principal being impersonated, if any.
	pub impersonated: Option<Principal>,
	/// Headers to add to whatever response is sent.
	pub response_headers: HeaderMap,
	discarded_sessions: Vec<SessionId>,
}

impl RequestContext {
	pub fn new(
		method: Method,
		path: impl Into<String>,
		headers: HeaderMap,
		client_ip: IpAddr,
		session: SessionRecord,
		session_is_new: bool,
		now: DateTime<Utc>,
	) -> Self {
		Self {
			method,
			path: path.into(),
			headers,
			client_ip,
			now,
			session,
			session_is_new,
			principal: None,
			impersonated: None,
			response_headers: HeaderMap::new(),
			discarded_sessions: Vec::new(),
		}
	}

	/// Whether the client wants a JSON body rather than a redirect.
	pub fn expects_json(&self) -> bool {
		let accepts_json = self
			.headers
			.get(ACCEPT)
			.and_then(|v| v.to_str().ok())
			.is_some_and(|v| v.contains("application/json"));
		let is_xhr = self
			.headers
			.get(X_REQUESTED_WITH)
			.and_then(|v| v.to_str().ok())
			.is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"));
		accepts_json || is_xhr || self.path.starts_with("/api/")
	}

	pub fn is_authenticated(&self) -> bool {
		self.principal.is_some()
	}

	pub fn is_impersonating(&self) -> bool {
		self.session.impersonation.is_some()
	}

	/// The principal requests act as: the impersonated one if present.
	pub fn effective_principal(&self) -> Option<&Principal> {
		self.impersonated.as_ref().or(self.principal.as_ref())
	}

	/// Destroy the session and start a fresh anonymous one.
	///
	/// The old id is remembered so the caller can delete it from the store.
	pub fn logout(&mut self) {
		let old = self.session.invalidate(self.now);
		if !self.session_is_new {
			self.discarded_sessions.push(old);
		}
		self.session_is_new = true;
		self.principal = None;
		self.impersonated = None;
	}

	/// Move the current session's contents to a new `id`.
	pub fn rotate_session_id(&mut self, id: SessionId) {
		let old = self.session.replace_id(id);
		if !self.session_is_new {
			self.discarded_sessions.push(old);
		}
		self.session_is_new = true;
	}

	/// Session ids that must be removed from the store.
	pub fn take_discarded_sessions(&mut self) -> Vec<SessionId> {
		std::mem::take(&mut self.discarded_sessions)
	}

	/// A security event pre-filled with this request's actor and session.
	pub fn event(&self, event_type: SecurityEventType) -> SecurityEventBuilder {
		let mut builder = SecurityEventBuilder::new(event_type)
			.at(self.now)
			.session(self.session.id().as_str())
			.ip(self.client_ip)
			.route(self.path.clone());

		match (&self.principal, &self.impersonated) {
			(Some(admin), Some(target)) => {
				builder = builder.principal(target.id).impersonator(admin.id);
			}
			(Some(principal), None) => {
				builder = builder.principal(principal.id);
			}
			(None, _) => {
				if let Some(id) = self.session.principal_id() {
					builder = builder.principal(id);
				}
			}
		}
		builder
	}
}
