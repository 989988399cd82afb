// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Axum middleware that runs a security [`Pipeline`] around each request.
//!
//! The layer loads the session named by the session cookie (or starts a new
//! one), runs the pipeline's checks, verifies the anti-forgery token on
//! unsafe methods, hands the [`RequestContext`] to the handler through a
//! [`SecurityContext`] extension and finally runs the after-hooks and
//! persists the session.
//!
//! # Example
//!
//! ```ignore
//! Router::new()
//!     .route("/dashboard", get(dashboard))
//!     .layer(from_fn_with_state(
//!         SecurityLayerState::new(services.clone(), Pipeline::authenticated(&services)),
//!         security_layer,
//!     ));
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
	body::Body,
	extract::{ConnectInfo, FromRequestParts, Request, State},
	http::{
		header::{COOKIE, SET_COOKIE},
		request::Parts,
		HeaderMap, HeaderValue, Method, StatusCode,
	},
	middleware::Next,
	response::Response,
};
use chrono::{DateTime, Utc};
use mortar_server_auth::{
	constant_time_eq, Decision, Denial, ErrorCode, Pipeline, RequestContext, SecurityServices,
	SessionId, SessionRecord,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, instrument, warn};

/// Header carrying the anti-forgery token on unsafe requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

const CSRF_MESSAGE: &str = "Your page has expired. Please refresh and try again.";

/// The request's security state, shared between the layer and the handler.
#[derive(Clone)]
pub struct SecurityContext(Arc<Mutex<RequestContext>>);

impl SecurityContext {
	fn new(ctx: RequestContext) -> Self {
		Self(Arc::new(Mutex::new(ctx)))
	}

	pub async fn lock(&self) -> MutexGuard<'_, RequestContext> {
		self.0.lock().await
	}

	async fn into_inner(self) -> RequestContext {
		match Arc::try_unwrap(self.0) {
			Ok(ctx) => ctx.into_inner(),
			Err(shared) => shared.lock().await.clone(),
		}
	}
}

impl<S> FromRequestParts<S> for SecurityContext
where
	S: Send + Sync,
{
	type Rejection = StatusCode;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		parts
			.extensions
			.get::<SecurityContext>()
			.cloned()
			.ok_or(StatusCode::INTERNAL_SERVER_ERROR)
	}
}

/// State for [`security_layer`]: the services and the pipeline to run.
#[derive(Clone)]
pub struct SecurityLayerState {
	services: SecurityServices,
	pipeline: Pipeline,
}

impl SecurityLayerState {
	pub fn new(services: SecurityServices, pipeline: Pipeline) -> Self {
		Self { services, pipeline }
	}
}

/// Extract the session id from the Cookie header.
pub fn extract_session_cookie_with_name(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
	headers
		.get(COOKIE)?
		.to_str()
		.ok()?
		.split(';')
		.find_map(|cookie| {
			let cookie = cookie.trim();
			let (name, value) = cookie.split_once('=')?;

			if name == cookie_name && !value.is_empty() {
				Some(value.to_string())
			} else {
				None
			}
		})
}

fn client_ip(req: &Request) -> IpAddr {
	req.extensions()
		.get::<ConnectInfo<SocketAddr>>()
		.map(|ConnectInfo(addr)| addr.ip())
		.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

async fn load_session(
	services: &SecurityServices,
	headers: &HeaderMap,
	now: DateTime<Utc>,
) -> (SessionRecord, bool) {
	let Some(raw) =
		extract_session_cookie_with_name(headers, &services.config.session.cookie_name)
	else {
		return (SessionRecord::new(now), true);
	};

	match services.sessions.load(&SessionId::from_string(raw)).await {
		Ok(Some(record)) => (record, false),
		Ok(None) => {
			debug!("unknown session cookie, starting a new session");
			(SessionRecord::new(now), true)
		}
		Err(e) => {
			warn!(error = %e, "session store unavailable, starting a new session");
			(SessionRecord::new(now), true)
		}
	}
}

fn is_safe_method(method: &Method) -> bool {
	matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn csrf_token_matches(ctx: &RequestContext) -> bool {
	ctx.headers
		.get(CSRF_HEADER)
		.and_then(|v| v.to_str().ok())
		.is_some_and(|presented| {
			constant_time_eq(
				presented.as_bytes(),
				ctx.session.csrf_token().as_str().as_bytes(),
			)
		})
}

fn session_cookie(services: &SecurityServices, id: &SessionId) -> String {
	let config = &services.config.session;
	let mut cookie = format!(
		"{}={}; Path=/; HttpOnly; SameSite=Lax",
		config.cookie_name,
		id.as_str()
	);
	if config.secure_cookie {
		cookie.push_str("; Secure");
	}
	cookie
}

/// Delete discarded sessions, persist the current one and attach the
/// pipeline's headers and the session cookie.
async fn finish(
	services: &SecurityServices,
	mut ctx: RequestContext,
	mut response: Response,
) -> Response {
	for id in ctx.take_discarded_sessions() {
		if let Err(e) = services.sessions.delete(&id).await {
			warn!(error = %e, "failed to delete discarded session");
		}
	}
	if let Err(e) = services.sessions.save(&ctx.session).await {
		error!(error = %e, "failed to persist session");
	}

	let headers = response.headers_mut();
	for (name, value) in ctx.response_headers.iter() {
		headers.insert(name.clone(), value.clone());
	}
	match HeaderValue::from_str(&session_cookie(services, ctx.session.id())) {
		Ok(cookie) => {
			headers.append(SET_COOKIE, cookie);
		}
		Err(e) => error!(error = %e, "session cookie is not a valid header value"),
	}
	response
}

#[instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
pub async fn security_layer(
	State(state): State<SecurityLayerState>,
	mut req: Request,
	next: Next,
) -> Response {
	let services = &state.services;
	let now = Utc::now();
	let (session, session_is_new) = load_session(services, req.headers(), now).await;
	let mut ctx = RequestContext::new(
		req.method().clone(),
		req.uri().path(),
		req.headers().clone(),
		client_ip(&req),
		session,
		session_is_new,
		now,
	);

	if let Decision::Respond(gate) = state.pipeline.run_before(&mut ctx).await {
		let response = gate.into_http().map(Body::from);
		return finish(services, ctx, response).await;
	}

	if !is_safe_method(req.method()) && !csrf_token_matches(&ctx) {
		warn!("anti-forgery token mismatch");
		let gate = Denial::new(ErrorCode::CsrfTokenMismatch, CSRF_MESSAGE, "/").render(&mut ctx);
		return finish(services, ctx, gate.into_http().map(Body::from)).await;
	}

	let shared = SecurityContext::new(ctx);
	req.extensions_mut().insert(shared.clone());
	let response = next.run(req).await;

	let mut ctx = shared.into_inner().await;
	state.pipeline.run_after(&mut ctx).await;
	finish(services, ctx, response).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn headers_with_cookie(value: &str) -> HeaderMap {
		let mut headers = HeaderMap::new();
		headers.insert(COOKIE, HeaderValue::from_str(value).unwrap());
		headers
	}

	#[test]
	fn finds_named_cookie_among_others() {
		let headers = headers_with_cookie("theme=dark; mortar_session=abc123; lang=en");
		assert_eq!(
			extract_session_cookie_with_name(&headers, "mortar_session"),
			Some("abc123".to_string())
		);
	}

	#[test]
	fn ignores_prefix_matches_and_empty_values() {
		let headers = headers_with_cookie("mortar_session_old=zzz; mortar_session=");
		assert_eq!(extract_session_cookie_with_name(&headers, "mortar_session"), None);
	}

	#[test]
	fn safe_methods() {
		assert!(is_safe_method(&Method::GET));
		assert!(is_safe_method(&Method::HEAD));
		assert!(!is_safe_method(&Method::POST));
		assert!(!is_safe_method(&Method::DELETE));
	}

	proptest! {
		#[test]
		fn cookie_roundtrips_hex_ids(id in "[0-9a-f]{40}") {
			let headers = headers_with_cookie(&format!("other=1; mortar_session={id}"));
			prop_assert_eq!(extract_session_cookie_with_name(&headers, "mortar_session"), Some(id));
		}
	}
}
