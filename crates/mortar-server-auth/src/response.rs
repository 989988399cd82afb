// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Denials and the responses they render to.
//!
//! A stage that blocks a request returns a [`Denial`]. Rendering picks the
//! representation from the request: JSON clients get a status code and a
//! `{"success": false, "error": CODE, ...}` body, browsers get a flash
//! message and a redirect.

use std::fmt;

use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use http::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::session::FlashLevel;

/// Non-standard status sent when a session expired or was tampered with.
pub const STATUS_SESSION_EXPIRED: u16 = 419;
/// Non-standard status sent when an impersonation session timed out.
pub const STATUS_IMPERSONATION_EXPIRED: u16 = 440;

fn status(code: u16) -> StatusCode {
	StatusCode::from_u16(code).unwrap_or(StatusCode::FORBIDDEN)
}

/// Machine-readable denial codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	Unauthenticated,
	Forbidden,
	AccountPending,
	AccountSuspended,
	AccountBanned,
	AccountMlBlocked,
	SessionIntegrityViolation,
	SessionTimeout,
	SessionSuperseded,
	CredentialsChanged,
	ImpersonationExpired,
	TwoFactorChallengeExpired,
	TooManyAttempts,
	PasswordExpired,
	CsrfTokenMismatch,
}

impl ErrorCode {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorCode::Unauthenticated => "UNAUTHENTICATED",
			ErrorCode::Forbidden => "FORBIDDEN",
			ErrorCode::AccountPending => "ACCOUNT_PENDING",
			ErrorCode::AccountSuspended => "ACCOUNT_SUSPENDED",
			ErrorCode::AccountBanned => "ACCOUNT_BANNED",
			ErrorCode::AccountMlBlocked => "ACCOUNT_ML_BLOCKED",
			ErrorCode::SessionIntegrityViolation => "SESSION_INTEGRITY_VIOLATION",
			ErrorCode::SessionTimeout => "SESSION_TIMEOUT",
			ErrorCode::SessionSuperseded => "SESSION_SUPERSEDED",
			ErrorCode::CredentialsChanged => "CREDENTIALS_CHANGED",
			ErrorCode::ImpersonationExpired => "IMPERSONATION_EXPIRED",
			ErrorCode::TwoFactorChallengeExpired => "TWO_FACTOR_CHALLENGE_EXPIRED",
			ErrorCode::TooManyAttempts => "TOO_MANY_ATTEMPTS",
			ErrorCode::PasswordExpired => "PASSWORD_EXPIRED",
			ErrorCode::CsrfTokenMismatch => "CSRF_TOKEN_MISMATCH",
		}
	}

	pub fn default_status(&self) -> StatusCode {
		match self {
			ErrorCode::Unauthenticated | ErrorCode::SessionSuperseded => StatusCode::UNAUTHORIZED,
			ErrorCode::Forbidden
			| ErrorCode::AccountPending
			| ErrorCode::AccountSuspended
			| ErrorCode::AccountBanned
			| ErrorCode::AccountMlBlocked
			| ErrorCode::PasswordExpired => StatusCode::FORBIDDEN,
			ErrorCode::SessionIntegrityViolation
			| ErrorCode::SessionTimeout
			| ErrorCode::CredentialsChanged
			| ErrorCode::TwoFactorChallengeExpired
			| ErrorCode::CsrfTokenMismatch => status(STATUS_SESSION_EXPIRED),
			ErrorCode::ImpersonationExpired => status(STATUS_IMPERSONATION_EXPIRED),
			ErrorCode::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A decision to stop the request, before it is rendered.
#[derive(Debug, Clone)]
pub struct Denial {
	pub code: ErrorCode,
	pub status: StatusCode,
	pub message: String,
	/// Where browsers are sent.
	pub redirect_to: String,
	pub flash_level: FlashLevel,
	/// Extra top-level members of the JSON body.
	pub extra: Map<String, Value>,
	pub headers: HeaderMap,
}

impl Denial {
	pub fn new(code: ErrorCode, message: impl Into<String>, redirect_to: impl Into<String>) -> Self {
		Self {
			code,
			status: code.default_status(),
			message: message.into(),
			redirect_to: redirect_to.into(),
			flash_level: FlashLevel::Error,
			extra: Map::new(),
			headers: HeaderMap::new(),
		}
	}

	pub fn with_flash_level(mut self, level: FlashLevel) -> Self {
		self.flash_level = level;
		self
	}

	pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
		self.extra.insert(key.into(), value);
		self
	}

	pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);
		self
	}

	/// JSON body sent to API clients.
	pub fn json_body(&self) -> Value {
		let mut body = Map::new();
		body.insert("success".to_string(), Value::Bool(false));
		body.insert("error".to_string(), Value::from(self.code.as_str()));
		body.insert("message".to_string(), Value::from(self.message.clone()));
		for (key, value) in &self.extra {
			body.insert(key.clone(), value.clone());
		}
		Value::Object(body)
	}

	/// Render for the client that made `ctx`. Browser denials leave their
	/// message as a flash in the (possibly fresh) session.
	pub fn render(self, ctx: &mut RequestContext) -> GateResponse {
		if ctx.expects_json() {
			let body = self.json_body();
			GateResponse {
				status: self.status,
				headers: self.headers,
				body: GateBody::Json(body),
			}
		} else {
			ctx.session.flash(self.flash_level, self.message);
			GateResponse {
				status: StatusCode::FOUND,
				headers: self.headers,
				body: GateBody::Redirect(self.redirect_to),
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateBody {
	Json(Value),
	Redirect(String),
}

/// A fully decided response produced by the pipeline.
#[derive(Debug, Clone)]
pub struct GateResponse {
	pub status: StatusCode,
	pub headers: HeaderMap,
	pub body: GateBody,
}

impl GateResponse {
	pub fn is_redirect(&self) -> bool {
		matches!(self.body, GateBody::Redirect(_))
	}

	pub fn into_http(self) -> http::Response<String> {
		let mut builder = http::Response::builder().status(self.status);
		let body = match self.body {
			GateBody::Json(value) => {
				builder = builder.header(CONTENT_TYPE, "application/json");
				value.to_string()
			}
			GateBody::Redirect(location) => {
				builder = builder.header(LOCATION, location);
				String::new()
			}
		};
		let mut response = match builder.body(body) {
			Ok(response) => response,
			Err(_) => {
				// Only reachable with an invalid redirect target.
				let mut fallback = http::Response::new(String::new());
				*fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
				fallback
			}
		};
		response.headers_mut().extend(self.headers);
		response
	}
}
