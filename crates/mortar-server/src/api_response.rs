// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Response helpers shared by the handlers.
//!
//! Handlers answer JSON clients with a status and body and browsers with a
//! flash message and a redirect, the same split the pipeline uses for its
//! denials.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Redirect, Response},
	Json,
};
use mortar_server_auth::{FlashLevel, RequestContext};
use serde::Serialize;
use serde_json::{json, Value};

/// Trait for API error response types that have `error` and `message` fields.
pub trait ApiErrorResponse: Serialize + Send {
	fn new(error: impl Into<String>, message: impl Into<String>) -> Self;
}

/// Implement `ApiErrorResponse` for a struct with `error` and `message` fields.
#[macro_export]
macro_rules! impl_api_error_response {
	($ty:ty) => {
		impl $crate::api_response::ApiErrorResponse for $ty {
			fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
				Self {
					success: false,
					error: error.into(),
					message: message.into(),
				}
			}
		}
	};
}

/// Error body for handler-level failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub success: bool,
	pub error: String,
	pub message: String,
}

impl_api_error_response!(ErrorResponse);

/// Create a 400 Bad Request response.
pub fn bad_request<T: ApiErrorResponse>(
	error: impl Into<String>,
	message: impl Into<String>,
) -> (StatusCode, Json<T>) {
	(StatusCode::BAD_REQUEST, Json(T::new(error, message)))
}

/// Create a 404 Not Found response.
pub fn not_found<T: ApiErrorResponse>(message: impl Into<String>) -> (StatusCode, Json<T>) {
	(StatusCode::NOT_FOUND, Json(T::new("NOT_FOUND", message)))
}

/// Create a 500 Internal Server Error response.
pub fn internal_error<T: ApiErrorResponse>(message: impl Into<String>) -> (StatusCode, Json<T>) {
	(
		StatusCode::INTERNAL_SERVER_ERROR,
		Json(T::new("INTERNAL_ERROR", message)),
	)
}

/// Create a 403 Forbidden response.
pub fn forbidden<T: ApiErrorResponse>(
	error: impl Into<String>,
	message: impl Into<String>,
) -> (StatusCode, Json<T>) {
	(StatusCode::FORBIDDEN, Json(T::new(error, message)))
}

/// A successful outcome: `{"success": true, "message": ..., ...data}` for JSON
/// clients, a success flash and a redirect for browsers.
pub fn success(
	ctx: &mut RequestContext,
	message: &str,
	data: Value,
	redirect_to: &str,
) -> Response {
	if ctx.expects_json() {
		let mut body = json!({ "success": true, "message": message });
		if let (Some(body), Value::Object(data)) = (body.as_object_mut(), data) {
			body.extend(data);
		}
		return (StatusCode::OK, Json(body)).into_response();
	}
	ctx.session.flash(FlashLevel::Success, message);
	Redirect::to(redirect_to).into_response()
}

/// A handler-level rejection, rendered like a pipeline denial.
pub fn failure(
	ctx: &mut RequestContext,
	status: StatusCode,
	error: &str,
	message: &str,
	redirect_to: &str,
) -> Response {
	if ctx.expects_json() {
		return (status, Json(ErrorResponse::new(error, message))).into_response();
	}
	ctx.session.flash(FlashLevel::Error, message);
	Redirect::to(redirect_to).into_response()
}
