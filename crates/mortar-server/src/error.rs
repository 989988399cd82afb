// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server error type.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use mortar_server_auth::{AppealLinkError, AuthError, StoreError};
use thiserror::Error;

use crate::api_response::{
	bad_request, forbidden, internal_error, not_found, ApiErrorResponse, ErrorResponse,
};

#[derive(Debug, Error)]
pub enum ServerError {
	#[error(transparent)]
	Auth(#[from] AuthError),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("appeal link rejected: {0}")]
	Appeal(#[from] AppealLinkError),

	#[error("bad request: {0}")]
	BadRequest(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		match self {
			ServerError::Auth(AuthError::NotPermitted(reason)) => {
				forbidden::<ErrorResponse>("FORBIDDEN", reason).into_response()
			}
			ServerError::Auth(AuthError::PrincipalNotFound(_)) => {
				not_found::<ErrorResponse>("Account not found").into_response()
			}
			ServerError::Auth(AuthError::NoPendingChallenge) => (
				StatusCode::from_u16(mortar_server_auth::STATUS_SESSION_EXPIRED)
					.unwrap_or(StatusCode::FORBIDDEN),
				Json(ErrorResponse::new(
					"TWO_FACTOR_CHALLENGE_EXPIRED",
					"Your verification session has expired. Please log in again.",
				)),
			)
				.into_response(),
			ServerError::Appeal(e @ (AppealLinkError::InvalidSignature
			| AppealLinkError::Expired
			| AppealLinkError::AlreadyUsed)) => {
				forbidden::<ErrorResponse>("INVALID_APPEAL_LINK", e.to_string()).into_response()
			}
			ServerError::BadRequest(message) => {
				bad_request::<ErrorResponse>("BAD_REQUEST", message).into_response()
			}
			other => {
				tracing::error!(error = %other, "request failed");
				internal_error::<ErrorResponse>("Internal server error").into_response()
			}
		}
	}
}
