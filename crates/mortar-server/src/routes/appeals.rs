// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Landing point for signed ban-appeal links.

use axum::{
	extract::{Path, Query, State},
	response::Response,
};
use mortar_server_auth::PrincipalId;
use serde::Deserialize;
use serde_json::json;

use crate::api::AppState;
use crate::api_response::success;
use crate::error::{Result, ServerError};
use crate::security_layer::SecurityContext;

#[derive(Debug, Deserialize)]
pub struct AppealQuery {
	pub expires: i64,
	pub nonce: String,
	pub signature: String,
}

pub async fn redeem(
	State(state): State<AppState>,
	security: SecurityContext,
	Path(principal_id): Path<String>,
	Query(query): Query<AppealQuery>,
) -> Result<Response> {
	let principal: PrincipalId = principal_id
		.parse()
		.map_err(|_| ServerError::BadRequest("invalid principal id".to_string()))?;

	let mut ctx = security.lock().await;
	state
		.appeal_links
		.redeem(&principal, query.expires, &query.nonce, &query.signature, ctx.now)
		.await?;

	Ok(success(
		&mut ctx,
		"Your appeal link is valid. Tell us why the ban should be lifted.",
		json!({ "principal_id": principal }),
		"/",
	))
}
