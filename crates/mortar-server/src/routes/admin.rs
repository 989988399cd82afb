// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Admin landing page and impersonation controls.

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use mortar_server_auth::PrincipalId;
use serde_json::json;
use tracing::instrument;

use crate::api::AppState;
use crate::api_response::{failure, success};
use crate::error::{Result, ServerError};
use crate::security_layer::SecurityContext;

pub async fn home(security: SecurityContext) -> impl IntoResponse {
	let ctx = security.lock().await;
	Json(json!({
		"admin": ctx.principal.as_ref().map(|p| p.display_name.clone()),
		"impersonating": ctx.is_impersonating(),
		"csrf_token": ctx.session.csrf_token().as_str(),
	}))
}

#[instrument(skip(state, security))]
pub async fn start_impersonation(
	State(state): State<AppState>,
	security: SecurityContext,
	Path(principal_id): Path<String>,
) -> Result<Response> {
	let target: PrincipalId = principal_id
		.parse()
		.map_err(|_| ServerError::BadRequest("invalid principal id".to_string()))?;

	let mut ctx = security.lock().await;
	state.login.start_impersonation(&mut ctx, target).await?;

	let name = ctx
		.impersonated
		.as_ref()
		.map(|p| p.display_name.clone())
		.unwrap_or_default();
	let ttl_secs = state.services.config.impersonation.ttl_secs();
	Ok(success(
		&mut ctx,
		&format!("You are now viewing the site as {name}."),
		json!({ "target_id": target, "expires_in_secs": ttl_secs }),
		"/dashboard",
	))
}

pub async fn stop_impersonation(State(state): State<AppState>, security: SecurityContext) -> Response {
	let mut ctx = security.lock().await;
	let admin_path = state.services.config.routes.admin_landing_path.clone();
	if !state.login.stop_impersonation(&mut ctx) {
		return failure(
			&mut ctx,
			StatusCode::CONFLICT,
			"NOT_IMPERSONATING",
			"No impersonation session is active.",
			&admin_path,
		);
	}
	success(&mut ctx, "Impersonation ended.", json!({}), &admin_path)
}
