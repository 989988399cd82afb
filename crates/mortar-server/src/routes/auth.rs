// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Login, two-factor, logout and password change handlers.

use axum::{
	body::Body,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use mortar_server_auth::{LoginOutcome, RequestContext};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::AppState;
use crate::api_response::{failure, success};
use crate::error::Result;
use crate::security_layer::SecurityContext;

const HOME_PATH: &str = "/dashboard";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
	pub email: String,
	pub password: String,
	#[serde(default)]
	pub remember: bool,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorRequest {
	pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
	pub current_password: String,
	pub password: String,
}

fn session_state(ctx: &RequestContext) -> Value {
	json!({
		"authenticated": ctx.is_authenticated(),
		"csrf_token": ctx.session.csrf_token().as_str(),
	})
}

fn render_outcome(state: &AppState, ctx: &mut RequestContext, outcome: LoginOutcome) -> Response {
	let routes = &state.services.config.routes;
	match outcome {
		LoginOutcome::Authenticated(principal) => {
			let data = json!({
				"principal_id": principal.id,
				"csrf_token": ctx.session.csrf_token().as_str(),
			});
			success(ctx, "You are now logged in.", data, HOME_PATH)
		}
		LoginOutcome::TwoFactorRequired => {
			let data = json!({ "two_factor": true });
			success(
				ctx,
				"Enter the code from your authenticator app.",
				data,
				&routes.two_factor_path,
			)
		}
		LoginOutcome::InvalidCredentials => failure(
			ctx,
			StatusCode::UNPROCESSABLE_ENTITY,
			"INVALID_CREDENTIALS",
			"These credentials do not match our records.",
			&routes.login_path,
		),
		LoginOutcome::Throttled(denial) => denial.render(ctx).into_http().map(Body::from),
	}
}

pub async fn login_form(security: SecurityContext) -> impl IntoResponse {
	let ctx = security.lock().await;
	Json(session_state(&ctx))
}

pub async fn login(
	State(state): State<AppState>,
	security: SecurityContext,
	Json(payload): Json<LoginRequest>,
) -> Result<Response> {
	let mut ctx = security.lock().await;
	let outcome = state
		.login
		.attempt(&mut ctx, &payload.email, &payload.password, payload.remember)
		.await?;
	Ok(render_outcome(&state, &mut ctx, outcome))
}

pub async fn two_factor_form(security: SecurityContext) -> impl IntoResponse {
	let ctx = security.lock().await;
	let mut body = session_state(&ctx);
	body["two_factor_pending"] = json!(true);
	Json(body)
}

pub async fn two_factor_verify(
	State(state): State<AppState>,
	security: SecurityContext,
	Json(payload): Json<TwoFactorRequest>,
) -> Result<Response> {
	let mut ctx = security.lock().await;
	let outcome = state
		.login
		.verify_second_factor(&mut ctx, payload.code.trim())
		.await?;
	Ok(render_outcome(&state, &mut ctx, outcome))
}

pub async fn logout(State(state): State<AppState>, security: SecurityContext) -> Response {
	let mut ctx = security.lock().await;
	state.login.logout(&mut ctx).await;
	let login_path = state.services.config.routes.login_path.clone();
	let data = json!({ "csrf_token": ctx.session.csrf_token().as_str() });
	success(&mut ctx, "You have been logged out.", data, &login_path)
}

pub async fn password_form(State(state): State<AppState>, security: SecurityContext) -> impl IntoResponse {
	let ctx = security.lock().await;
	let max_age_days = state.services.config.password.max_age_days;
	let expired = ctx
		.principal
		.as_ref()
		.is_some_and(|p| p.password_expired(max_age_days, ctx.now));
	let mut body = session_state(&ctx);
	body["password_expired"] = json!(expired);
	Json(body)
}

pub async fn change_password(
	State(state): State<AppState>,
	security: SecurityContext,
	Json(payload): Json<ChangePasswordRequest>,
) -> Result<Response> {
	let mut ctx = security.lock().await;
	let changed = state
		.login
		.change_password(&mut ctx, &payload.current_password, &payload.password)
		.await?;
	let password_path = state.services.config.routes.password_change_path.clone();
	if !changed {
		return Ok(failure(
			&mut ctx,
			StatusCode::UNPROCESSABLE_ENTITY,
			"INVALID_PASSWORD",
			"The current password is incorrect.",
			&password_path,
		));
	}
	let data = json!({ "csrf_token": ctx.session.csrf_token().as_str() });
	Ok(success(&mut ctx, "Your password has been changed.", data, HOME_PATH))
}
