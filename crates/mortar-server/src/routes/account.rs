// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pages for the current visitor.

use axum::{response::IntoResponse, Json};
use mortar_server_auth::{Principal, RequestContext};
use serde_json::{json, Value};

use crate::security_layer::SecurityContext;

fn principal_summary(principal: &Principal) -> Value {
	json!({
		"id": principal.id,
		"email": principal.email,
		"display_name": principal.display_name,
		"roles": principal.roles(),
		"two_factor_enabled": principal.has_confirmed_two_factor(),
	})
}

fn take_flashes(ctx: &mut RequestContext) -> Value {
	json!(ctx.session.take_flashes())
}

pub async fn home(security: SecurityContext) -> impl IntoResponse {
	let mut ctx = security.lock().await;
	let principal = ctx.effective_principal().map(principal_summary);
	Json(json!({
		"authenticated": ctx.is_authenticated(),
		"principal": principal,
		"csrf_token": ctx.session.csrf_token().as_str(),
		"flashes": take_flashes(&mut ctx),
	}))
}

pub async fn dashboard(security: SecurityContext) -> impl IntoResponse {
	let mut ctx = security.lock().await;
	let greeting = ctx
		.effective_principal()
		.map(|p| format!("Welcome, {}.", p.display_name))
		.unwrap_or_default();
	Json(json!({
		"message": greeting,
		"flashes": take_flashes(&mut ctx),
	}))
}

/// The effective principal plus the real actor while impersonating.
pub async fn me(security: SecurityContext) -> impl IntoResponse {
	let ctx = security.lock().await;
	let impersonator = if ctx.is_impersonating() {
		ctx.principal.as_ref().map(principal_summary)
	} else {
		None
	};
	Json(json!({
		"success": true,
		"principal": ctx.effective_principal().map(principal_summary),
		"impersonated_by": impersonator,
		"csrf_token": ctx.session.csrf_token().as_str(),
	}))
}
