// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router assembly.

use std::sync::Arc;

use axum::{
	middleware::from_fn_with_state,
	routing::{get, post},
	Router,
};
use mortar_common_secret::SecretString;
use mortar_server_audit::AuditService;
use mortar_server_auth::{
	AppealLinks, LoginCoordinator, MemoryAppealService, MemoryCounterStore,
	MemoryPrincipalStore, MemorySessionStore, Pipeline, Role, SecurityServices, Signer,
};
use mortar_server_config::ServerConfig;

use crate::routes;
use crate::security_layer::{security_layer, SecurityLayerState};

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
	pub services: SecurityServices,
	pub login: Arc<LoginCoordinator>,
	pub appeal_links: Arc<AppealLinks>,
}

impl AppState {
	pub fn new(services: SecurityServices) -> Self {
		Self {
			login: Arc::new(LoginCoordinator::new(&services)),
			appeal_links: Arc::new(AppealLinks::new(&services)),
			services,
		}
	}
}

/// In-memory implementations of every store, with handles kept for seeding.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackends {
	pub sessions: MemorySessionStore,
	pub principals: MemoryPrincipalStore,
	pub counters: MemoryCounterStore,
	pub appeals: MemoryAppealService,
}

impl MemoryBackends {
	pub fn new() -> Self {
		Self::default()
	}

	/// Services backed by these stores. The identity salt falls back to the
	/// app key when none is configured.
	pub fn services(
		&self,
		config: ServerConfig,
		app_key: SecretString,
		audit: AuditService,
	) -> SecurityServices {
		let identity_salt = config
			.secrets
			.identity_salt
			.clone()
			.unwrap_or_else(|| app_key.clone());
		SecurityServices {
			sessions: Arc::new(self.sessions.clone()),
			principals: Arc::new(self.principals.clone()),
			counters: Arc::new(self.counters.clone()),
			appeals: Arc::new(self.appeals.clone()),
			audit: Arc::new(audit),
			signer: Arc::new(Signer::new(app_key)),
			identity_salt,
			config: Arc::new(config),
		}
	}
}

fn guarded(router: Router<AppState>, services: &SecurityServices, pipeline: Pipeline) -> Router<AppState> {
	router.layer(from_fn_with_state(
		SecurityLayerState::new(services.clone(), pipeline),
		security_layer,
	))
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
	let services = &state.services;
	let paths = services.config.routes.clone();

	// Anonymous visitors allowed; the standard chain still runs so sessions
	// are validated and signed.
	let public = Router::new()
		.route("/", get(routes::account::home))
		.route(
			&paths.login_path,
			get(routes::auth::login_form).post(routes::auth::login),
		)
		.route(&paths.logout_path, post(routes::auth::logout))
		.route(
			&format!("{}/{{principal_id}}", paths.appeal_path),
			get(routes::appeals::redeem),
		);

	let two_factor = Router::new().route(
		&paths.two_factor_path,
		get(routes::auth::two_factor_form).post(routes::auth::two_factor_verify),
	);

	let authenticated = Router::new()
		.route("/dashboard", get(routes::account::dashboard))
		.route("/api/me", get(routes::account::me))
		.route(
			&paths.password_change_path,
			get(routes::auth::password_form).post(routes::auth::change_password),
		)
		.route("/impersonation/stop", post(routes::admin::stop_impersonation));

	let admin = Router::new()
		.route(&paths.admin_landing_path, get(routes::admin::home))
		.route(
			&format!("{}/impersonate/{{principal_id}}", paths.admin_landing_path),
			post(routes::admin::start_impersonation),
		);

	Router::new()
		.merge(guarded(public, services, Pipeline::standard(services)))
		.merge(guarded(two_factor, services, Pipeline::two_factor(services)))
		.merge(guarded(
			authenticated,
			services,
			Pipeline::authenticated(services),
		))
		.merge(guarded(
			admin,
			services,
			Pipeline::with_role(services, Role::Admin),
		))
		.with_state(state)
}
