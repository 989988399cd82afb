// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mortar HTTP server.
//!
//! Hosts the security pipeline from `mortar-server-auth` in front of a small
//! set of routes: login and two-factor, logout, the dashboard, the admin
//! area with impersonation, password changes and ban-appeal links.

pub mod api;
pub mod api_response;
pub mod error;
pub mod routes;
pub mod security_layer;

pub use api::{create_router, AppState, MemoryBackends};
pub use error::ServerError;
pub use mortar_server_config::ServerConfig;
pub use security_layer::{
	extract_session_cookie_with_name, security_layer, SecurityContext, SecurityLayerState,
	CSRF_HEADER,
};
