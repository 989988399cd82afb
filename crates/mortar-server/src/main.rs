// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mortar server binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use mortar_common_secret::SecretString;
use mortar_server::{create_router, AppState, MemoryBackends};
use mortar_server_audit::{AuditSink, TracingAuditSink};
use mortar_server_auth::{hash_password, Principal, Role, StoreCleanup};
use mortar_server_config::{LogFormat, ServerConfig};
use rand::RngCore;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Mortar server - session and authentication security pipeline.
#[derive(Parser, Debug)]
#[command(name = "mortar-server", about = "Mortar security pipeline server", version)]
struct Args {
	/// Path to a TOML config file (defaults to /etc/mortar/server.toml).
	#[arg(long, env = "MORTAR_SERVER_CONFIG")]
	config: Option<PathBuf>,

	/// Create an admin and a member account with this password.
	#[arg(long, env = "MORTAR_SERVER_DEMO_PASSWORD")]
	demo_password: Option<String>,
}

fn init_tracing(config: &ServerConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);
	match config.logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

/// The configured app key, or a throwaway one outside production.
fn app_key(config: &ServerConfig) -> SecretString {
	if let Some(key) = &config.secrets.app_key {
		return key.clone();
	}
	tracing::warn!(
		"MORTAR_SERVER_APP_KEY is not set; using a random key, sessions will not survive a restart"
	);
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	SecretString::new(hex::encode(bytes))
}

async fn seed_demo_accounts(
	backends: &MemoryBackends,
	password: &str,
) -> Result<(), Box<dyn std::error::Error>> {
	let hash = hash_password(password)?;
	let now = Utc::now();
	let admin = Principal::new("admin@mortar.local", "Admin")
		.with_role(Role::Admin)
		.with_password_hash(hash.clone(), now);
	let member = Principal::new("member@mortar.local", "Member").with_password_hash(hash, now);
	tracing::info!(admin_id = %admin.id, member_id = %member.id, "seeded demo accounts");
	backends.principals.insert(admin).await;
	backends.principals.insert(member).await;
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => mortar_server_config::load_config_with_file(path)?,
		None => mortar_server_config::load_config()?,
	};

	init_tracing(&config);

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		environment = %config.http.environment,
		"starting mortar-server"
	);

	let key = app_key(&config);
	let sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingAuditSink)];
	let audit = mortar_server_audit::from_config(&config.audit, sinks);
	let addr = config.socket_addr();

	let backends = MemoryBackends::new();
	if let Some(password) = &args.demo_password {
		seed_demo_accounts(&backends, password).await?;
	}
	let state = AppState::new(backends.services(config, key, audit));
	let cleanup = StoreCleanup::new(&state.services).spawn();

	let app = create_router(state).layer(TraceLayer::new_for_http());

	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal");
		}
	}

	cleanup.abort();
	tracing::info!("Server shutdown complete");
	Ok(())
}
