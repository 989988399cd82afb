// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end checks of the security pipeline through the axum router.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::{
	body::{to_bytes, Body},
	http::{
		header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, COOKIE, LOCATION, RETRY_AFTER, SET_COOKIE},
		HeaderMap, Method, Request, StatusCode,
	},
	Router,
};
use chrono::{Duration, Utc};
use mortar_common_secret::SecretString;
use mortar_server::{create_router, AppState, MemoryBackends, CSRF_HEADER};
use mortar_server_audit::{AuditService, AuditSink, MemoryAuditSink, SecurityEventType};
use mortar_server_auth::{
	hash_password, totp, AccountStatus, BanDetails, Principal, PrincipalId, Role, SessionId,
	SessionRecord, SessionStore, SESSION_TIMEOUT_WARNING_HEADER,
};
use mortar_server_config::ServerConfig;
use serde_json::{json, Value};
use tower::ServiceExt;

const PASSWORD: &str = "correct horse battery staple";
const COOKIE_NAME: &str = "mortar_session";

struct TestApp {
	router: Router,
	backends: MemoryBackends,
	audit: MemoryAuditSink,
}

impl TestApp {
	fn new() -> Self {
		let backends = MemoryBackends::new();
		let audit = MemoryAuditSink::new();
		let sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(audit.clone())];
		let services = backends.services(
			ServerConfig::default(),
			SecretString::from("integration-test-key"),
			AuditService::new(256, sinks),
		);
		Self {
			router: create_router(AppState::new(services)),
			backends,
			audit,
		}
	}

	async fn add(&self, principal: Principal) -> Principal {
		self.backends.principals.insert(principal.clone()).await;
		principal
	}

	async fn member(&self, email: &str) -> Principal {
		self.add(
			Principal::new(email, "Member")
				.with_password_hash(hash_password(PASSWORD).unwrap(), Utc::now()),
		)
		.await
	}

	async fn admin(&self, email: &str) -> Principal {
		self.add(
			Principal::new(email, "Admin")
				.with_role(Role::Admin)
				.with_password_hash(hash_password(PASSWORD).unwrap(), Utc::now()),
		)
		.await
	}

	/// Load a stored session, change it and write it back.
	async fn edit_session(&self, id: &str, edit: impl FnOnce(&mut SessionRecord)) {
		let id = SessionId::from_string(id);
		let mut record = self.backends.sessions.load(&id).await.unwrap().unwrap();
		edit(&mut record);
		self.backends.sessions.save(&record).await.unwrap();
	}
}

struct Reply {
	status: StatusCode,
	headers: HeaderMap,
	body: Value,
}

/// A cookie-holding client that keeps its anti-forgery token current.
#[derive(Default)]
struct Client {
	session: Option<String>,
	csrf: Option<String>,
}

impl Client {
	async fn send(
		&mut self,
		app: &TestApp,
		method: Method,
		path: &str,
		body: Option<Value>,
		json: bool,
	) -> Reply {
		let mut request = Request::builder().method(method).uri(path);
		request = request.header(ACCEPT, if json { "application/json" } else { "text/html" });
		if let Some(session) = &self.session {
			request = request.header(COOKIE, format!("{COOKIE_NAME}={session}"));
		}
		if let Some(csrf) = &self.csrf {
			request = request.header(CSRF_HEADER, csrf.as_str());
		}
		let request = match body {
			Some(body) => request
				.header(CONTENT_TYPE, "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
			None => request.body(Body::empty()).unwrap(),
		};

		let response = app.router.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let headers = response.headers().clone();
		if let Some(cookie) = headers.get(SET_COOKIE).and_then(|v| v.to_str().ok()) {
			let value = cookie
				.split(';')
				.next()
				.and_then(|pair| pair.strip_prefix(&format!("{COOKIE_NAME}=")))
				.unwrap();
			self.session = Some(value.to_string());
		}
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
		if let Some(csrf) = body.get("csrf_token").and_then(Value::as_str) {
			self.csrf = Some(csrf.to_string());
		}
		Reply {
			status,
			headers,
			body,
		}
	}

	async fn get(&mut self, app: &TestApp, path: &str) -> Reply {
		self.send(app, Method::GET, path, None, true).await
	}

	async fn browse(&mut self, app: &TestApp, path: &str) -> Reply {
		self.send(app, Method::GET, path, None, false).await
	}

	async fn post(&mut self, app: &TestApp, path: &str, body: Value) -> Reply {
		self.send(app, Method::POST, path, Some(body), true).await
	}

	async fn login(&mut self, app: &TestApp, email: &str, password: &str) -> Reply {
		self.get(app, "/login").await;
		self.post(
			app,
			"/login",
			json!({ "email": email, "password": password }),
		)
		.await
	}

	fn session_id(&self) -> &str {
		self.session.as_deref().unwrap()
	}
}

mod authentication {
	use super::*;

	#[tokio::test]
	async fn login_then_me() {
		let app = TestApp::new();
		let member = app.member("alice@example.com").await;
		let mut client = Client::default();

		let reply = client.login(&app, "alice@example.com", PASSWORD).await;
		assert_eq!(reply.status, StatusCode::OK);
		assert_eq!(reply.body["success"], true);

		let reply = client.get(&app, "/api/me").await;
		assert_eq!(reply.status, StatusCode::OK);
		assert_eq!(reply.body["principal"]["id"], json!(member.id));
	}

	#[tokio::test]
	async fn anonymous_api_request_is_unauthenticated() {
		let app = TestApp::new();
		let mut client = Client::default();

		let reply = client.get(&app, "/api/me").await;

		assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
		assert_eq!(reply.body["error"], "UNAUTHENTICATED");
	}

	#[tokio::test]
	async fn anonymous_browser_is_redirected_to_login() {
		let app = TestApp::new();
		let mut client = Client::default();

		let reply = client.browse(&app, "/dashboard").await;

		assert_eq!(reply.status, StatusCode::FOUND);
		assert_eq!(reply.headers[LOCATION], "/login");
	}

	#[tokio::test]
	async fn post_without_csrf_token_is_rejected() {
		let app = TestApp::new();
		app.member("alice@example.com").await;
		let mut client = Client::default();

		let reply = client
			.post(
				&app,
				"/login",
				json!({ "email": "alice@example.com", "password": PASSWORD }),
			)
			.await;

		assert_eq!(reply.status.as_u16(), 419);
		assert_eq!(reply.body["error"], "CSRF_TOKEN_MISMATCH");
	}

	#[tokio::test]
	async fn login_rotates_session_id() {
		let app = TestApp::new();
		app.member("alice@example.com").await;
		let mut client = Client::default();
		client.get(&app, "/login").await;
		let anonymous = client.session_id().to_string();

		client
			.post(
				&app,
				"/login",
				json!({ "email": "alice@example.com", "password": PASSWORD }),
			)
			.await;

		assert_ne!(client.session_id(), anonymous);
		assert!(app
			.backends
			.sessions
			.load(&SessionId::from_string(anonymous))
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn repeated_failures_are_throttled() {
		let app = TestApp::new();
		app.member("alice@example.com").await;
		let mut client = Client::default();
		client.get(&app, "/login").await;

		for _ in 0..5 {
			let reply = client
				.post(
					&app,
					"/login",
					json!({ "email": "alice@example.com", "password": "wrong" }),
				)
				.await;
			assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
		}
		let reply = client
			.post(
				&app,
				"/login",
				json!({ "email": "alice@example.com", "password": PASSWORD }),
			)
			.await;

		assert_eq!(reply.status, StatusCode::TOO_MANY_REQUESTS);
		assert_eq!(reply.body["error"], "TOO_MANY_ATTEMPTS");
		assert!(reply.headers.contains_key(RETRY_AFTER));
	}

	#[tokio::test]
	async fn two_factor_login() {
		let app = TestApp::new();
		let secret = totp::encode_secret(b"integration-secret-20");
		let member = app
			.add(
				Principal::new("bob@example.com", "Bob")
					.with_password_hash(hash_password(PASSWORD).unwrap(), Utc::now())
					.with_confirmed_two_factor(secret.clone(), Utc::now()),
			)
			.await;
		let mut client = Client::default();

		let reply = client.login(&app, "bob@example.com", PASSWORD).await;
		assert_eq!(reply.body["two_factor"], true);
		assert_eq!(
			client.get(&app, "/api/me").await.status,
			StatusCode::UNAUTHORIZED
		);

		let code = totp::code_at(&SecretString::new(secret.clone()), Utc::now()).unwrap();
		let reply = client
			.post(&app, "/two-factor-challenge", json!({ "code": code }))
			.await;
		assert_eq!(reply.status, StatusCode::OK);

		let reply = client.get(&app, "/api/me").await;
		assert_eq!(reply.body["principal"]["id"], json!(member.id));
	}

	#[tokio::test]
	async fn two_factor_form_without_challenge_expires() {
		let app = TestApp::new();
		let mut client = Client::default();

		let reply = client.get(&app, "/two-factor-challenge").await;

		assert_eq!(reply.status.as_u16(), 419);
		assert_eq!(reply.body["error"], "TWO_FACTOR_CHALLENGE_EXPIRED");
	}
}

mod session_anomalies {
	use super::*;

	#[tokio::test]
	async fn logged_out_elsewhere() {
		let app = TestApp::new();
		app.member("alice@example.com").await;
		let mut laptop = Client::default();
		let mut phone = Client::default();

		laptop.login(&app, "alice@example.com", PASSWORD).await;
		phone.login(&app, "alice@example.com", PASSWORD).await;

		let reply = laptop.get(&app, "/api/me").await;
		assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
		assert_eq!(reply.body["error"], "SESSION_SUPERSEDED");
		assert_eq!(reply.body["reason"], "logged_in_elsewhere");

		assert_eq!(phone.get(&app, "/api/me").await.status, StatusCode::OK);
		app.audit
			.wait_for(SecurityEventType::SessionSuperseded, StdDuration::from_secs(1))
			.await
			.unwrap();
	}

	#[tokio::test]
	async fn tampered_identity_is_rejected() {
		let app = TestApp::new();
		app.member("alice@example.com").await;
		let victim = app.member("victim@example.com").await;
		let mut client = Client::default();
		client.login(&app, "alice@example.com", PASSWORD).await;

		let id = client.session_id().to_string();
		app.edit_session(&id, |record| {
			let mut raw = serde_json::to_value(&*record).unwrap();
			raw["critical"]["login_identity"] = json!(victim.id);
			*record = serde_json::from_value(raw).unwrap();
		})
		.await;

		let reply = client.get(&app, "/api/me").await;
		assert_eq!(reply.status.as_u16(), 419);
		assert_eq!(reply.body["error"], "SESSION_INTEGRITY_VIOLATION");

		// The session was destroyed, not repaired.
		assert_eq!(
			client.get(&app, "/api/me").await.status,
			StatusCode::UNAUTHORIZED
		);
	}

	#[tokio::test]
	async fn idle_session_times_out() {
		let app = TestApp::new();
		app.member("alice@example.com").await;
		let mut client = Client::default();
		client.login(&app, "alice@example.com", PASSWORD).await;

		let id = client.session_id().to_string();
		app.edit_session(&id, |record| {
			record.last_activity_at = Some(Utc::now() - Duration::minutes(31));
		})
		.await;

		let reply = client.get(&app, "/api/me").await;
		assert_eq!(reply.status.as_u16(), 419);
		assert_eq!(reply.body["error"], "SESSION_TIMEOUT");
	}

	#[tokio::test]
	async fn warning_header_near_timeout() {
		let app = TestApp::new();
		app.member("alice@example.com").await;
		let mut client = Client::default();
		client.login(&app, "alice@example.com", PASSWORD).await;

		let id = client.session_id().to_string();
		app.edit_session(&id, |record| {
			record.last_activity_at = Some(Utc::now() - Duration::minutes(27));
		})
		.await;

		let reply = client.get(&app, "/api/me").await;
		assert_eq!(reply.status, StatusCode::OK);
		let remaining: i64 = reply.headers[SESSION_TIMEOUT_WARNING_HEADER]
			.to_str()
			.unwrap()
			.parse()
			.unwrap();
		assert!(remaining > 0 && remaining <= 180);
	}
}

mod account_state {
	use super::*;

	async fn ban(app: &TestApp, id: &PrincipalId) {
		app.backends
			.principals
			.update(id, |p| {
				p.status = AccountStatus::Banned;
				p.ban = Some(BanDetails::permanent("spam", Utc::now()));
			})
			.await;
	}

	#[tokio::test]
	async fn banned_json_client_gets_403_with_appeal() {
		let app = TestApp::new();
		let member = app.member("alice@example.com").await;
		let mut client = Client::default();
		client.login(&app, "alice@example.com", PASSWORD).await;
		ban(&app, &member.id).await;

		let reply = client.get(&app, "/api/me").await;

		assert_eq!(reply.status, StatusCode::FORBIDDEN);
		assert_eq!(reply.body["success"], false);
		assert_eq!(reply.body["error"], "ACCOUNT_BANNED");
		assert_eq!(reply.body["ban"]["reason"], "spam");
		assert!(reply.body["appeal"]["url"]
			.as_str()
			.unwrap()
			.contains(&format!("/appeals/{}", member.id)));
	}

	#[tokio::test]
	async fn banned_browser_is_redirected() {
		let app = TestApp::new();
		let member = app.member("alice@example.com").await;
		let mut client = Client::default();
		client.login(&app, "alice@example.com", PASSWORD).await;
		ban(&app, &member.id).await;

		let reply = client.browse(&app, "/dashboard").await;

		assert_eq!(reply.status, StatusCode::FOUND);
		assert_eq!(reply.headers[LOCATION], "/login");

		// The flash survives into the fresh anonymous session.
		let home = client.get(&app, "/").await;
		assert_eq!(home.body["authenticated"], false);
		assert_eq!(home.body["flashes"].as_array().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn appeal_link_is_single_use() {
		let app = TestApp::new();
		let member = app.member("alice@example.com").await;
		let mut client = Client::default();
		client.login(&app, "alice@example.com", PASSWORD).await;
		ban(&app, &member.id).await;
		let reply = client.get(&app, "/api/me").await;
		let url = reply.body["appeal"]["url"].as_str().unwrap().to_string();
		let path = &url[url.find("/appeals/").unwrap()..];

		let mut visitor = Client::default();
		assert_eq!(visitor.get(&app, path).await.status, StatusCode::OK);
		assert_eq!(visitor.get(&app, path).await.status, StatusCode::FORBIDDEN);
	}
}

mod impersonation {
	use super::*;

	#[tokio::test]
	async fn admin_impersonates_until_ttl() {
		let app = TestApp::new();
		let admin = app.admin("admin@example.com").await;
		let member = app.member("alice@example.com").await;
		let mut client = Client::default();
		client.login(&app, "admin@example.com", PASSWORD).await;

		let reply = client
			.post(&app, &format!("/admin/impersonate/{}", member.id), json!({}))
			.await;
		assert_eq!(reply.status, StatusCode::OK);

		let reply = client.get(&app, "/api/me").await;
		assert_eq!(reply.body["principal"]["id"], json!(member.id));
		assert_eq!(reply.body["impersonated_by"]["id"], json!(admin.id));
		assert!(reply.headers[CACHE_CONTROL]
			.to_str()
			.unwrap()
			.contains("no-store"));

		let id = client.session_id().to_string();
		app.edit_session(&id, |record| {
			if let Some(overlay) = record.impersonation.as_mut() {
				overlay.started_at = Utc::now() - Duration::minutes(61);
			}
		})
		.await;

		let reply = client.get(&app, "/api/me").await;
		assert_eq!(reply.status.as_u16(), 440);
		assert_eq!(reply.body["error"], "IMPERSONATION_EXPIRED");

		// The admin stays logged in as themselves.
		let reply = client.get(&app, "/api/me").await;
		assert_eq!(reply.status, StatusCode::OK);
		assert_eq!(reply.body["principal"]["id"], json!(admin.id));
		assert!(reply.body["impersonated_by"].is_null());
	}

	#[tokio::test]
	async fn member_cannot_reach_admin_area() {
		let app = TestApp::new();
		app.member("alice@example.com").await;
		let mut client = Client::default();
		client.login(&app, "alice@example.com", PASSWORD).await;

		let reply = client.get(&app, "/admin").await;

		assert_eq!(reply.status, StatusCode::FORBIDDEN);
		assert_eq!(reply.body["error"], "FORBIDDEN");
	}
}
