// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions for the security pipeline.
//!
//! - **ID newtypes**: [`PrincipalId`] wraps a UUID; [`SessionId`] and
//!   [`CsrfToken`] are opaque random strings
//! - **Roles**: [`Role`], the only capability query the pipeline performs

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ID Newtypes
// =============================================================================

/// Unique identifier for a principal (user account).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
	pub fn new(id: Uuid) -> Self {
		Self(id)
	}

	pub fn generate() -> Self {
		Self(Uuid::new_v4())
	}

	pub fn into_inner(self) -> Uuid {
		self.0
	}

	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl fmt::Display for PrincipalId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<Uuid> for PrincipalId {
	fn from(id: Uuid) -> Self {
		Self(id)
	}
}

impl std::str::FromStr for PrincipalId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s).map(Self)
	}
}

/// Number of random bytes behind session ids and anti-forgery tokens.
const TOKEN_BYTES: usize = 20;

fn random_token() -> String {
	let mut bytes = [0u8; TOKEN_BYTES];
	rand::thread_rng().fill_bytes(&mut bytes);
	hex::encode(bytes)
}

macro_rules! define_token_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			/// Generate a fresh random value.
			pub fn generate() -> Self {
				Self(random_token())
			}

			/// Wrap a value received from a client or a store.
			pub fn from_string(value: impl Into<String>) -> Self {
				Self(value.into())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		// Opaque values are bearer credentials; keep them out of Debug output.
		impl fmt::Debug for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(
					f,
					"{}({})",
					stringify!($name),
					mortar_server_audit::hash_session_id(&self.0)
				)
			}
		}
	};
}

define_token_type!(SessionId, "Opaque identifier of a server-side session record.");
define_token_type!(CsrfToken, "Anti-forgery token bound to a session.");

// =============================================================================
// Roles
// =============================================================================

/// Roles a principal can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	/// Full access to the admin panel, may impersonate other principals.
	Admin,
	/// Manages blog posts, projects and contact requests.
	Editor,
	/// Regular site account.
	Member,
}

impl Role {
	pub fn all() -> &'static [Role] {
		&[Role::Admin, Role::Editor, Role::Member]
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Role::Admin => write!(f, "admin"),
			Role::Editor => write!(f, "editor"),
			Role::Member => write!(f, "member"),
		}
	}
}
