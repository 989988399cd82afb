// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Password hashing.
//!
//! Production builds use Argon2id with the library defaults
//! (19 MiB memory, 2 iterations, parallelism 1). Test builds use
//! minimal parameters; they MUST NOT be used in production. Verification
//! reads the parameters from the PHC string, so hashes from either build
//! verify in both.

use std::sync::LazyLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
#[cfg(test)]
use argon2::{Algorithm, Params, Version};

use crate::error::AuthError;

#[inline]
fn argon2_instance() -> Argon2<'static> {
	#[cfg(test)]
	{
		let params = Params::new(
			1024, // memory_kib: 1 MiB
			1,    // iterations
			1,    // parallelism
			None, // output length = default
		)
		.expect("valid Argon2 params for tests");
		Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
	}

	#[cfg(not(test))]
	{
		Argon2::default()
	}
}

/// Hash a password into a PHC string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
	let salt = SaltString::generate(&mut OsRng);
	argon2_instance()
		.hash_password(password.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|e| AuthError::PasswordHash(e.to_string()))
}

/// Check a password against a PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, phc: &str) -> bool {
	match PasswordHash::new(phc) {
		Ok(parsed) => argon2_instance()
			.verify_password(password.as_bytes(), &parsed)
			.is_ok(),
		Err(_) => false,
	}
}

/// Hash checked when the login identity is unknown, so that a miss costs the
/// same Argon2 work as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
	LazyLock::new(|| hash_password("mortar-unknown-principal").ok());

/// Burn one verification against a fixed hash. Always returns `false`.
pub fn verify_dummy(password: &str) -> bool {
	if let Some(hash) = DUMMY_HASH.as_deref() {
		let _ = verify_password(password, hash);
	}
	false
}
