// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! TOTP second-factor codes (RFC 6238: SHA-1, 6 digits, 30 second step,
//! one step of clock drift tolerated).

use chrono::{DateTime, Utc};
use mortar_common_secret::SecretString;
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::warn;

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;

fn totp_for(secret_base32: &SecretString) -> Option<TOTP> {
	let bytes = match Secret::Encoded(secret_base32.expose().clone()).to_bytes() {
		Ok(bytes) => bytes,
		Err(e) => {
			warn!(error = ?e, "stored two-factor secret is not valid base32");
			return None;
		}
	};
	match TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP_SECS, bytes) {
		Ok(totp) => Some(totp),
		Err(e) => {
			warn!(error = ?e, "stored two-factor secret is unusable");
			None
		}
	}
}

fn unix_secs(at: DateTime<Utc>) -> u64 {
	at.timestamp().max(0) as u64
}

/// Whether `code` is valid for `secret_base32` at `now`.
pub fn verify_code(secret_base32: &SecretString, code: &str, now: DateTime<Utc>) -> bool {
	let code = code.trim();
	if code.len() != DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
		return false;
	}
	totp_for(secret_base32).is_some_and(|totp| totp.check(code, unix_secs(now)))
}

/// The code a device would show at `now`.
pub fn code_at(secret_base32: &SecretString, now: DateTime<Utc>) -> Option<String> {
	totp_for(secret_base32).map(|totp| totp.generate(unix_secs(now)))
}

/// Base32 encoding of raw secret bytes, as stored on the principal.
pub fn encode_secret(raw: &[u8]) -> String {
	Secret::Raw(raw.to_vec()).to_encoded().to_string()
}
