// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HMAC-SHA256 signing keyed by the application secret.
//!
//! Every signature is domain-separated by a [`Purpose`] so that a value
//! signed for one use (say, a session) can never verify as another (say, an
//! appeal link).

use hmac::{Hmac, Mac};
use mortar_common_secret::SecretString;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// What a signature is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
	SessionIntegrity,
	TwoFactorChallenge,
	TwoFactorPassword,
	AppealLink,
}

impl Purpose {
	fn label(&self) -> &'static [u8] {
		match self {
			Purpose::SessionIntegrity => b"mortar.session-integrity",
			Purpose::TwoFactorChallenge => b"mortar.two-factor-challenge",
			Purpose::TwoFactorPassword => b"mortar.two-factor-password",
			Purpose::AppealLink => b"mortar.appeal-link",
		}
	}
}

/// Signs and verifies payloads with the application key.
#[derive(Debug, Clone)]
pub struct Signer {
	key: SecretString,
}

impl Signer {
	pub fn new(key: SecretString) -> Self {
		Self { key }
	}

	fn mac(&self, purpose: Purpose, payload: &[u8]) -> HmacSha256 {
		let mut mac =
			HmacSha256::new_from_slice(self.key.as_bytes()).expect("HMAC can take key of any size");
		mac.update(purpose.label());
		mac.update(&[0]);
		mac.update(payload);
		mac
	}

	/// Hex-encoded signature of `payload`.
	pub fn sign(&self, purpose: Purpose, payload: &[u8]) -> String {
		hex::encode(self.mac(purpose, payload).finalize().into_bytes())
	}

	/// Constant-time verification of a hex-encoded signature.
	pub fn verify(&self, purpose: Purpose, payload: &[u8], signature: &str) -> bool {
		let expected_bytes = match hex::decode(signature) {
			Ok(bytes) => bytes,
			Err(_) => return false,
		};
		self.mac(purpose, payload)
			.verify_slice(&expected_bytes)
			.is_ok()
	}
}

/// Constant-time equality for secrets that are compared directly.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn signer() -> Signer {
		Signer::new(SecretString::from("test-app-key"))
	}

	#[test]
	fn signature_is_hex_sha256() {
		let sig = signer().sign(Purpose::SessionIntegrity, b"payload");
		assert_eq!(sig.len(), 64);
	}

	#[test]
	fn verify_accepts_own_signature() {
		let s = signer();
		let sig = s.sign(Purpose::SessionIntegrity, b"payload");
		assert!(s.verify(Purpose::SessionIntegrity, b"payload", &sig));
	}

	#[test]
	fn verify_rejects_modified_payload() {
		let s = signer();
		let sig = s.sign(Purpose::SessionIntegrity, b"payload");
		assert!(!s.verify(Purpose::SessionIntegrity, b"payloaD", &sig));
	}

	#[test]
	fn purposes_are_separated() {
		let s = signer();
		let sig = s.sign(Purpose::SessionIntegrity, b"payload");
		assert!(!s.verify(Purpose::AppealLink, b"payload", &sig));
	}

	#[test]
	fn different_keys_disagree() {
		let sig = signer().sign(Purpose::AppealLink, b"payload");
		let other = Signer::new(SecretString::from("another-key"));
		assert!(!other.verify(Purpose::AppealLink, b"payload", &sig));
	}

	#[test]
	fn verify_rejects_non_hex() {
		assert!(!signer().verify(Purpose::SessionIntegrity, b"payload", "not-hex!"));
	}

	#[test]
	fn constant_time_eq_works() {
		assert!(constant_time_eq(b"abc", b"abc"));
		assert!(!constant_time_eq(b"abc", b"abd"));
		assert!(!constant_time_eq(b"abc", b"abcd"));
	}
}
