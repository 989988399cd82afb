// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the security pipeline.

use thiserror::Error;

use crate::types::PrincipalId;

/// Failures reported by backing stores.
#[derive(Debug, Error)]
pub enum StoreError {
	/// The store could not be reached or timed out.
	#[error("store unavailable: {0}")]
	Unavailable(String),

	/// A persisted value could not be encoded or decoded.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Errors raised by login, logout and impersonation flows.
#[derive(Debug, Error)]
pub enum AuthError {
	#[error("store error: {0}")]
	Store(#[from] StoreError),

	#[error("principal not found: {0}")]
	PrincipalNotFound(PrincipalId),

	#[error("password hashing failed: {0}")]
	PasswordHash(String),

	/// The caller is not allowed to perform the operation.
	#[error("not permitted: {0}")]
	NotPermitted(String),

	/// No pending two-factor challenge exists in the session.
	#[error("no pending two-factor challenge")]
	NoPendingChallenge,
}

/// Errors raised while verifying an appeal link.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AppealLinkError {
	#[error("appeal link signature is invalid")]
	InvalidSignature,

	#[error("appeal link has expired")]
	Expired,

	#[error("appeal link was already used")]
	AlreadyUsed,

	#[error("appeal base url is invalid: {0}")]
	InvalidBaseUrl(String),

	#[error("appeal store error: {0}")]
	Store(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub type Result<T> = std::result::Result<T, AuthError>;
