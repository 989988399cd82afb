// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP handlers. Each runs behind a [`crate::security_layer`] pipeline and
//! reaches the request's security state through
//! [`crate::security_layer::SecurityContext`].

pub mod account;
pub mod admin;
pub mod appeals;
pub mod auth;
