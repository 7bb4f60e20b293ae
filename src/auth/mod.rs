// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! # Authentication Module
//!
//! Clerk JWT authentication for the Parcela API.
//!
//! ## Auth Flow
//!
//! 1. Frontend authenticates the user with Clerk
//! 2. Frontend sends `Authorization: Bearer <Clerk JWT>`
//! 3. Server:
//!    - Fetches Clerk JWKS via HTTPS
//!    - Verifies JWT signature, expiry, issuer, audience
//!    - Extracts `sub` → canonical `user_id` and the role claim
//!
//! ## Security
//!
//! - All non-health, non-webhook endpoints require authentication
//! - Webhook ingestion authenticates by HMAC signature instead (see `api::webhooks`)
//! - JWKS is cached with TTL; clock skew tolerance is 60 seconds

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod roles;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth};
pub use jwks::JwksManager;
pub use roles::Role;
