// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Parcela - Real-Estate Marketplace Backend
//!
//! This crate provides the REST backend for a marketplace connecting
//! property sellers and buyers, with KYC verification and crypto/fiat
//! payment rails delegated to the Striga provider. Remote provider state is
//! mirrored locally through signed, idempotent webhooks.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum), including webhook ingestion
//! - `auth` - Authentication and authorization (Clerk JWT)
//! - `providers` - Outbound provider client (Striga)
//! - `storage` - Embedded database (redb), repositories, response cache
//! - `reconciler` - Background retry of unprocessed webhook events

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod providers;
pub mod reconciler;
pub mod state;
pub mod storage;
