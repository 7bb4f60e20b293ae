// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

use std::sync::Arc;
use std::time::Duration;

use crate::auth::JwksManager;
use crate::storage::{Database, ResponseCache};

/// Default response cache size (entries).
const CACHE_CAPACITY: usize = 1024;

/// Default response cache TTL.
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Authentication configuration resolved at startup.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// JWKS manager; `None` enables development mode (no signature check).
    pub jwks: Option<JwksManager>,
    /// Expected issuer claim.
    pub issuer: Option<String>,
    /// Expected audience claim.
    pub audience: Option<String>,
}

impl AuthConfig {
    /// Build from `CLERK_*` environment variables.
    pub fn from_env() -> Self {
        let jwks = std::env::var("CLERK_JWKS_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(JwksManager::new);
        Self {
            jwks,
            issuer: std::env::var("CLERK_ISSUER").ok().filter(|v| !v.is_empty()),
            audience: std::env::var("CLERK_AUDIENCE").ok().filter(|v| !v.is_empty()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub cache: Arc<ResponseCache>,
    pub auth_config: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            cache: Arc::new(ResponseCache::new(CACHE_CAPACITY, CACHE_TTL)),
            auth_config: Arc::new(AuthConfig::default()),
        }
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = Arc::new(auth_config);
        self
    }
}
