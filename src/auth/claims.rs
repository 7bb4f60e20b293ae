// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Authenticated user representation extracted from JWT claims.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;

/// Authenticated user information extracted from a verified JWT.
///
/// This is the primary type used throughout the application to represent
/// the authenticated user making a request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Canonical user ID (Clerk `sub` claim)
    pub user_id: String,

    /// User's role
    pub role: Role,

    /// Session ID (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Original issuer (used for validation, not serialized)
    #[serde(skip)]
    pub issuer: String,

    /// Token expiration (Unix timestamp, used for validation, not serialized)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    /// Check if the user has the required role.
    pub fn has_role(&self, required: Role) -> bool {
        self.role.has_privilege(required)
    }

    /// Check if this user is an admin.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: "user_123".to_string(),
            role,
            session_id: Some("sess_abc".to_string()),
            issuer: "https://clerk.example.com".to_string(),
            expires_at: 1700003600,
        }
    }

    #[test]
    fn has_role_checks_privilege() {
        let admin = sample_user(Role::Admin);
        assert!(admin.has_role(Role::Admin));
        assert!(admin.has_role(Role::Seller));
        assert!(admin.has_role(Role::Buyer));
        assert!(admin.is_admin());
    }

    #[test]
    fn buyer_is_not_admin() {
        let buyer = sample_user(Role::Buyer);
        assert!(!buyer.is_admin());
        assert!(!buyer.has_role(Role::Seller));
    }
}
