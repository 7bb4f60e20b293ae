// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access, including compliance review and event inspection
/// - `Seller` - Lists properties, receives offers, gets a digital IBAN
/// - `Buyer` - Browses approved listings and makes offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Property seller
    Seller,
    /// Property buyer
    Buyer,
}

impl Role {
    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            // Admin can do anything
            (Role::Admin, _) => true,
            (Role::Seller, Role::Seller) => true,
            (Role::Buyer, Role::Buyer) => true,
            _ => false,
        }
    }

    /// Parse role from string (case-insensitive).
    /// Used when extracting roles from Clerk public metadata.
    pub fn from_str(s: &str) -> Option<Role> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "seller" => Some(Role::Seller),
            "buyer" => Some(Role::Buyer),
            _ => None,
        }
    }
}

impl Default for Role {
    /// Default role is Buyer (least privilege for authenticated users).
    fn default() -> Self {
        Role::Buyer
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Seller => write!(f, "seller"),
            Role::Buyer => write!(f, "buyer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_all_privileges() {
        assert!(Role::Admin.has_privilege(Role::Admin));
        assert!(Role::Admin.has_privilege(Role::Seller));
        assert!(Role::Admin.has_privilege(Role::Buyer));
    }

    #[test]
    fn seller_and_buyer_are_disjoint() {
        assert!(Role::Seller.has_privilege(Role::Seller));
        assert!(!Role::Seller.has_privilege(Role::Buyer));
        assert!(!Role::Seller.has_privilege(Role::Admin));

        assert!(Role::Buyer.has_privilege(Role::Buyer));
        assert!(!Role::Buyer.has_privilege(Role::Seller));
        assert!(!Role::Buyer.has_privilege(Role::Admin));
    }

    #[test]
    fn from_str_parses_correctly() {
        assert_eq!(Role::from_str("admin"), Some(Role::Admin));
        assert_eq!(Role::from_str("SELLER"), Some(Role::Seller));
        assert_eq!(Role::from_str("Buyer"), Some(Role::Buyer));
        assert_eq!(Role::from_str("unknown"), None);
    }

    #[test]
    fn default_role_is_buyer() {
        assert_eq!(Role::default(), Role::Buyer);
    }
}
