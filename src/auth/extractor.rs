// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Axum extractor for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, decode_header, Validation};
use serde::Deserialize;

use super::{AuthenticatedUser, AuthError, Role};
use crate::state::AppState;

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Minimal JWT claims for decoding Clerk tokens.
#[derive(Debug, Deserialize)]
struct JwtClaims {
    /// Subject (user ID)
    sub: String,
    /// Expiration timestamp
    #[serde(default)]
    exp: i64,
    /// Issuer
    #[serde(default)]
    iss: String,
    /// Session ID (Clerk-specific)
    #[serde(default)]
    sid: Option<String>,
    /// Audience (validated by jsonwebtoken crate, not read directly)
    #[serde(default)]
    #[allow(dead_code)]
    aud: Option<serde_json::Value>,
    /// Clerk public metadata containing role
    #[serde(default, rename = "publicMetadata")]
    public_metadata: Option<PublicMetadata>,
}

/// Clerk public metadata structure.
#[derive(Debug, Deserialize, Default)]
struct PublicMetadata {
    /// User's role (set in Clerk dashboard)
    #[serde(default)]
    role: Option<String>,
}

/// Extractor for authenticated users.
///
/// Validates the JWT from the Authorization header and provides the
/// authenticated user information.
///
/// ## Authentication Modes
///
/// - **Production mode** (CLERK_JWKS_URL set): Full JWT verification against Clerk JWKS
/// - **Development mode** (no CLERK_JWKS_URL): Structure validation only (no signature check)
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // A test or middleware layer may have set the user already
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = verify_jwt(token, &state.auth_config).await?;

        Ok(Auth(user))
    }
}

/// Verify JWT and extract user information.
async fn verify_jwt(
    token: &str,
    auth_config: &crate::state::AuthConfig,
) -> Result<AuthenticatedUser, AuthError> {
    if let Some(ref jwks) = auth_config.jwks {
        verify_jwt_production(token, jwks, auth_config).await
    } else {
        verify_jwt_development(token)
    }
}

/// Production JWT verification with JWKS.
async fn verify_jwt_production(
    token: &str,
    jwks: &super::JwksManager,
    auth_config: &crate::state::AuthConfig,
) -> Result<AuthenticatedUser, AuthError> {
    let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;
    let (decoding_key, algorithm) = jwks.decoding_key(header.kid.as_deref()).await?;

    let mut validation = Validation::new(algorithm);
    validation.leeway = CLOCK_SKEW_LEEWAY;

    if let Some(ref issuer) = auth_config.issuer {
        validation.set_issuer(&[issuer]);
    }
    if let Some(ref audience) = auth_config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    let token_data = decode::<JwtClaims>(token, &decoding_key, &validation).map_err(|e| {
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            jsonwebtoken::errors::ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            jsonwebtoken::errors::ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        }
    })?;

    Ok(user_from_claims(token_data.claims))
}

/// Development JWT verification (no signature check).
///
/// WARNING: This should only be used in development environments.
fn verify_jwt_development(token: &str) -> Result<AuthenticatedUser, AuthError> {
    let token_data = jsonwebtoken::dangerous::insecure_decode::<JwtClaims>(token)
        .map_err(|_e| AuthError::MalformedToken)?;

    let claims = token_data.claims;

    // Check expiration manually
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    if claims.exp > 0 && claims.exp < now - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::TokenExpired);
    }

    Ok(user_from_claims(claims))
}

fn user_from_claims(claims: JwtClaims) -> AuthenticatedUser {
    // Extract role from public metadata (default to Buyer)
    let role = claims
        .public_metadata
        .as_ref()
        .and_then(|m| m.role.as_ref())
        .and_then(|r| Role::from_str(r))
        .unwrap_or(Role::Buyer);

    AuthenticatedUser {
        user_id: claims.sub,
        role,
        session_id: claims.sid,
        issuer: claims.iss,
        expires_at: claims.exp,
    }
}

/// Extractor that requires admin role.
pub struct AdminOnly(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;

        if !user.is_admin() {
            return Err(AuthError::InsufficientPermissions);
        }

        Ok(AdminOnly(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AppState, AuthConfig};
    use axum::http::Request;

    /// Helper to create a test AppState with no JWKS (development mode)
    fn create_test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db = crate::storage::Database::open(&dir.path().join("test.redb"))
            .expect("Failed to open test database");
        let state = AppState::new(db).with_auth_config(AuthConfig {
            jwks: None,
            issuer: Some("test".to_string()),
            audience: None,
        });
        (state, dir)
    }

    /// Helper to create a test JWT token (unsigned, for testing only)
    fn create_test_jwt(user_id: &str, role: Option<&str>) -> String {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let header = r#"{"alg":"RS256","typ":"JWT"}"#;
        let metadata = role
            .map(|r| format!(r#","publicMetadata":{{"role":"{r}"}}"#))
            .unwrap_or_default();
        let claims = format!(
            r#"{{"sub":"{user_id}","iat":1609459200,"exp":9999999999,"iss":"test","sid":"sess_123"{metadata}}}"#
        );

        let header_b64 = URL_SAFE_NO_PAD.encode(header.as_bytes());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.as_bytes());

        // Signature doesn't matter in development mode
        format!("{header_b64}.{claims_b64}.fake_signature")
    }

    #[tokio::test]
    async fn auth_extractor_requires_auth_header() {
        let (state, _dir) = create_test_state();
        let mut parts = Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[tokio::test]
    async fn auth_extractor_succeeds_with_jwt() {
        let (state, _dir) = create_test_state();
        let token = create_test_jwt("user_123", Some("seller"));
        let mut parts = Request::builder()
            .uri("/test")
            .header("Authorization", format!("Bearer {token}"))
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let result = Auth::from_request_parts(&mut parts, &state).await;
        let Auth(user) = result.unwrap();
        assert_eq!(user.user_id, "user_123");
        assert_eq!(user.role, Role::Seller);
    }

    #[tokio::test]
    async fn role_defaults_to_buyer_without_metadata() {
        let (state, _dir) = create_test_state();
        let token = create_test_jwt("user_456", None);
        let mut parts = Request::builder()
            .uri("/test")
            .header("Authorization", format!("Bearer {token}"))
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let Auth(user) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.role, Role::Buyer);
    }

    #[tokio::test]
    async fn auth_extractor_prefers_extensions() {
        let (state, _dir) = create_test_state();
        let mut parts = Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let user = AuthenticatedUser {
            user_id: "user_from_middleware".to_string(),
            role: Role::Admin,
            session_id: None,
            issuer: "middleware".to_string(),
            expires_at: 0,
        };
        parts.extensions.insert(user.clone());

        let Auth(extracted) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(extracted.user_id, "user_from_middleware");
    }

    #[tokio::test]
    async fn admin_only_rejects_non_admin() {
        let (state, _dir) = create_test_state();
        let mut parts = Request::builder()
            .uri("/test")
            .body(())
            .unwrap()
            .into_parts()
            .0;

        let user = AuthenticatedUser {
            user_id: "user_123".to_string(),
            role: Role::Buyer,
            session_id: None,
            issuer: "test".to_string(),
            expires_at: 0,
        };
        parts.extensions.insert(user);

        let result = AdminOnly::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(AuthError::InsufficientPermissions)));
    }
}
