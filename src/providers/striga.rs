// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Parcela Markets

//! Striga integration for KYC and custody (users, wallets, digital IBANs).
//!
//! All mutating requests carry an `Idempotency-Key`, so provider-side
//! retries of webhook-triggered follow-ups (wallet/IBAN creation) cannot
//! duplicate resources. Confirmation of those follow-ups arrives
//! asynchronously via webhooks; see `api::webhooks`.

use std::time::Duration;

use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;

use crate::storage::KycStatus;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_API_BASE_URL: &str = "https://www.sandbox.striga.com/api/v1";

#[derive(Debug, thiserror::Error)]
pub enum StrigaError {
    #[error("Striga configuration missing: {0}")]
    MissingConfig(String),

    #[error("Striga signing failed: {0}")]
    Signing(String),

    #[error("Striga auth failed: {0}")]
    Auth(String),

    #[error("Striga request failed: {0}")]
    Request(String),

    #[error("Striga response was invalid: {0}")]
    InvalidResponse(String),
}

/// Result of registering a user with the provider.
#[derive(Debug, Clone)]
pub struct ProviderUser {
    pub provider_user_id: String,
}

/// Result of opening a KYC session.
#[derive(Debug, Clone)]
pub struct KycSession {
    pub session_id: String,
    /// URL where the user completes verification, when the provider returns one.
    pub verification_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StrigaClient {
    api_base_url: String,
    api_key: String,
    api_secret: String,
    http: Client,
}

impl StrigaClient {
    pub fn is_configured() -> bool {
        required_env_present("STRIGA_API_KEY") && required_env_present("STRIGA_API_SECRET")
    }

    pub fn from_env() -> Result<Self, StrigaError> {
        let api_base_url = env_or_default("STRIGA_API_BASE_URL", DEFAULT_API_BASE_URL);
        let api_key = env_required("STRIGA_API_KEY")?;
        let api_secret = env_required("STRIGA_API_SECRET")?;

        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| StrigaError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_base_url,
            api_key,
            api_secret,
            http,
        })
    }

    /// Register a user with the provider, returning the external user id.
    pub async fn create_user(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
        idempotency_key: &str,
    ) -> Result<ProviderUser, StrigaError> {
        let payload = json!({
            "email": email,
            "firstName": first_name,
            "lastName": last_name,
        });

        let response = self
            .signed_post_json("/user/create", &payload, idempotency_key)
            .await?;

        let provider_user_id = response
            .get("userId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StrigaError::InvalidResponse("missing userId in create-user response".to_string())
            })?
            .to_string();

        Ok(ProviderUser { provider_user_id })
    }

    /// Open a KYC verification session for a registered user.
    pub async fn start_kyc(
        &self,
        provider_user_id: &str,
        idempotency_key: &str,
    ) -> Result<KycSession, StrigaError> {
        let payload = json!({ "userId": provider_user_id });

        let response = self
            .signed_post_json("/user/kyc/start", &payload, idempotency_key)
            .await?;

        let session_id = response
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StrigaError::InvalidResponse("missing sessionId in KYC-start response".to_string())
            })?
            .to_string();

        let verification_url = parse_verification_url(&response);

        Ok(KycSession {
            session_id,
            verification_url,
        })
    }

    /// Fetch the provider-side KYC status for a user.
    ///
    /// Returns the raw status string; map it with [`map_kyc_status`].
    pub async fn fetch_kyc_status(&self, provider_user_id: &str) -> Result<String, StrigaError> {
        let response = self
            .get_json(&format!("/user/{provider_user_id}"))
            .await?;

        extract_kyc_status(&response)
            .map(str::to_string)
            .ok_or_else(|| {
                StrigaError::InvalidResponse("missing KYC status in user response".to_string())
            })
    }

    /// Request creation of a wallet for one currency.
    ///
    /// Fire-and-forget: the wallet is confirmed later by a WALLET_CREATED
    /// webhook. The idempotency key makes redelivered triggers safe.
    pub async fn create_wallet(
        &self,
        provider_user_id: &str,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<(), StrigaError> {
        let payload = json!({
            "userId": provider_user_id,
            "currency": currency,
        });

        self.signed_post_json("/wallets/create", &payload, idempotency_key)
            .await?;
        Ok(())
    }

    /// Request creation of a digital IBAN (sellers only).
    ///
    /// Confirmed later by an IBAN_CREATED webhook.
    pub async fn create_iban(
        &self,
        provider_user_id: &str,
        idempotency_key: &str,
    ) -> Result<(), StrigaError> {
        let payload = json!({ "userId": provider_user_id });

        self.signed_post_json("/ibans/create", &payload, idempotency_key)
            .await?;
        Ok(())
    }

    async fn get_json(&self, path: &str) -> Result<Value, StrigaError> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = sign_request(&self.api_secret, "GET", path, &timestamp, b"");

        let response = self
            .http
            .get(format!(
                "{}{}",
                self.api_base_url.trim_end_matches('/'),
                path
            ))
            .header("api-key", &self.api_key)
            .header("x-timestamp", &timestamp)
            .header("Authorization", format!("HMAC {signature}"))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| StrigaError::Request(format!("GET {path} failed: {e}")))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(StrigaError::Auth(format!("GET {path} returned 401")));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StrigaError::Request(format!(
                "GET {path} returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| StrigaError::InvalidResponse(format!("GET {path} invalid JSON: {e}")))
    }

    async fn signed_post_json(
        &self,
        path: &str,
        payload: &Value,
        idempotency_key: &str,
    ) -> Result<Value, StrigaError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| StrigaError::Signing(format!("serialize body failed: {e}")))?;

        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = sign_request(&self.api_secret, "POST", path, &timestamp, body.as_bytes());

        let response = self
            .http
            .post(format!(
                "{}{}",
                self.api_base_url.trim_end_matches('/'),
                path
            ))
            .header("api-key", &self.api_key)
            .header("x-timestamp", &timestamp)
            .header("Authorization", format!("HMAC {signature}"))
            .header("Idempotency-Key", idempotency_key)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| StrigaError::Request(format!("POST {path} failed: {e}")))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(StrigaError::Auth(format!("POST {path} returned 401")));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StrigaError::Request(format!(
                "POST {path} returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| StrigaError::InvalidResponse(format!("POST {path} invalid JSON: {e}")))
    }
}

/// Compute the request signature: base64(HMAC-SHA256(ts \n method \n path \n body)).
pub fn sign_request(secret: &str, method: &str, path: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(b"\n");
    mac.update(method.as_bytes());
    mac.update(b"\n");
    mac.update(path.as_bytes());
    mac.update(b"\n");
    mac.update(body);
    Base64::encode_string(&mac.finalize().into_bytes())
}

/// Verify a webhook signature against the raw body (constant time).
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = Base64::decode_vec(signature.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Compute the webhook signature for a body (used by tests and simulators).
pub fn webhook_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    Base64::encode_string(&mac.finalize().into_bytes())
}

/// Map a raw provider KYC status onto the local enum.
///
/// Returns `None` for unrecognized statuses, which callers treat as
/// "no change", forward compatible with provider additions.
pub fn map_kyc_status(raw_status: &str) -> Option<KycStatus> {
    let status = raw_status.trim().to_ascii_uppercase();
    match status.as_str() {
        "APPROVED" | "PASSED" => Some(KycStatus::Passed),
        "REJECTED" | "FINAL_REJECTED" => Some(KycStatus::Rejected),
        "INITIATED" | "STARTED" | "PENDING_REVIEW" | "IN_REVIEW" => Some(KycStatus::Initiated),
        "NOT_STARTED" => Some(KycStatus::NotStarted),
        _ => None,
    }
}

/// Read the hosted verification URL, dropping anything that is not an
/// absolute URL (the frontend redirects the user there blindly).
fn parse_verification_url(response: &Value) -> Option<String> {
    response
        .get("verificationUrl")
        .and_then(Value::as_str)
        .filter(|raw| url::Url::parse(raw).is_ok())
        .map(str::to_string)
}

fn extract_kyc_status(response: &Value) -> Option<&str> {
    response
        .pointer("/KYC/status")
        .and_then(Value::as_str)
        .or_else(|| response.get("kycStatus").and_then(Value::as_str))
        .or_else(|| response.pointer("/data/KYC/status").and_then(Value::as_str))
}

fn required_env_present(name: &str) -> bool {
    env_optional(name).is_some()
}

fn env_required(name: &str) -> Result<String, StrigaError> {
    env_optional(name).ok_or_else(|| StrigaError::MissingConfig(name.to_string()))
}

fn env_optional(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
        Err(_) => None,
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Read the webhook signing secret from the environment.
pub fn webhook_secret_from_env() -> Result<String, StrigaError> {
    env_required("STRIGA_WEBHOOK_SECRET")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kyc_status_mapping_is_stable() {
        assert_eq!(map_kyc_status("APPROVED"), Some(KycStatus::Passed));
        assert_eq!(map_kyc_status("approved"), Some(KycStatus::Passed));
        assert_eq!(map_kyc_status("REJECTED"), Some(KycStatus::Rejected));
        assert_eq!(map_kyc_status("INITIATED"), Some(KycStatus::Initiated));
        assert_eq!(map_kyc_status("PENDING_REVIEW"), Some(KycStatus::Initiated));
        assert_eq!(map_kyc_status("NOT_STARTED"), Some(KycStatus::NotStarted));
        assert_eq!(map_kyc_status("SOMETHING_NEW"), None);
    }

    #[test]
    fn request_signature_is_deterministic() {
        let a = sign_request("secret", "POST", "/user/create", "1700000000000", b"{}");
        let b = sign_request("secret", "POST", "/user/create", "1700000000000", b"{}");
        assert_eq!(a, b);
    }

    #[test]
    fn request_signature_covers_every_component() {
        let base = sign_request("secret", "POST", "/user/create", "1700000000000", b"{}");
        assert_ne!(
            base,
            sign_request("other", "POST", "/user/create", "1700000000000", b"{}")
        );
        assert_ne!(
            base,
            sign_request("secret", "GET", "/user/create", "1700000000000", b"{}")
        );
        assert_ne!(
            base,
            sign_request("secret", "POST", "/wallets/create", "1700000000000", b"{}")
        );
        assert_ne!(
            base,
            sign_request("secret", "POST", "/user/create", "1700000000001", b"{}")
        );
        assert_ne!(
            base,
            sign_request("secret", "POST", "/user/create", "1700000000000", b"{ }")
        );
    }

    #[test]
    fn webhook_signature_round_trips() {
        let body = br#"{"eventType":"WALLET_CREATED","eventId":"evt-1"}"#;
        let signature = webhook_signature("hook-secret", body);

        assert!(verify_webhook_signature("hook-secret", body, &signature));
        assert!(!verify_webhook_signature("wrong-secret", body, &signature));
        assert!(!verify_webhook_signature("hook-secret", b"tampered", &signature));
    }

    #[test]
    fn webhook_signature_rejects_garbage_encoding() {
        assert!(!verify_webhook_signature("hook-secret", b"{}", "not-base64!!!"));
        assert!(!verify_webhook_signature("hook-secret", b"{}", ""));
    }

    #[test]
    fn verification_url_must_be_absolute() {
        let valid = json!({ "verificationUrl": "https://kyc.striga.com/session/abc" });
        assert_eq!(
            parse_verification_url(&valid).as_deref(),
            Some("https://kyc.striga.com/session/abc")
        );

        let relative = json!({ "verificationUrl": "/session/abc" });
        assert_eq!(parse_verification_url(&relative), None);

        let missing = json!({ "sessionId": "abc" });
        assert_eq!(parse_verification_url(&missing), None);
    }

    #[test]
    fn extract_kyc_status_reads_nested_and_flat_layouts() {
        let nested = json!({ "KYC": { "status": "APPROVED" } });
        assert_eq!(extract_kyc_status(&nested), Some("APPROVED"));

        let flat = json!({ "kycStatus": "INITIATED" });
        assert_eq!(extract_kyc_status(&flat), Some("INITIATED"));

        let missing = json!({ "userId": "u1" });
        assert_eq!(extract_kyc_status(&missing), None);
    }
}
