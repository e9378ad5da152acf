//! Wire types for the tether session API.
//!
//! Every endpoint the session client talks to is listed in [`paths`]; the
//! request/response bodies live here so the client crate and any server-side
//! test double agree on one shape.

use serde::{Deserialize, Serialize};

/// Endpoint paths, relative to the configured API prefix.
pub mod paths {
    pub const REFRESH: &str = "/auth/refresh";
    pub const LOGIN: &str = "/auth/login";
    pub const LOGOUT: &str = "/auth/logout";
    pub const PASSWORD_RESET: &str = "/auth/password-reset";
    pub const ACCOUNT: &str = "/account";
    pub const TENANT: &str = "/account/tenant";
    pub const RUNTIME_CONFIG: &str = "/config";
    pub const TRANSLATION_ELIGIBILITY: &str = "/translation/eligibility";
}

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Credentials for `POST /auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for `POST /auth/password-reset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

// ─── Account ─────────────────────────────────────────────────────────────────

/// Returned by `GET /account`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountResponse {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Request body for `POST /account/tenant`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTenantRequest {
    pub tenant_id: String,
}

/// Returned by `GET /translation/eligibility`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranslationEligibility {
    pub eligible: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Returned by `GET /config`. The document is owned by the server, so it is
/// kept as an open JSON object.
pub type RuntimeConfigResponse = serde_json::Map<String, serde_json::Value>;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// JSON error shape returned by failing endpoints, e.g.
/// `{ "error": "invalid_grant", "error_description": "Session expired" }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ErrorBody {
    /// The most specific non-empty message the server sent, if any.
    pub fn message(&self) -> Option<&str> {
        self.error_description
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.error.as_deref().filter(|s| !s.is_empty()))
    }
}
