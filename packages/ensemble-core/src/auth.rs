//! Identity verification for room connections.
//!
//! Members authenticate by sending a bearer token as their first message on
//! the room channel. Verification is delegated to an external identity
//! collaborator behind the [`IdentityVerifier`] trait, so the session layer
//! never parses or trusts tokens itself and tests can inject a mock.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EnsembleError, EnsembleResult};

/// Profile of a verified user, as shown to other room members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    /// Stable identifier from the identity provider.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Name rendered in member lists.
    #[serde(rename = "displayName")]
    pub display_name: String,
    /// Avatar image URL (may be empty).
    #[serde(rename = "avatarURL", default)]
    pub avatar_url: String,
}

/// Trait for verifying identity tokens.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verifies a token, returning the profile it identifies.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::Unauthorized`] for invalid or expired
    /// tokens, [`EnsembleError::Internal`] when the collaborator itself is
    /// unreachable.
    async fn verify(&self, token: &str) -> EnsembleResult<UserProfile>;
}

/// Production verifier that calls the external identity collaborator.
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    identity_url: String,
}

/// Timeout for identity verification requests (seconds).
const VERIFY_TIMEOUT_SECS: u64 = 10;

impl HttpIdentityVerifier {
    /// Creates a verifier against the given identity endpoint.
    pub fn new(client: reqwest::Client, identity_url: impl Into<String>) -> Self {
        Self {
            client,
            identity_url: identity_url.into(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, token: &str) -> EnsembleResult<UserProfile> {
        let response = self
            .client
            .get(&self.identity_url)
            .bearer_auth(token)
            .timeout(Duration::from_secs(VERIFY_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| EnsembleError::Internal(format!("identity collaborator: {}", e)))?;

        if !response.status().is_success() {
            return Err(EnsembleError::Unauthorized(format!(
                "identity collaborator rejected token (status {})",
                response.status()
            )));
        }

        response
            .json::<UserProfile>()
            .await
            .map_err(|e| EnsembleError::Internal(format!("identity response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_profile_serializes_with_wire_field_names() {
        let user = UserProfile {
            user_id: "u1".into(),
            display_name: "Ada".into(),
            avatar_url: "https://example.com/a.png".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["displayName"], "Ada");
        assert_eq!(json["avatarURL"], "https://example.com/a.png");
    }

    #[test]
    fn user_profile_deserializes_without_avatar() {
        let user: UserProfile =
            serde_json::from_str(r#"{"userId":"u1","displayName":"Ada"}"#).unwrap();
        assert_eq!(user.avatar_url, "");
    }
}
