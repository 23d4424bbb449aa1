use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::users::repo::GoogleIdentity;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Checks Google ID tokens. `Ok(None)` means the token was rejected.
#[async_trait]
pub trait GoogleVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> anyhow::Result<Option<GoogleIdentity>>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: Option<String>,
    aud: Option<String>,
    email: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
}

fn identity_from(info: TokenInfo, client_id: Option<&str>) -> Option<GoogleIdentity> {
    if let Some(expected) = client_id {
        if info.aud.as_deref() != Some(expected) {
            warn!(aud = ?info.aud, "google token issued for another client");
            return None;
        }
    }
    Some(GoogleIdentity {
        google_id: info.sub.filter(|s| !s.is_empty())?,
        email: info.email.unwrap_or_default(),
        first_name: info.given_name.unwrap_or_default(),
        last_name: info.family_name.unwrap_or_default(),
    })
}

#[derive(Clone)]
pub struct TokenInfoVerifier {
    http: Client,
    client_id: Option<String>,
}

impl TokenInfoVerifier {
    pub fn new(client_id: Option<String>) -> Self {
        Self {
            http: Client::new(),
            client_id,
        }
    }
}

#[async_trait]
impl GoogleVerifier for TokenInfoVerifier {
    async fn verify(&self, id_token: &str) -> anyhow::Result<Option<GoogleIdentity>> {
        let resp = self
            .http
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .context("google tokeninfo request")?;
        if !resp.status().is_success() {
            warn!(status = %resp.status(), "google tokeninfo rejected token");
            return Ok(None);
        }
        let info: TokenInfo = resp.json().await.context("decode tokeninfo")?;
        Ok(identity_from(info, self.client_id.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(aud: &str) -> TokenInfo {
        serde_json::from_value(serde_json::json!({
            "sub": "1093",
            "aud": aud,
            "email": "aziz@example.com",
            "given_name": "Aziz",
            "email_verified": "true"
        }))
        .unwrap()
    }

    #[test]
    fn audience_must_match_when_configured() {
        assert!(identity_from(info("other"), Some("mine")).is_none());
        let id = identity_from(info("mine"), Some("mine")).unwrap();
        assert_eq!(id.google_id, "1093");
        assert_eq!(id.first_name, "Aziz");
        assert_eq!(id.last_name, "");
    }

    #[test]
    fn any_audience_without_client_id() {
        assert!(identity_from(info("whatever"), None).is_some());
    }

    #[test]
    fn subject_is_required() {
        let info: TokenInfo = serde_json::from_value(serde_json::json!({"aud": "x"})).unwrap();
        assert!(identity_from(info, None).is_none());
    }
}
