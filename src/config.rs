use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base used to build public object URLs; defaults to `endpoint`.
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub transcribe_model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    pub ttl_seconds: i64,
    pub sms_gateway_url: Option<String>,
    pub sms_gateway_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub openai: OpenAiConfig,
    pub otp: OtpConfig,
    pub google_client_id: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Reads configuration through `get` so tests need not touch the process env.
    pub fn from_env_with<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| get(key).with_context(|| format!("{key} missing"));
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let number = |key: &str, default: i64| {
            get(key)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(default)
        };

        let database_url = required("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: required("JWT_SECRET")?,
            issuer: or("JWT_ISSUER", "nutritrack"),
            audience: or("JWT_AUDIENCE", "nutritrack-users"),
            ttl_minutes: number("JWT_TTL_MINUTES", 60),
            refresh_ttl_minutes: number("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };

        let endpoint = required("MINIO_ENDPOINT")?;
        let storage = StorageConfig {
            public_url: or("MINIO_PUBLIC_URL", &endpoint),
            endpoint,
            bucket: or("MINIO_BUCKET", "nutritrack"),
            access_key: required("MINIO_ACCESS_KEY")?,
            secret_key: required("MINIO_SECRET_KEY")?,
            region: or("MINIO_REGION", "us-east-1"),
        };

        let openai = OpenAiConfig {
            api_key: required("OPENAI_API_KEY")?,
            base_url: or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: or("OPENAI_MODEL", "gpt-4o-mini"),
            transcribe_model: or("OPENAI_TRANSCRIBE_MODEL", "gpt-4o-transcribe"),
        };

        let otp = OtpConfig {
            ttl_seconds: number("OTP_TTL_SECONDS", 120),
            sms_gateway_url: get("SMS_GATEWAY_URL").filter(|v| !v.is_empty()),
            sms_gateway_token: get("SMS_GATEWAY_TOKEN").filter(|v| !v.is_empty()),
        };

        Ok(Self {
            database_url,
            jwt,
            storage,
            openai,
            otp,
            google_client_id: get("GOOGLE_CLIENT_ID").filter(|v| !v.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/nutritrack"),
        ("JWT_SECRET", "sekrit"),
        ("MINIO_ENDPOINT", "http://minio:9000"),
        ("MINIO_ACCESS_KEY", "ak"),
        ("MINIO_SECRET_KEY", "sk"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    #[test]
    fn defaults_fill_optional_values() {
        let cfg = AppConfig::from_env_with(env(MINIMAL)).expect("cfg");
        assert_eq!(cfg.jwt.issuer, "nutritrack");
        assert_eq!(cfg.jwt.ttl_minutes, 60);
        assert_eq!(cfg.jwt.refresh_ttl_minutes, 60 * 24 * 14);
        assert_eq!(cfg.storage.public_url, "http://minio:9000");
        assert_eq!(cfg.storage.region, "us-east-1");
        assert_eq!(cfg.openai.model, "gpt-4o-mini");
        assert_eq!(cfg.otp.ttl_seconds, 120);
        assert!(cfg.otp.sms_gateway_url.is_none());
        assert!(cfg.google_client_id.is_none());
    }

    #[test]
    fn missing_secret_is_an_error() {
        let pairs: Vec<_> = MINIMAL
            .iter()
            .copied()
            .filter(|(k, _)| *k != "JWT_SECRET")
            .collect();
        let err = AppConfig::from_env_with(env(&pairs)).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn overrides_and_bad_numbers() {
        let mut pairs = MINIMAL.to_vec();
        pairs.push(("JWT_TTL_MINUTES", "15"));
        pairs.push(("OTP_TTL_SECONDS", "soon"));
        pairs.push(("MINIO_PUBLIC_URL", "https://cdn.example.com"));
        pairs.push(("GOOGLE_CLIENT_ID", "client.apps.googleusercontent.com"));
        let cfg = AppConfig::from_env_with(env(&pairs)).expect("cfg");
        assert_eq!(cfg.jwt.ttl_minutes, 15);
        assert_eq!(cfg.otp.ttl_seconds, 120);
        assert_eq!(cfg.storage.public_url, "https://cdn.example.com");
        assert_eq!(
            cfg.google_client_id.as_deref(),
            Some("client.apps.googleusercontent.com")
        );
    }
}
