use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use crate::config::OtpConfig;

/// Delivers OTP codes to phones.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_otp(&self, phone_number: &str, code: &str) -> anyhow::Result<()>;
}

pub fn otp_message(code: &str) -> String {
    format!("Your verification code: {code}")
}

/// Development sender: the code only goes to the log.
#[derive(Clone, Default)]
pub struct LogSmsSender;

#[async_trait]
impl SmsSender for LogSmsSender {
    async fn send_otp(&self, phone_number: &str, code: &str) -> anyhow::Result<()> {
        info!(phone = %phone_number, code = %code, "sms gateway not configured; otp logged");
        Ok(())
    }
}

/// Posts `{phone_number, message}` to an HTTP SMS gateway.
#[derive(Clone)]
pub struct HttpSmsGateway {
    http: Client,
    url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct SmsRequest<'a> {
    phone_number: &'a str,
    message: String,
}

impl HttpSmsGateway {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl SmsSender for HttpSmsGateway {
    async fn send_otp(&self, phone_number: &str, code: &str) -> anyhow::Result<()> {
        let mut req = self.http.post(&self.url).json(&SmsRequest {
            phone_number,
            message: otp_message(code),
        });
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("sms gateway request")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(%status, body = %body, "sms gateway rejected message");
            anyhow::bail!("sms gateway returned {status}");
        }
        info!(phone = %phone_number, "otp sms sent");
        Ok(())
    }
}

/// Gateway sender when a URL is configured, log sender otherwise.
pub fn from_config(cfg: &OtpConfig) -> std::sync::Arc<dyn SmsSender> {
    match &cfg.sms_gateway_url {
        Some(url) => std::sync::Arc::new(HttpSmsGateway::new(
            url.clone(),
            cfg.sms_gateway_token.clone(),
        )),
        None => std::sync::Arc::new(LogSmsSender),
    }
}
