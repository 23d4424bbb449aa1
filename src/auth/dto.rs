use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::TokenPair;
use crate::error::{ApiError, FieldErrors};

const REQUIRED: &str = "This field is required.";

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    lazy_static! {
        static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9]+$").unwrap();
    }
    phone.len() <= 15 && PHONE_RE.is_match(phone)
}

fn required<'a>(errors: &mut FieldErrors, field: &str, value: &'a Option<String>) -> &'a str {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => {
            errors.add(field, REQUIRED);
            ""
        }
    }
}

fn phone_field(errors: &mut FieldErrors, value: &Option<String>) -> String {
    let phone = required(errors, "phone_number", value);
    if !phone.is_empty() && !is_valid_phone(phone) {
        errors.add("phone_number", "Enter a valid phone number.");
    }
    phone.to_string()
}

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub phone_number: Option<String>,
}

impl SendOtpRequest {
    pub fn validate(&self) -> Result<String, ApiError> {
        let mut errors = FieldErrors::default();
        let phone = phone_field(&mut errors, &self.phone_number);
        errors.into_result().map(|_| phone)
    }
}

#[derive(Debug, Serialize)]
pub struct OtpSent {
    pub session: Uuid,
    pub expiry: i64,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub session: Option<String>,
    pub otp: Option<String>,
    pub phone_number: Option<String>,
    pub fcm_token: Option<String>,
}

#[derive(Debug)]
pub struct VerifyOtp {
    pub session: Uuid,
    pub otp: String,
    pub phone_number: String,
    pub fcm_token: String,
}

impl VerifyOtpRequest {
    pub fn validate(&self) -> Result<VerifyOtp, ApiError> {
        let mut errors = FieldErrors::default();

        let session = required(&mut errors, "session", &self.session);
        let session = match Uuid::parse_str(session) {
            Ok(id) => id,
            Err(_) => {
                if !session.is_empty() {
                    errors.add("session", "Must be a valid UUID.");
                }
                Uuid::nil()
            }
        };
        let otp = required(&mut errors, "otp", &self.otp).to_string();
        if otp.len() > 6 {
            errors.add("otp", "Ensure this field has no more than 6 characters.");
        }
        let phone_number = phone_field(&mut errors, &self.phone_number);
        let fcm_token = required(&mut errors, "fcm_token", &self.fcm_token).to_string();

        errors.into_result()?;
        Ok(VerifyOtp {
            session,
            otp,
            phone_number,
            fcm_token,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    pub google_token: Option<String>,
    pub fcm_token: Option<String>,
}

impl GoogleAuthRequest {
    /// `(google_token, fcm_token)`
    pub fn validate(&self) -> Result<(String, String), ApiError> {
        let mut errors = FieldErrors::default();
        let token = required(&mut errors, "google_token", &self.google_token).to_string();
        let fcm = required(&mut errors, "fcm_token", &self.fcm_token).to_string();
        errors.into_result().map(|_| (token, fcm))
    }
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(alias = "refresh")]
    pub refresh_token: String,
}

/// Tokens plus whether the client still has to complete the profile.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub new_user: bool,
}
