use rand::Rng;
use serde::{Deserialize, Serialize};

use super::repo::Dietologist;
use crate::{
    auth::jwt::TokenPair,
    error::{ApiError, FieldErrors},
    meals::repo::Meal,
    users::repo::User,
};

const GROUP_CODE_LEN: usize = 8;
const GROUP_CODE_MAX: usize = 20;
const GROUP_NAME_MAX: usize = 255;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random invite code made of uppercase letters and digits.
pub fn generate_group_code() -> String {
    let mut rng = rand::thread_rng();
    (0..GROUP_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn check_name(errors: &mut FieldErrors, name: &str) {
    if name.is_empty() {
        errors.add("name", "This field may not be blank.");
    } else if name.chars().count() > GROUP_NAME_MAX {
        errors.add("name", "Ensure this field has no more than 255 characters.");
    }
}

fn check_code(errors: &mut FieldErrors, code: &str) {
    if code.is_empty() {
        errors.add("code", "This field may not be blank.");
    } else if code.chars().count() > GROUP_CODE_MAX {
        errors.add("code", "Ensure this field has no more than 20 characters.");
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone_number: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(String, String), ApiError> {
        let mut errors = FieldErrors::default();
        let phone = self.phone_number.as_deref().unwrap_or("").trim().to_string();
        if phone.is_empty() {
            errors.add("phone_number", "This field is required.");
        }
        let password = self.password.clone().unwrap_or_default();
        if password.is_empty() {
            errors.add("password", "This field is required.");
        }
        errors.into_result().map(|_| (phone, password))
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub dietologist: Dietologist,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: Option<String>,
    pub code: Option<String>,
}

impl CreateGroupRequest {
    /// `(name, code)`; an absent or empty code means "generate one".
    pub fn validate(&self) -> Result<(String, Option<String>), ApiError> {
        let mut errors = FieldErrors::default();
        let name = self.name.as_deref().map(str::trim).unwrap_or("");
        if self.name.is_none() {
            errors.add("name", "This field is required.");
        } else {
            check_name(&mut errors, name);
        }
        let code = self
            .code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if let Some(c) = &code {
            check_code(&mut errors, c);
        }
        errors.into_result().map(|_| (name.to_string(), code))
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub code: Option<String>,
}

impl UpdateGroupRequest {
    pub fn validate(&self) -> Result<(Option<String>, Option<String>), ApiError> {
        let mut errors = FieldErrors::default();
        let name = self.name.as_deref().map(|n| n.trim().to_string());
        if let Some(n) = &name {
            check_name(&mut errors, n);
        }
        let code = self.code.as_deref().map(|c| c.trim().to_string());
        if let Some(c) = &code {
            check_code(&mut errors, c);
        }
        errors.into_result().map(|_| (name, code))
    }
}

#[derive(Debug, Deserialize)]
pub struct RequestDietologist {
    pub group_code: Option<String>,
}

impl RequestDietologist {
    pub fn validate(&self) -> Result<String, ApiError> {
        match self.group_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => Ok(code.to_string()),
            _ => Err(ApiError::field("group_code", "This field is required.")),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientDetail {
    pub profile: User,
    pub meals: Vec<Meal>,
    pub total_meals: usize,
}
