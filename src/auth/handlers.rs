use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::{
    claims::{Role, TokenKind},
    dto::{
        GoogleAuthRequest, LoginResponse, OtpSent, RefreshRequest, SendOtpRequest,
        VerifyOtpRequest,
    },
    jwt::{JwtKeys, TokenError, TokenPair},
    otp::{generate_otp, OtpSession},
};
use crate::{
    error::ApiError,
    response::{ok, ok_with_message, ApiResult},
    state::AppState,
    users::repo::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/send-otp", post(send_otp))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/google", post(google_auth))
        .route("/auth/refresh", post(refresh))
}

fn login_response(state: &AppState, user: &User) -> Result<LoginResponse, ApiError> {
    let tokens = JwtKeys::from_ref(state).sign_pair(user.id, Role::User)?;
    Ok(LoginResponse {
        tokens,
        new_user: !user.profile_completed,
    })
}

#[instrument(skip(state, payload))]
pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> ApiResult<OtpSent> {
    let phone = payload.validate()?;
    let code = generate_otp();
    let session = OtpSession::create(&state.db, &phone, &code, state.config.otp.ttl_seconds).await?;

    if let Err(e) = state.sms.send_otp(&phone, &code).await {
        error!(error = %e, phone = %phone, "otp delivery failed");
        return Err(ApiError::Service("Failed to send OTP".into()));
    }

    info!(phone = %phone, session = %session.session, "otp session created");
    Ok(ok_with_message(
        OtpSent {
            session: session.session,
            expiry: session.expiry_seconds(OffsetDateTime::now_utc()),
        },
        "OTP sent successfully",
    ))
}

#[instrument(skip(state, payload))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> ApiResult<LoginResponse> {
    let input = payload.validate()?;

    let session = OtpSession::find_pending(&state.db, input.session, &input.phone_number)
        .await?
        .ok_or_else(|| {
            warn!(session = %input.session, "unknown or used otp session");
            ApiError::bad_request("Invalid session")
        })?;

    session
        .check(&input.otp, OffsetDateTime::now_utc())
        .map_err(|e| {
            warn!(session = %session.session, reason = %e, "otp rejected");
            ApiError::bad_request(e.to_string())
        })?;

    if !OtpSession::claim(&state.db, session.session).await? {
        warn!(session = %session.session, "otp session already used");
        return Err(ApiError::bad_request("Invalid session"));
    }
    let user = User::get_or_create_by_phone(&state.db, &input.phone_number).await?;
    User::set_fcm_token(&state.db, user.id, &input.fcm_token).await?;

    info!(user_id = %user.id, "user logged in with otp");
    Ok(ok(login_response(&state, &user)?))
}

#[instrument(skip(state, payload))]
pub async fn google_auth(
    State(state): State<AppState>,
    Json(payload): Json<GoogleAuthRequest>,
) -> ApiResult<LoginResponse> {
    let (google_token, fcm_token) = payload.validate()?;

    let identity = state
        .google
        .verify(&google_token)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "google token verification failed");
            None
        })
        .ok_or_else(|| ApiError::bad_request("Invalid Google token"))?;

    let user = User::get_or_create_by_google(&state.db, &identity).await?;
    User::set_fcm_token(&state.db, user.id, &fcm_token).await?;

    info!(user_id = %user.id, "user logged in with google");
    Ok(ok(login_response(&state, &user)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<TokenPair> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_kind(&payload.refresh_token, TokenKind::Refresh)
        .map_err(|e| match e {
            TokenError::Expired => {
                ApiError::forbidden("expired_refresh_token", "Refresh token has expired")
            }
            other => {
                warn!(error = %other, "refresh token rejected");
                ApiError::forbidden("invalid_refresh_token", "Invalid refresh token")
            }
        })?;

    let pair = keys.sign_pair(claims.sub, claims.role)?;
    info!(subject = %claims.sub, role = ?claims.role, "tokens refreshed");
    Ok(ok(pair))
}
