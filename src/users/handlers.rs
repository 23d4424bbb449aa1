use axum::{extract::State, routing::get, Json, Router};
use tracing::{info, instrument, warn};

use super::{dto::ProfileInput, repo::User};
use crate::{
    auth::AuthUser,
    dates::today_utc,
    error::ApiError,
    response::{ok, ok_with_message, ApiResult},
    state::AppState,
};

pub fn profile_routes() -> Router<AppState> {
    Router::new().route(
        "/profile",
        get(get_profile)
            .post(create_profile)
            .put(update_profile)
            .patch(update_profile),
    )
}

async fn load_user(state: &AppState, user_id: uuid::Uuid) -> Result<User, ApiError> {
    User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("not_authenticated", "User not found"))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<User> {
    Ok(ok(load_user(&state, user_id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ProfileInput>,
) -> ApiResult<User> {
    let user = load_user(&state, user_id).await?;
    if user.profile_completed {
        warn!(user_id = %user_id, "profile already completed");
        return Err(ApiError::bad_request("Profile already completed"));
    }
    payload.validate(today_utc(), true).into_result()?;

    let user = User::update_profile(&state.db, user_id, &payload, true).await?;
    info!(user_id = %user_id, "profile completed");
    Ok(ok_with_message(user, "Profile created successfully"))
}

/// PUT and PATCH both apply only the fields present in the body.
#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ProfileInput>,
) -> ApiResult<User> {
    load_user(&state, user_id).await?;
    payload.validate(today_utc(), false).into_result()?;

    let user = User::update_profile(&state.db, user_id, &payload, false).await?;
    info!(user_id = %user_id, "profile updated");
    Ok(ok_with_message(user, "Profile updated successfully"))
}
