use axum::{
    extract::{FromRef, Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        generate_group_code, ClientDetail, CreateGroupRequest, LoginRequest, LoginResponse,
        RequestDietologist, UpdateGroupRequest,
    },
    repo::{ClientRequestView, ClientRequests, Dietologist, Group, RequestStatus},
};
use crate::{
    auth::{claims::Role, password::verify_password, AuthDietologist, AuthUser, JwtKeys},
    error::ApiError,
    meals::repo::Meal,
    response::{created, created_message, message, ok, ApiResult, Created, Envelope},
    state::AppState,
    users::repo::User,
};

/// Attempts at drawing an unused group code before giving up.
const CODE_ATTEMPTS: usize = 5;

pub fn dietologist_routes() -> Router<AppState> {
    Router::new()
        .route("/dietologists/login", post(login))
        .route("/dietologists/groups", get(list_groups).post(create_group))
        .route("/dietologists/groups/:id", patch(update_group))
        .route("/dietologists/requests", get(pending_requests))
        .route("/dietologists/requests/:id/approve", post(approve_request))
        .route("/dietologists/requests/:id/reject", post(reject_request))
        .route("/dietologists/clients", get(list_clients))
        .route("/dietologists/clients/:user_id", get(client_detail))
        .route("/dietologists/request", post(request_dietologist))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let (phone, password) = payload.validate()?;
    let invalid = || ApiError::unauthorized("invalid_credentials", "Invalid credentials");

    let Some(dietologist) = Dietologist::find_active_by_phone(&state.db, &phone).await? else {
        warn!(phone = %phone, "dietologist login unknown phone");
        return Err(invalid());
    };
    if !verify_password(&password, &dietologist.password_hash)? {
        warn!(dietologist_id = %dietologist.id, "dietologist login invalid password");
        return Err(invalid());
    }

    let tokens = JwtKeys::from_ref(&state).sign_pair(dietologist.id, Role::Dietologist)?;
    info!(dietologist_id = %dietologist.id, "dietologist logged in");
    Ok(ok(LoginResponse {
        tokens,
        dietologist,
    }))
}

async fn unused_code(state: &AppState) -> Result<String, ApiError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_group_code();
        if !Group::code_taken(&state.db, &code, None).await? {
            return Ok(code);
        }
    }
    Err(anyhow::anyhow!("could not generate a unique group code").into())
}

#[instrument(skip(state, dietologist, payload))]
pub async fn create_group(
    State(state): State<AppState>,
    AuthDietologist(dietologist): AuthDietologist,
    Json(payload): Json<CreateGroupRequest>,
) -> Created<Group> {
    let (name, code) = payload.validate()?;
    let code = match code {
        Some(code) => {
            if Group::code_taken(&state.db, &code, None).await? {
                return Err(ApiError::field("code", "Group with this code already exists."));
            }
            code
        }
        None => unused_code(&state).await?,
    };

    let group = Group::create(&state.db, dietologist.id, &name, &code).await?;
    info!(dietologist_id = %dietologist.id, group_id = %group.id, "group created");
    Ok(created(group))
}

#[instrument(skip(state, dietologist))]
pub async fn list_groups(
    State(state): State<AppState>,
    AuthDietologist(dietologist): AuthDietologist,
) -> ApiResult<Vec<Group>> {
    Ok(ok(Group::list_for(&state.db, dietologist.id).await?))
}

#[instrument(skip(state, dietologist, payload))]
pub async fn update_group(
    State(state): State<AppState>,
    AuthDietologist(dietologist): AuthDietologist,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateGroupRequest>,
) -> ApiResult<Group> {
    let group = Group::find_owned(&state.db, id, dietologist.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Group not found"))?;

    let (name, code) = payload.validate()?;
    if let Some(code) = &code {
        if Group::code_taken(&state.db, code, Some(group.id)).await? {
            return Err(ApiError::bad_request("Code already in use"));
        }
    }

    let group = Group::update(&state.db, group.id, name.as_deref(), code.as_deref()).await?;
    info!(group_id = %group.id, "group updated");
    Ok(ok(group))
}

#[instrument(skip(state, dietologist))]
pub async fn pending_requests(
    State(state): State<AppState>,
    AuthDietologist(dietologist): AuthDietologist,
) -> ApiResult<Vec<ClientRequestView>> {
    Ok(ok(ClientRequests::pending_for(&state.db, dietologist.id).await?))
}

async fn respond(
    state: &AppState,
    dietologist: &Dietologist,
    request_id: Uuid,
    status: RequestStatus,
) -> Result<(), ApiError> {
    if !ClientRequests::respond(&state.db, request_id, dietologist.id, status).await? {
        return Err(ApiError::not_found("Request not found"));
    }
    info!(
        dietologist_id = %dietologist.id,
        request_id = %request_id,
        status = status.as_str(),
        "client request answered"
    );
    Ok(())
}

#[instrument(skip(state, dietologist))]
pub async fn approve_request(
    State(state): State<AppState>,
    AuthDietologist(dietologist): AuthDietologist,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<()>>, ApiError> {
    respond(&state, &dietologist, id, RequestStatus::Approved).await?;
    Ok(message("Request approved"))
}

#[instrument(skip(state, dietologist))]
pub async fn reject_request(
    State(state): State<AppState>,
    AuthDietologist(dietologist): AuthDietologist,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<()>>, ApiError> {
    respond(&state, &dietologist, id, RequestStatus::Rejected).await?;
    Ok(message("Request rejected"))
}

#[instrument(skip(state, dietologist))]
pub async fn list_clients(
    State(state): State<AppState>,
    AuthDietologist(dietologist): AuthDietologist,
) -> ApiResult<Vec<User>> {
    Ok(ok(ClientRequests::clients_of(&state.db, dietologist.id).await?))
}

#[instrument(skip(state, dietologist))]
pub async fn client_detail(
    State(state): State<AppState>,
    AuthDietologist(dietologist): AuthDietologist,
    Path(user_id): Path<Uuid>,
) -> ApiResult<ClientDetail> {
    if !ClientRequests::is_client(&state.db, dietologist.id, user_id).await? {
        return Err(ApiError::not_found("Client not found"));
    }
    let profile = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Client not found"))?;
    let meals = Meal::list_all_for_user(&state.db, user_id).await?;

    Ok(ok(ClientDetail {
        profile,
        total_meals: meals.len(),
        meals,
    }))
}

#[instrument(skip(state, payload))]
pub async fn request_dietologist(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<RequestDietologist>,
) -> Created<()> {
    let group_code = payload.validate()?;
    let group = Group::find_by_code(&state.db, &group_code)
        .await?
        .ok_or_else(|| ApiError::not_found("Invalid group code"))?;

    if ClientRequests::has_approved(&state.db, user_id).await? {
        return Err(ApiError::bad_request(
            "You already have an approved dietologist",
        ));
    }
    if ClientRequests::has_pending(&state.db, user_id, group.id).await? {
        return Err(ApiError::bad_request("Request already pending"));
    }

    let request_id = ClientRequests::create(&state.db, user_id, group.id).await?;
    info!(user_id = %user_id, group_id = %group.id, request_id = %request_id, "dietologist requested");
    Ok(created_message("Request sent successfully"))
}
