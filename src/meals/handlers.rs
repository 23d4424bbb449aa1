use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header::ACCEPT_LANGUAGE, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    analyzer::Language,
    dto::{
        DailySummaryQuery, ImageAnalysis, MealInput, MealListItem, MealPage, Pagination,
        VoiceAnalysis,
    },
    repo::Meal,
    services::{read_upload, resolve_language, store_and_analyze, UploadKind},
};
use crate::{
    auth::AuthUser,
    dates::{parse_iso_date, today_utc},
    error::ApiError,
    nutrition::DailySummary,
    response::{created, message, ok, ApiResult, Created, Envelope},
    state::AppState,
};

const UPLOAD_LIMIT: usize = 20 * 1024 * 1024;

pub fn meal_routes() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals).post(create_meal))
        .route("/meals/daily-summary", get(daily_summary))
        .route(
            "/meals/:id",
            get(get_meal)
                .put(replace_meal)
                .patch(patch_meal)
                .delete(delete_meal),
        )
        .merge(upload_routes())
}

fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/meals/analyze", post(analyze_image))
        .route("/meals/analyze-voice", post(analyze_voice))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
}

fn accept_language(headers: &HeaderMap) -> Option<&str> {
    headers.get(ACCEPT_LANGUAGE).and_then(|v| v.to_str().ok())
}

#[instrument(skip(state, headers, mp))]
pub async fn analyze_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    mp: Multipart,
) -> ApiResult<ImageAnalysis> {
    let (file, form) = read_upload(mp, UploadKind::Image).await?;
    let language = resolve_language(
        form.language.as_deref(),
        accept_language(&headers),
        Language::En,
    );
    let meal_date = form.meal_date.unwrap_or_else(today_utc);

    let (image_url, analysis) = store_and_analyze(
        state.storage.as_ref(),
        state.analyzer.as_ref(),
        UploadKind::Image,
        &file,
        meal_date,
        language,
    )
    .await?;

    info!(
        user_id = %user_id,
        foods = analysis.foods.len(),
        is_food = analysis.is_food,
        meal_time = form.meal_time.map(|s| s.as_str()),
        "image analyzed"
    );
    Ok(ok(ImageAnalysis {
        image_url,
        foods: analysis.foods,
    }))
}

#[instrument(skip(state, headers, mp))]
pub async fn analyze_voice(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    mp: Multipart,
) -> ApiResult<VoiceAnalysis> {
    let (file, form) = read_upload(mp, UploadKind::Audio).await?;
    let language = resolve_language(
        form.language.as_deref(),
        accept_language(&headers),
        Language::Uz,
    );
    let meal_date = form.meal_date.unwrap_or_else(today_utc);

    let (audio_url, analysis) = store_and_analyze(
        state.storage.as_ref(),
        state.analyzer.as_ref(),
        UploadKind::Audio,
        &file,
        meal_date,
        language,
    )
    .await?;

    info!(
        user_id = %user_id,
        foods = analysis.foods.len(),
        ?language,
        meal_time = form.meal_time.map(|s| s.as_str()),
        "voice note analyzed"
    );
    Ok(ok(VoiceAnalysis {
        transcription: analysis.transcription.unwrap_or_default(),
        audio_url,
        foods: analysis.foods,
    }))
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<Pagination>,
) -> ApiResult<MealPage<MealListItem>> {
    let (page, page_size) = p.resolve();
    let offset = i64::from(page - 1) * i64::from(page_size);

    let count = Meal::count_for_user(&state.db, user_id).await?;
    let results = Meal::list_page(&state.db, user_id, i64::from(page_size), offset).await?;
    Ok(ok(MealPage {
        count,
        page,
        page_size,
        results,
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<MealInput>,
) -> Created<Meal> {
    let new_meal = payload
        .validate_new(today_utc())
        .map_err(ApiError::Validation)?;
    let meal = Meal::create(&state.db, user_id, &new_meal).await?;
    info!(user_id = %user_id, meal_id = %meal.id, meal_date = %meal.meal_date, "meal created");
    Ok(created(meal))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Meal> {
    let meal = Meal::find_owned(&state.db, id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Meal not found"))?;
    Ok(ok(meal))
}

async fn update_meal(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    payload: MealInput,
    partial: bool,
) -> ApiResult<Meal> {
    if Meal::find_owned(&state.db, id, user_id).await?.is_none() {
        return Err(ApiError::not_found("Meal not found"));
    }
    let changes = payload
        .validate_changes(partial)
        .map_err(ApiError::Validation)?;
    let meal = Meal::update(&state.db, id, user_id, &changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Meal not found"))?;
    info!(user_id = %user_id, meal_id = %id, partial, "meal updated");
    Ok(ok(meal))
}

#[instrument(skip(state, payload))]
pub async fn replace_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MealInput>,
) -> ApiResult<Meal> {
    update_meal(&state, user_id, id, payload, false).await
}

#[instrument(skip(state, payload))]
pub async fn patch_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MealInput>,
) -> ApiResult<Meal> {
    update_meal(&state, user_id, id, payload, true).await
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<()>>, ApiError> {
    if !Meal::delete(&state.db, id, user_id).await? {
        return Err(ApiError::not_found("Meal not found"));
    }
    info!(user_id = %user_id, meal_id = %id, "meal deleted");
    Ok(message("Meal deleted successfully"))
}

#[instrument(skip(state))]
pub async fn daily_summary(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DailySummaryQuery>,
) -> ApiResult<DailySummary<Meal>> {
    let raw = q
        .date
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::bad_request("Date parameter is required"))?;
    let date = parse_iso_date(raw).ok_or_else(|| {
        warn!(date = %raw, "daily summary with malformed date");
        ApiError::bad_request("Invalid date format. Use YYYY-MM-DD")
    })?;

    let meals = Meal::list_by_date(&state.db, user_id, date).await?;
    Ok(ok(DailySummary::build(date, meals)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{claims::Role, JwtKeys};
    use axum::{
        body::{to_bytes, Body},
        extract::FromRef,
        http::{header::AUTHORIZATION, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn bearer(state: &AppState) -> String {
        let pair = JwtKeys::from_ref(state)
            .sign_pair(Uuid::new_v4(), Role::User)
            .unwrap();
        format!("Bearer {}", pair.access_token)
    }

    async fn call(uri: &str, auth: Option<String>) -> (StatusCode, serde_json::Value) {
        let state = AppState::fake();
        let auth = auth.map(|_| bearer(&state));
        let app = meal_routes().with_state(state);
        let mut req = Request::builder().uri(uri);
        if let Some(a) = auth {
            req = req.header(AUTHORIZATION, a);
        }
        let res = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn summary_requires_authentication() {
        let (status, body) = call("/meals/daily-summary?date=2024-01-01", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "not_authenticated");
    }

    #[tokio::test]
    async fn summary_requires_date() {
        let (status, body) = call("/meals/daily-summary", Some(String::new())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Date parameter is required");
    }

    #[tokio::test]
    async fn summary_rejects_malformed_date() {
        let (status, body) = call("/meals/daily-summary?date=01-02-2024", Some(String::new())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid date format. Use YYYY-MM-DD");
        assert_eq!(body["success"], false);
    }
}
