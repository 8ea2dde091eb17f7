use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use daybreak_types::api::{Claims, CreateAlarmRequest, UpdateAlarmRequest};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn create_alarm(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAlarmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let alarm = state
        .engine
        .create_alarm(claims.sub, req.scheduled_time, req.repeat)
        .await?;
    Ok((StatusCode::CREATED, Json(alarm)))
}

pub async fn list_alarms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let alarms = state.engine.list_alarms(claims.sub).await?;
    Ok(Json(alarms))
}

pub async fn list_active_alarms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let alarms = state.engine.list_active_alarms(claims.sub).await?;
    Ok(Json(alarms))
}

pub async fn update_alarm(
    State(state): State<AppState>,
    Path(alarm_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(patch): Json<UpdateAlarmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let alarm = state.engine.update_alarm(claims.sub, alarm_id, patch).await?;
    Ok(Json(alarm))
}

pub async fn delete_alarm(
    State(state): State<AppState>,
    Path(alarm_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state.engine.delete_alarm(claims.sub, alarm_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /alarms/{id}/selfie — multipart upload of the dismissal photo.
///
/// The first part carrying a content type is taken as the payload and must
/// be `image/*`; anything else is rejected here, before the engine runs.
pub async fn submit_selfie(
    State(state): State<AppState>,
    Path(alarm_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::bad_request("malformed multipart body"))?
    {
        let Some(content_type) = field.content_type().map(str::to_owned) else {
            continue;
        };
        if !content_type.starts_with("image/") {
            return Err(ApiError::bad_request("selfie upload must be an image"));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|_| ApiError::bad_request("could not read image upload"))?;
        image = Some(bytes.to_vec());
        break;
    }

    let Some(bytes) = image else {
        return Err(ApiError::bad_request("missing image upload"));
    };

    let outcome = state
        .engine
        .submit_selfie(claims.sub, alarm_id, bytes)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list_selfies(
    State(state): State<AppState>,
    Path(alarm_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let attempts = state.engine.list_selfies(claims.sub, alarm_id).await?;
    Ok(Json(attempts))
}
