use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::applications;
use crate::auth::{AdminUser, CurrentUser};
use crate::error::{AppError, AppResult};
use crate::extract::{JsonBody, PathParam};
use crate::handlers::message;
use crate::models::{ApplicationChanges, NotesChange, StatusChanges};
use crate::storage;
use crate::AppState;

pub async fn submit_application(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    JsonBody(changes): JsonBody<ApplicationChanges>,
) -> AppResult<impl IntoResponse> {
    let (application, created) = applications::submit(&*state.db.lock().await, &user, changes)?;

    let (status, text) = if created {
        (StatusCode::CREATED, "Application submitted successfully")
    } else {
        (StatusCode::OK, "Application updated successfully")
    };

    Ok((
        status,
        Json(json!({ "message": text, "application_id": application.id })),
    ))
}

pub async fn get_own_application(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let application = applications::find_for_user(&*state.db.lock().await, user.id)?
        .ok_or_else(|| AppError::NotFound("Application"))?;

    Ok(Json(application))
}

pub async fn get_application(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    PathParam(application_id): PathParam<Uuid>,
) -> AppResult<impl IntoResponse> {
    let application = applications::fetch_accessible(&*state.db.lock().await, &user, application_id)?;
    Ok(Json(application))
}

pub async fn get_all_applications(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> AppResult<impl IntoResponse> {
    let all = applications::list_all(&*state.db.lock().await)?;
    Ok(Json(all))
}

pub async fn update_application(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    PathParam(application_id): PathParam<Uuid>,
    JsonBody(changes): JsonBody<ApplicationChanges>,
) -> AppResult<impl IntoResponse> {
    let application = applications::update(&*state.db.lock().await, &user, application_id, changes)?;

    Ok(Json(json!({
        "message": "Application updated successfully",
        "application_id": application.id,
    })))
}

pub async fn update_application_status(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    PathParam(application_id): PathParam<Uuid>,
    JsonBody(changes): JsonBody<StatusChanges>,
) -> AppResult<impl IntoResponse> {
    let application = applications::update_status(&*state.db.lock().await, &user, application_id, changes)?;

    Ok(Json(json!({
        "message": "Application status updated successfully",
        "application_id": application.id,
    })))
}

pub async fn update_application_notes(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathParam(application_id): PathParam<Uuid>,
    JsonBody(change): JsonBody<NotesChange>,
) -> AppResult<impl IntoResponse> {
    let application = applications::update_notes(&*state.db.lock().await, &admin, application_id, change)?;

    Ok(Json(json!({
        "message": "Application notes updated successfully",
        "application_id": application.id,
    })))
}

pub async fn delete_application(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    PathParam(application_id): PathParam<Uuid>,
) -> AppResult<impl IntoResponse> {
    let removed = applications::delete(&mut *state.db.lock().await, &user, application_id)?;
    storage::discard(&removed).await;

    Ok(message("Application deleted successfully"))
}
