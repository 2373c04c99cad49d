use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{hash_password, AdminUser};
use crate::error::{AppError, AppResult};
use crate::extract::{JsonBody, PathParam};
use crate::handlers::message;
use crate::models::NewUser;
use crate::reports;
use crate::storage;
use crate::users;
use crate::AppState;

pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> AppResult<impl IntoResponse> {
    let users = users::list_with_applications(&*state.db.lock().await)?;
    Ok(Json(users))
}

pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    JsonBody(user_data): JsonBody<NewUser>,
) -> AppResult<impl IntoResponse> {
    users::validate_credentials(&user_data.email, &user_data.password)?;
    let password_hash = hash_password(&user_data.password)?;

    let user = users::register(&*state.db.lock().await, user_data, &password_hash, true)?;
    info!(admin_id = %admin.id, user_id = %user.id, "Admin created user");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created successfully",
            "user_id": user.id,
        })),
    ))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathParam(user_id): PathParam<Uuid>,
) -> AppResult<impl IntoResponse> {
    if user_id == admin.id {
        return Err(AppError::bad_request("Cannot delete your own account"));
    }

    if !users::delete(&*state.db.lock().await, user_id)? {
        return Err(AppError::NotFound("User"));
    }

    // The rows are already gone at this point
    if let Err(err) = storage::remove_user_dir(&state.config.upload_dir, user_id).await {
        warn!(%user_id, "Failed to remove upload directory: {err}");
    }

    info!(admin_id = %admin.id, %user_id, "Admin deleted user");
    Ok(message("User deleted successfully"))
}

pub async fn university_report(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<impl IntoResponse> {
    let rows = reports::load_status_rows(&*state.db.lock().await)?;
    Ok(Json(reports::university_report(&rows, &admin.email)))
}

pub async fn enrollment_statistics(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<impl IntoResponse> {
    let rows = reports::load_status_rows(&*state.db.lock().await)?;
    Ok(Json(reports::enrollment_statistics(&rows, &admin.email)))
}
