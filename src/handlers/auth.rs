use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::{
    clear_session_cookie, create_auth_token, delete_auth_token, hash_password, session_cookie, CurrentUser,
};
use crate::error::AppResult;
use crate::extract::JsonBody;
use crate::handlers::message;
use crate::models::NewUser;
use crate::users;
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginUser {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(user_data): JsonBody<NewUser>,
) -> AppResult<impl IntoResponse> {
    users::validate_credentials(&user_data.email, &user_data.password)?;
    let password_hash = hash_password(&user_data.password)?;

    let user = users::register(&*state.db.lock().await, user_data, &password_hash, false)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "user_id": user.id,
        })),
    ))
}

pub async fn login_user(
    State(state): State<AppState>,
    JsonBody(login_data): JsonBody<LoginUser>,
) -> AppResult<impl IntoResponse> {
    users::validate_credentials(&login_data.email, &login_data.password)?;

    let candidate = users::find_by_email(&*state.db.lock().await, login_data.email.trim())?;
    let user = users::authenticate(candidate, &login_data.password)?;
    let token = create_auth_token(&*state.db.lock().await, &user.id)?;

    info!(user_id = %user.id, "User logged in");

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(json!({
            "message": "Login successful",
            "user_id": user.id,
            "is_admin": user.is_admin,
            "token": token,
        })),
    ))
}

pub async fn logout_user(
    State(state): State<AppState>,
    current: Option<CurrentUser>,
) -> AppResult<impl IntoResponse> {
    if let Some(current) = current {
        delete_auth_token(&*state.db.lock().await, &current.token)?;
        info!(user_id = %current.user.id, "User logged out");
    }

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        message("Logout successful"),
    ))
}

pub async fn check_auth(current: Option<CurrentUser>) -> impl IntoResponse {
    let body = match current {
        Some(CurrentUser { user, .. }) => json!({
            "authenticated": true,
            "user_id": user.id,
            "is_admin": user.is_admin,
        }),
        None => json!({ "authenticated": false }),
    };

    (StatusCode::OK, Json(body))
}

pub async fn user_profile(CurrentUser { user, .. }: CurrentUser) -> impl IntoResponse {
    Json(json!({
        "id": user.id,
        "email": user.email,
        "first_name": user.first_name,
        "last_name": user.last_name,
        "is_admin": user.is_admin,
    }))
}
