use axum::{
    body::{Body, Bytes},
    extract::{Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::extract::PathParam;
use crate::files;
use crate::models::{FileKind, FileRecord, User};
use crate::storage;
use crate::AppState;

/// Parts of an upload form, in whatever order the client sent them.
#[derive(Default)]
struct UploadForm {
    file: Option<(String, Bytes)>,
    kind: Option<String>,
    application_id: Option<String>,
}

async fn read_form(multipart: &mut Multipart) -> AppResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await?;
                form.file = Some((filename, data));
            }
            Some("type") => form.kind = Some(field.text().await?),
            Some("applicationId") => form.application_id = Some(field.text().await?),
            _ => {}
        }
    }

    Ok(form)
}

pub async fn upload_file(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let form = read_form(&mut multipart).await?;

    let (filename, data) = form
        .file
        .ok_or_else(|| AppError::bad_request("No file part in the request"))?;
    if filename.is_empty() {
        return Err(AppError::bad_request("No file selected"));
    }

    let kind: FileKind = match form.kind.as_deref().map(str::trim) {
        None | Some("") => FileKind::Document,
        Some(kind) => kind.parse().map_err(AppError::BadRequest)?,
    };
    let application_id = match form.application_id.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(id) => Some(
            Uuid::parse_str(id).map_err(|_| AppError::bad_request("Invalid applicationId"))?,
        ),
    };

    storage::validate_extension(kind, &filename)?;

    let mut original_name = storage::sanitize_filename(&filename);
    if original_name.is_empty() {
        original_name = format!("upload{}", storage::extension(&filename));
    }

    let stored = storage::save(&state.config.upload_dir, user.id, kind, &original_name, &data).await?;

    let recorded = files::record_upload(
        &mut *state.db.lock().await,
        &user,
        &original_name,
        kind,
        &stored,
        application_id,
    );
    let record = match recorded {
        Ok(record) => record,
        Err(err) => {
            storage::remove(&stored.path).await?;
            return Err(err);
        }
    };

    info!(file_id = %record.id, user_id = %user.id, kind = %kind, size = record.file_size, "File uploaded");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "File uploaded successfully",
            "fileId": record.id,
            "originalName": record.original_name,
            "fileType": record.file_type,
            "fileSize": record.file_size,
        })),
    ))
}

pub async fn get_user_files(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
) -> AppResult<impl IntoResponse> {
    let files = files::list_for_user(&*state.db.lock().await, user.id)?;
    Ok(Json(files))
}

pub async fn file_info(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    PathParam(file_id): PathParam<Uuid>,
) -> AppResult<impl IntoResponse> {
    let record = files::fetch_accessible(&*state.db.lock().await, &user, file_id)?;
    Ok(Json(record))
}

pub async fn download_file(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    PathParam(file_id): PathParam<Uuid>,
) -> AppResult<Response> {
    serve_file(&state, &user, file_id, "attachment").await
}

pub async fn view_file(
    State(state): State<AppState>,
    CurrentUser { user, .. }: CurrentUser,
    PathParam(file_id): PathParam<Uuid>,
) -> AppResult<Response> {
    serve_file(&state, &user, file_id, "inline").await
}

async fn serve_file(
    state: &AppState,
    user: &User,
    file_id: Uuid,
    disposition: &str,
) -> AppResult<Response> {
    let record = files::fetch_accessible(&*state.db.lock().await, user, file_id)?;

    let file = match fs::File::open(&record.file_path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(file_id = %record.id, "File record exists but bytes are missing");
            return Err(AppError::NotFound("File"));
        }
        Err(err) => return Err(err.into()),
    };

    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, header_value(&record.mime_type)),
            (header::CONTENT_DISPOSITION, content_disposition(disposition, &record)),
        ],
        body,
    )
        .into_response())
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

fn content_disposition(disposition: &str, record: &FileRecord) -> HeaderValue {
    let filename = record.original_name.replace(['"', '\\'], "_");
    HeaderValue::from_str(&format!("{disposition}; filename=\"{filename}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;
    use crate::users::{self, UserProfile};
    use axum::extract::{FromRequest, Request};
    use chrono::Utc;
    use serde_json::Value;

    const BOUNDARY: &str = "applytrack-boundary";

    fn upload_request(kind: &str, filename: &str, data: &[u8]) -> Request {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"type\"\r\n\r\n{kind}\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        axum::http::Request::builder()
            .method("POST")
            .uri("/api/upload-file")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn signed_in(user: &User) -> CurrentUser {
        CurrentUser {
            user: user.clone(),
            token: String::new(),
        }
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    fn record(name: &str) -> FileRecord {
        FileRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            original_name: name.to_string(),
            file_path: "uploads/x".to_string(),
            file_type: FileKind::Cv,
            mime_type: "application/pdf".to_string(),
            file_size: 1,
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn disposition_carries_original_name() {
        assert_eq!(
            content_disposition("attachment", &record("cv.pdf")),
            "attachment; filename=\"cv.pdf\""
        );
        assert_eq!(
            content_disposition("inline", &record("my\"cv\".pdf")),
            "inline; filename=\"my_cv_.pdf\""
        );
    }

    #[tokio::test]
    async fn uploaded_bytes_download_unchanged() {
        let state = test_state(1 << 20);
        let ada = users::insert(&*state.db.lock().await, "ada@example.com", "h", false, UserProfile::default()).unwrap();
        let eve = users::insert(&*state.db.lock().await, "eve@example.com", "h", false, UserProfile::default()).unwrap();
        let data = b"%PDF-1.4\n\x00\x01\xffbinary body\n%%EOF".to_vec();

        let multipart = Multipart::from_request(upload_request("cv", "cv.pdf", &data), &state).await.unwrap();
        let response = upload_file(State(state.clone()), signed_in(&ada), multipart)
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let uploaded: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(uploaded["fileType"], "cv");
        assert_eq!(uploaded["fileSize"], data.len());
        let file_id: Uuid = uploaded["fileId"].as_str().unwrap().parse().unwrap();

        let response = download_file(State(state.clone()), signed_in(&ada), PathParam(file_id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(response.headers()[header::CONTENT_DISPOSITION], "attachment; filename=\"cv.pdf\"");
        assert_eq!(body_bytes(response).await.as_ref(), data.as_slice());

        let response = view_file(State(state.clone()), signed_in(&ada), PathParam(file_id)).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_DISPOSITION], "inline; filename=\"cv.pdf\"");

        let denied = download_file(State(state.clone()), signed_in(&eve), PathParam(file_id)).await;
        assert!(matches!(denied, Err(AppError::Forbidden)));

        let _ = fs::remove_dir_all(&state.config.upload_dir).await;
    }

    #[tokio::test]
    async fn disallowed_extension_stores_nothing() {
        let state = test_state(1 << 20);
        let ada = users::insert(&*state.db.lock().await, "ada@example.com", "h", false, UserProfile::default()).unwrap();

        let multipart = Multipart::from_request(upload_request("cv", "cv.exe", b"MZ"), &state).await.unwrap();
        let result = upload_file(State(state.clone()), signed_in(&ada), multipart).await;

        assert!(matches!(result, Err(AppError::BadRequest(ref msg)) if msg.starts_with("Invalid file type")));
        assert!(files::list_for_user(&*state.db.lock().await, ada.id).unwrap().is_empty());
        assert!(!storage::user_dir(&state.config.upload_dir, ada.id).exists());
    }
}
