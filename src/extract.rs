use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// A JSON body. Malformed input, a wrong content type and values the target
/// type refuses all come back as `AppError`.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// A path parameter, rejected as `AppError` when it does not parse.
pub struct PathParam<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(PathParam(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnrollmentStatus, StatusChanges};
    use axum::{
        body::Body,
        http::{header, StatusCode},
        response::IntoResponse,
    };
    use serde_json::Value;

    fn json_request(body: &str) -> Request {
        axum::http::Request::builder()
            .method("PUT")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn rejection(req: Request) -> (StatusCode, Value) {
        let err = match JsonBody::<StatusChanges>::from_request(req, &()).await {
            Ok(_) => panic!("body was accepted"),
            Err(err) => err,
        };
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn accepts_known_status() {
        let JsonBody(changes) = JsonBody::<StatusChanges>::from_request(
            json_request(r#"{"enrollment_status":"applied"}"#),
            &(),
        )
        .await
        .unwrap_or_else(|_| panic!("body was rejected"));
        assert_eq!(changes.enrollment_status, Some(Some(EnrollmentStatus::Applied)));
    }

    #[tokio::test]
    async fn unknown_status_is_a_bad_request() {
        let (status, body) = rejection(json_request(r#"{"enrollment_status":"dropped"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Invalid enrollment status"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let (status, body) = rejection(json_request("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn missing_content_type_is_a_bad_request() {
        let req = axum::http::Request::builder()
            .method("PUT")
            .body(Body::from(r#"{"enrollment_status":"applied"}"#))
            .unwrap();
        let (status, _) = rejection(req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
