//! Shared request validation: every JSON body goes through [`ValidatedJson`],
//! path and query parameters through [`ApiPath`] and [`ApiQuery`].

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use time::OffsetDateTime;
use validator::Validate;

use crate::error::ApiError;

/// JSON body that has passed `validator` rules. Unknown properties are dropped.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// `Path` whose rejection is rendered as a JSON [`ApiError`].
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(ApiPath(value))
    }
}

/// `Query` whose rejection is rendered as a JSON [`ApiError`].
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

/// Deserializes a nullable field so that an absent key (`None`), an explicit
/// `null` (`Some(None)`) and a value (`Some(Some(v))`) stay distinct.
/// Use together with `#[serde(default)]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// [`nullable`] for RFC 3339 timestamps.
pub fn nullable_rfc3339<'de, D>(deserializer: D) -> Result<Option<Option<OffsetDateTime>>, D::Error>
where
    D: Deserializer<'de>,
{
    time::serde::rfc3339::option::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, response::IntoResponse};

    #[derive(Debug, Deserialize, Validate)]
    struct Sample {
        #[validate(length(min = 2, message = "too short"))]
        name: String,
        #[serde(default, deserialize_with = "nullable")]
        nick: Option<Option<String>>,
        #[serde(default, deserialize_with = "nullable_rfc3339")]
        seen: Option<Option<OffsetDateTime>>,
    }

    async fn extract(body: &'static str, content_type: &str) -> Result<Sample, ApiError> {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap();
        ValidatedJson::<Sample>::from_request(req, &())
            .await
            .map(|ValidatedJson(p)| p)
    }

    #[tokio::test]
    async fn absent_null_and_value_are_distinct() {
        let p = extract(r#"{"name":"ab"}"#, "application/json").await.unwrap();
        assert_eq!(p.nick, None);
        assert_eq!(p.seen, None);

        let p = extract(r#"{"name":"ab","nick":null,"seen":null}"#, "application/json")
            .await
            .unwrap();
        assert_eq!(p.nick, Some(None));
        assert_eq!(p.seen, Some(None));

        let p = extract(
            r#"{"name":"ab","nick":"x","seen":"2024-01-02T03:04:05Z"}"#,
            "application/json",
        )
        .await
        .unwrap();
        assert_eq!(p.nick, Some(Some("x".to_string())));
        assert_eq!(p.seen.flatten().map(|t| t.year()), Some(2024));
    }

    #[tokio::test]
    async fn unknown_fields_are_ignored() {
        let p = extract(r#"{"name":"ab","role":"admin"}"#, "application/json")
            .await
            .unwrap();
        assert_eq!(p.name, "ab");
    }

    #[tokio::test]
    async fn rule_failure_is_unprocessable() {
        let err = extract(r#"{"name":"a"}"#, "application/json").await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn wrong_types_are_unprocessable() {
        let err = extract(r#"{"name":"ab","seen":"yesterday"}"#, "application/json")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let err = extract(r#"{"name":12}"#, "application/json").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn oversized_body_is_payload_too_large() {
        // past axum's default 2 MiB limit
        let body = vec![b' '; 3 * 1024 * 1024];
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let err = ValidatedJson::<Sample>::from_request(req, &())
            .await
            .map(|_| ())
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn malformed_json_and_content_type() {
        let err = extract(r#"{"name":"#, "application/json").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = extract(r#"{"name":"ab"}"#, "text/plain").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
