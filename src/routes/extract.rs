//! Request extractors that reject with the JSON envelope
//!
//! axum's stock extractors answer malformed input with plain-text bodies.
//! These wrappers keep every rejection inside [`S3ApiError`], and treat a
//! missing or non-JSON body as an empty object so that validation reports
//! the first missing field instead.

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{FromRequest, FromRequestParts, Multipart, Query, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::errors::S3ApiError;

/// JSON request body; absent or non-JSON bodies deserialize as `T::default()`
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = S3ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = has_json_content_type(req.headers());
        let body = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                S3ApiError::PayloadTooLarge(rejection.body_text())
            } else {
                S3ApiError::Validation(rejection.body_text())
            }
        })?;

        if !is_json || body.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonBody(T::default()));
        }

        serde_json::from_slice(&body)
            .map(JsonBody)
            .map_err(|e| S3ApiError::Validation(format!("Invalid JSON body: {}", e)))
    }
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .map(|mime| {
            mime.type_() == mime::APPLICATION
                && (mime.subtype() == mime::JSON || mime.suffix() == Some(mime::JSON))
        })
        .unwrap_or(false)
}

/// Query string parameters
#[derive(Debug)]
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = S3ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| QueryParams(value))
            .map_err(|rejection| S3ApiError::Validation(rejection.body_text()))
    }
}

/// A file received through a multipart form
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: String,
    pub data: Bytes,
}

/// The upload form: `bucketName`, `key` and a single `file` part
///
/// The whole file is buffered in memory. Only the first `file` part is kept;
/// a request that is not `multipart/form-data` yields an empty form.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub bucket_name: Option<String>,
    pub key: Option<String>,
    pub file: Option<UploadedFile>,
}

#[async_trait]
impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = S3ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = match Multipart::from_request(req, state).await {
            Ok(multipart) => multipart,
            Err(MultipartRejection::InvalidBoundary(_)) => return Ok(UploadForm::default()),
            Err(rejection) => return Err(S3ApiError::Validation(rejection.body_text())),
        };

        let mut form = UploadForm::default();
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => return Err(multipart_error(e)),
            };

            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("bucketName") => {
                    form.bucket_name = Some(field.text().await.map_err(multipart_error)?);
                }
                Some("key") => {
                    form.key = Some(field.text().await.map_err(multipart_error)?);
                }
                Some("file") if form.file.is_none() => {
                    let file_name = field.file_name().map(str::to_string);
                    let declared = field
                        .content_type()
                        .filter(|ct| !ct.is_empty())
                        .map(str::to_string);
                    let data = field.bytes().await.map_err(multipart_error)?;
                    let content_type = declared.unwrap_or_else(|| guess_content_type(file_name.as_deref()));
                    form.file = Some(UploadedFile {
                        file_name,
                        content_type,
                        data,
                    });
                }
                _ => {}
            }
        }

        Ok(form)
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> S3ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        S3ApiError::PayloadTooLarge(e.body_text())
    } else {
        S3ApiError::Validation(format!("Invalid multipart body: {}", e.body_text()))
    }
}

fn guess_content_type(file_name: Option<&str>) -> String {
    file_name
        .map(|name| mime_guess::from_path(name).first_or_octet_stream())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_json_content_type_detection() {
        let mut headers = HeaderMap::new();
        assert!(!has_json_content_type(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(has_json_content_type(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/merge-patch+json"),
        );
        assert!(has_json_content_type(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!has_json_content_type(&headers));
    }

    #[test]
    fn test_content_type_guess() {
        assert_eq!(guess_content_type(Some("photo.png")), "image/png");
        assert_eq!(guess_content_type(Some("blob")), "application/octet-stream");
        assert_eq!(guess_content_type(None), "application/octet-stream");
    }
}
