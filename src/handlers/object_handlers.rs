//! HTTP handlers for storing and fetching objects by hash.
//! GET streams the payload from disk; PUT buffers the body so its SHA-256
//! can be verified before anything is written.

use crate::{
    errors::AppError,
    models::object::ObjectRecord,
    services::storage_service::StorageService,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use tokio_util::io::ReaderStream;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// PUT `/{hash}` — store the request body under its claimed hash.
pub async fn put_object(
    State(service): State<StorageService>,
    Path(hash): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let declared_len = declared_content_length(&headers)?;
    service.put_object(&hash, body, declared_len).await?;
    Ok(Json(true))
}

/// GET `/{hash}` — stream the stored payload with an exact length.
pub async fn get_object(
    State(service): State<StorageService>,
    Path(hash): Path<String>,
) -> Result<Response, AppError> {
    let (record, file) = service.get_object_reader(&hash).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &record);
    Ok(response)
}

fn declared_content_length(headers: &HeaderMap) -> Result<u64, AppError> {
    let value = headers
        .get(header::CONTENT_LENGTH)
        .ok_or_else(|| AppError::new(StatusCode::LENGTH_REQUIRED, "content-length required"))?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| AppError::bad_request("content-length invalid"))
}

fn set_object_headers(headers: &mut HeaderMap, record: &ObjectRecord) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(record.size));
    if let Ok(value) = HeaderValue::from_str(&http_date(record.created_at)) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http_date(record.expires_at)) {
        headers.insert(header::EXPIRES, value);
    }
}

fn http_date(ts: DateTime<Utc>) -> String {
    ts.format(HTTP_DATE_FORMAT).to_string()
}
