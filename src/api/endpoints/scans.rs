//! Scan endpoints.
//!
//! - `POST /api/scans` — upload an eye photo and run the pipeline
//! - `GET /api/scans` — list scans, newest first
//! - `GET /api/scans/:id` — one scan

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthedUser};
use crate::db::repository;
use crate::models::Scan;
use crate::pipeline::{ingest_scan, ScanUpload};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    #[serde(flatten)]
    pub scan: Scan,
    /// True when the crop service was down and the whole photo was
    /// classified instead of the conjunctiva crop.
    pub degraded_crop: bool,
}

/// `POST /api/scans` — ingest one uploaded photo.
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(_authed): Extension<AuthedUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ScanResponse>), ApiError> {
    let mut upload: Option<ScanUpload> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("image") {
            let filename = field.file_name().unwrap_or("scan.jpg").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
            upload = Some(ScanUpload {
                filename,
                bytes: bytes.to_vec(),
            });
        }
    }
    let upload = upload.ok_or_else(|| ApiError::BadRequest("Missing 'image' field".into()))?;

    let outcome = tokio::task::spawn_blocking(move || {
        let conn = ctx.open_db()?;
        ingest_scan(&conn, &ctx.store, ctx.inference.as_ref(), &upload)
            .map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("ingest task failed: {e}")))??;

    Ok((
        StatusCode::CREATED,
        Json(ScanResponse {
            scan: outcome.scan,
            degraded_crop: outcome.degraded_crop,
        }),
    ))
}

/// `GET /api/scans` — all scans, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(_authed): Extension<AuthedUser>,
) -> Result<Json<Vec<Scan>>, ApiError> {
    let scans = tokio::task::spawn_blocking(move || -> Result<Vec<Scan>, ApiError> {
        let conn = ctx.open_db()?;
        Ok(repository::get_all_scans(&conn)?)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("list task failed: {e}")))??;
    Ok(Json(scans))
}

/// `GET /api/scans/:id` — one scan by id.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(_authed): Extension<AuthedUser>,
    Path(scan_id): Path<String>,
) -> Result<Json<Scan>, ApiError> {
    let scan = tokio::task::spawn_blocking(move || -> Result<Scan, ApiError> {
        let conn = ctx.open_db()?;
        repository::get_scan(&conn, &scan_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Scan not found: {scan_id}")))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("detail task failed: {e}")))??;
    Ok(Json(scan))
}
