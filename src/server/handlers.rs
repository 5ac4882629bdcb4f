//! Request handlers for the report-builder API.
//!
//! Handlers are thin: they resolve the session, delegate to the client or
//! the pipeline, and update the session store. All domain rules (slot
//! guards, the combine gate, crop clamping) live in the library modules.

use super::types::*;
use super::AppState;
use crate::cleanup::schedule_removal;
use crate::client::{ApiClient, Credentials};
use crate::config::AppConfig;
use crate::error::ReportError;
use crate::pipeline::{
    self, merge_to_document, merge_to_pdf, rasterize_first_page, THUMB_MAX_HEIGHT,
    THUMB_MAX_WIDTH,
};
use crate::session::{Session, SessionCredentials};
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Header carrying the session id on every authenticated request.
pub const SESSION_HEADER: &str = "x-session-id";

/// Slots per report. Twelve two-per-page dashboards is already a six-page
/// report; anything larger is a sign the caller wants something else.
const MAX_SLOTS: usize = 12;

// ── Auth ─────────────────────────────────────────────────────────────────

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let server_url = req
        .server_url
        .clone()
        .unwrap_or_else(|| state.config.default_server_url.clone());

    let client = ApiClient::new(&server_url, &req.site, state.config.http_timeout_secs)?;
    let creds = client.authenticate(&req.username, &req.password).await?;

    let session = Session::new(SessionCredentials {
        token: creds.token,
        site_id: creds.site_id,
        user_id: creds.user_id,
        server_url,
        site: req.site.clone(),
        username: req.username.clone(),
    });
    let session_id = state.store.insert(session).await;
    info!("Session {} opened for '{}'", session_id, req.username);

    Ok(Json(LoginResponse {
        session_id,
        username: req.username,
        site: req.site,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<StatusMessage>> {
    let id = session_id(&headers)?;
    let session = state
        .store
        .remove(&id)
        .await
        .ok_or(ReportError::UnknownSession)?;

    if let Some(handle) = state.cleanups.lock().await.remove(&id) {
        handle.cancel();
    }

    let mut client = client_for(&session.credentials, &state.config)?;
    client.sign_out().await;

    remove_files(&session.intermediate_files()).await;
    info!("Session {} closed", id);
    Ok(Json(StatusMessage {
        message: "Signed out".to_string(),
    }))
}

// ── Listings ─────────────────────────────────────────────────────────────

pub async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ProjectsResponse>> {
    let client = session_client(&state, &headers).await?;
    let projects = client.list_projects().await?;
    Ok(Json(ProjectsResponse { projects }))
}

pub async fn list_workbooks(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(project_name): UrlPath<String>,
) -> ApiResult<Json<WorkbooksResponse>> {
    let client = session_client(&state, &headers).await?;
    let workbooks = client.list_workbooks_in_project(&project_name).await?;
    Ok(Json(WorkbooksResponse { workbooks }))
}

pub async fn list_views(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(workbook_id): UrlPath<String>,
) -> ApiResult<Json<ViewsResponse>> {
    let client = session_client(&state, &headers).await?;
    let views = client.list_views_in_workbook(&workbook_id).await?;
    Ok(Json(ViewsResponse { views }))
}

// ── Workflow ─────────────────────────────────────────────────────────────

pub async fn set_slots(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SlotCountRequest>,
) -> ApiResult<Json<SessionStatusResponse>> {
    if req.count == 0 || req.count > MAX_SLOTS {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Slot count must be 1–{MAX_SLOTS}, got {}", req.count),
        ));
    }
    let id = session_id(&headers)?;

    let (orphans, status) = state
        .store
        .with_mut(&id, |s| {
            let orphans = s.set_slot_count(req.count);
            (orphans, SessionStatusResponse::from_session(s))
        })
        .await?;
    remove_files(&orphans).await;
    Ok(Json(status))
}

pub async fn export(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ExportRequest>,
) -> ApiResult<Json<ExportResponse>> {
    let id = session_id(&headers)?;
    // Validate the slot index before talking to the BI server.
    state
        .store
        .with(&id, |s| s.slot(req.slot).map(|_| ()))
        .await??;

    let client = session_client(&state, &headers).await?;
    let pdf = client.export_view_as_pdf(&req.view_id).await?;

    let filename = format!("dashboard_{}_{}.pdf", req.slot, Utc::now().timestamp_millis());
    let pdf_path = state.config.upload_dir.join(filename);
    tokio::fs::write(&pdf_path, &pdf)
        .await
        .map_err(|e| ReportError::io(pdf_path.clone(), e))?;

    let image_path = rasterize_first_page(&pdf_path, state.config.dpi).await?;

    let orphans = state
        .store
        .with_mut(&id, |s| {
            s.slot_mut(req.slot).map(|slot| {
                slot.record_export(
                    req.project_name.clone(),
                    req.workbook_name.clone(),
                    req.view_name.clone(),
                    req.view_id.clone(),
                    pdf_path.clone(),
                    image_path.clone(),
                )
            })
        })
        .await??;
    remove_files(&orphans).await;

    Ok(Json(ExportResponse {
        slot: req.slot,
        image: file_name(&image_path),
    }))
}

pub async fn crop(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CropRequest>,
) -> ApiResult<Json<CropResponse>> {
    let id = session_id(&headers)?;
    let image_path = state
        .store
        .with(&id, |s| {
            s.slot(req.slot).and_then(|slot| {
                slot.image_path
                    .clone()
                    .ok_or(ReportError::SlotNotExported { index: req.slot })
            })
        })
        .await??;

    let rect = req.rect;
    let (cropped_path, thumb_path) =
        tokio::task::spawn_blocking(move || -> Result<(PathBuf, PathBuf), ReportError> {
            let cropped = pipeline::crop(&image_path, rect)?;
            let thumb = pipeline::thumbnail(&cropped, THUMB_MAX_WIDTH, THUMB_MAX_HEIGHT)?;
            Ok((cropped, thumb))
        })
        .await
        .map_err(|e| ReportError::Internal(format!("Crop task panicked: {e}")))??;

    let stale = state
        .store
        .with_mut(&id, |s| {
            s.slot_mut(req.slot)
                .map(|slot| slot.record_crop(cropped_path.clone(), thumb_path.clone()))
        })
        .await??;
    // A re-crop of the same image produces the same output names; only
    // delete what the slot no longer references.
    let stale: Vec<PathBuf> = stale
        .into_iter()
        .filter(|p| *p != cropped_path && *p != thumb_path)
        .collect();
    remove_files(&stale).await;

    Ok(Json(CropResponse {
        slot: req.slot,
        cropped: file_name(&cropped_path),
        thumbnail: file_name(&thumb_path),
    }))
}

pub async fn combine(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CombineRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = session_id(&headers)?;
    let (paths, summaries) = state
        .store
        .with(&id, |s| {
            s.require_all_cropped()
                .map(|()| (s.cropped_paths(), s.summaries()))
        })
        .await??;

    let output_dir = state.config.output_dir.clone();
    let base_name = report_base_name(req.name.as_deref());
    let format = req.format;
    let artifact = tokio::task::spawn_blocking(move || match format {
        OutputFormat::Pdf => merge_to_pdf(&paths, &output_dir, &base_name),
        OutputFormat::Docx => merge_to_document(&paths, &output_dir, &base_name, &summaries),
    })
    .await
    .map_err(|e| ReportError::Internal(format!("Combine task panicked: {e}")))??;

    let intermediates = state
        .store
        .with_mut(&id, |s| {
            s.last_artifact = Some(artifact.clone());
            s.slots.iter().flat_map(|slot| slot.files()).collect::<Vec<_>>()
        })
        .await?;

    // Replace any pending sweep so the two never race over the same files.
    let handle = schedule_removal(
        intermediates,
        Duration::from_secs(state.config.cleanup_delay_secs),
    );
    if let Some(old) = state.cleanups.lock().await.insert(id.clone(), handle) {
        old.cancel();
    }

    serve_file(&artifact).await
}

pub async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let id = session_id(&headers)?;
    let artifact = state
        .store
        .with(&id, |s| s.last_artifact.clone())
        .await?
        .ok_or_else(|| {
            ApiError::new(StatusCode::NOT_FOUND, "No combined report available yet")
        })?;
    serve_file(&artifact).await
}

pub async fn reset(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<StatusMessage>> {
    let id = session_id(&headers)?;
    let orphans = state.store.with_mut(&id, |s| s.reset()).await?;

    if let Some(handle) = state.cleanups.lock().await.remove(&id) {
        handle.cancel();
    }
    remove_files(&orphans).await;

    info!("Session {} reset", id);
    Ok(Json(StatusMessage {
        message: "Session reset".to_string(),
    }))
}

pub async fn session_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionStatusResponse>> {
    let id = session_id(&headers)?;
    let status = state
        .store
        .with(&id, SessionStatusResponse::from_session)
        .await?;
    Ok(Json(status))
}

/// Serve a working image (full-size, cropped, or thumbnail) by filename.
pub async fn serve_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(filename): UrlPath<String>,
) -> ApiResult<impl IntoResponse> {
    // Authenticated, and confined to the upload directory.
    let _ = session_id(&headers)?;
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "Invalid image filename",
        ));
    }

    let path = state.config.upload_dir.join(&filename);
    let bytes = tokio::fs::read(&path).await.map_err(|_| {
        ApiError::new(StatusCode::NOT_FOUND, format!("No such image: {filename}"))
    })?;
    Ok(([(header::CONTENT_TYPE, "image/png".to_string())], bytes))
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn session_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ReportError::UnknownSession.into())
}

/// Rebuild an authenticated [`ApiClient`] from stored session credentials.
fn client_for(creds: &SessionCredentials, config: &AppConfig) -> Result<ApiClient, ReportError> {
    Ok(
        ApiClient::new(&creds.server_url, &creds.site, config.http_timeout_secs)?
            .with_credentials(Credentials {
                token: creds.token.clone(),
                site_id: creds.site_id.clone(),
                user_id: creds.user_id.clone(),
            }),
    )
}

async fn session_client(state: &AppState, headers: &HeaderMap) -> Result<ApiClient, ApiError> {
    let id = session_id(headers)?;
    let creds = state.store.with(&id, |s| s.credentials.clone()).await?;
    Ok(client_for(&creds, &state.config)?)
}

async fn serve_file(path: &Path) -> ApiResult<impl IntoResponse> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ReportError::io(path.to_path_buf(), e))?;
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    };
    let disposition = format!("attachment; filename=\"{}\"", file_name(path));
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {e}", path.display()),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Clean a user-chosen report name: strip a `.pdf`/`.docx` extension and
/// any path components; blank input falls back to a default.
fn report_base_name(name: Option<&str>) -> String {
    let cleaned = name
        .unwrap_or_default()
        .trim()
        .trim_end_matches(".pdf")
        .trim_end_matches(".docx")
        .replace(['/', '\\'], "_");
    if cleaned.is_empty() {
        "dashboard_report".to_string()
    } else {
        cleaned
    }
}
