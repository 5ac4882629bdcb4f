//! Request/response bodies for the HTTP surface, plus the error mapping.

use crate::error::ReportError;
use crate::pipeline::CropRect;
use crate::session::{Session, SlotState};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Uniform error body: `{"error": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A [`ReportError`] mapped onto an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        let status = match &err {
            // The caller needs to (re-)authenticate.
            ReportError::Auth { .. }
            | ReportError::NotAuthenticated
            | ReportError::UnknownSession => StatusCode::UNAUTHORIZED,
            // The request itself is at fault.
            ReportError::InvalidCrop { .. }
            | ReportError::IncompleteWorkflow { .. }
            | ReportError::SlotOutOfRange { .. }
            | ReportError::SlotNotExported { .. }
            | ReportError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            // The BI server is at fault.
            ReportError::Network { .. } | ReportError::Api { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// ── Auth ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Site content URL (the short name in the site's URL).
    pub site: String,
    /// Overrides the configured default BI server when present.
    pub server_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub session_id: String,
    pub username: String,
    pub site: String,
}

// ── Listings ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectsResponse {
    pub projects: Vec<crate::client::NamedRef>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkbooksResponse {
    pub workbooks: Vec<crate::client::NamedRef>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewsResponse {
    pub views: Vec<crate::client::NamedRef>,
}

// ── Workflow ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SlotCountRequest {
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub slot: usize,
    pub project_name: String,
    pub workbook_id: String,
    pub workbook_name: String,
    pub view_id: String,
    pub view_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportResponse {
    pub slot: usize,
    /// Filename of the rasterised image, fetchable via the images endpoint.
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct CropRequest {
    pub slot: usize,
    #[serde(flatten)]
    pub rect: CropRect,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CropResponse {
    pub slot: usize,
    pub cropped: String,
    pub thumbnail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pdf,
    Docx,
}

#[derive(Debug, Deserialize)]
pub struct CombineRequest {
    pub format: OutputFormat,
    /// Report filename chosen by the user; a `.pdf`/`.docx` extension is
    /// stripped, blank falls back to a default.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

// ── Session status ───────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct SlotStatus {
    pub index: usize,
    pub state: SlotState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workbook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub username: String,
    pub slots: Vec<SlotStatus>,
    pub ready_to_combine: bool,
}

impl SessionStatusResponse {
    pub fn from_session(session: &Session) -> Self {
        let file_name = |p: &Option<std::path::PathBuf>| {
            p.as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
        };
        Self {
            session_id: session.id.clone(),
            username: session.credentials.username.clone(),
            ready_to_combine: session.require_all_cropped().is_ok(),
            slots: session
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| SlotStatus {
                    index,
                    state: slot.state(),
                    project: slot.project_name.clone(),
                    workbook: slot.workbook_name.clone(),
                    dashboard: slot.dashboard_name.clone(),
                    image: file_name(&slot.image_path),
                    thumbnail: file_name(&slot.thumb_path),
                    exported_at: slot
                        .exported_at
                        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string()),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_401() {
        let e: ApiError = ReportError::UnknownSession.into();
        assert_eq!(e.status, StatusCode::UNAUTHORIZED);
        let e: ApiError = ReportError::NotAuthenticated.into();
        assert_eq!(e.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn workflow_guards_map_to_400() {
        let e: ApiError = ReportError::IncompleteWorkflow { missing: vec![1] }.into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        let e: ApiError = ReportError::SlotNotExported { index: 0 }.into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_errors_map_to_502() {
        let e: ApiError = ReportError::Api {
            status: 404,
            detail: "gone".into(),
        }
        .into();
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn crop_request_flattens_rect() {
        let json = r#"{"slot": 1, "x": 10.0, "y": 5.5, "width": 200.0, "height": 100.0}"#;
        let req: CropRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.slot, 1);
        assert_eq!(req.rect.width, 200.0);
    }

    #[test]
    fn slot_status_round_trips_through_json() {
        let status = SlotStatus {
            index: 2,
            state: SlotState::Exported,
            project: Some("Finance".into()),
            workbook: None,
            dashboard: None,
            image: Some("dashboard_2.png".into()),
            thumbnail: None,
            exported_at: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains(r#""state":"exported""#));
        let back: SlotStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state, SlotState::Exported);
        assert_eq!(back.index, 2);
    }

    #[test]
    fn output_format_is_lowercase() {
        let f: OutputFormat = serde_json::from_str(r#""docx""#).unwrap();
        assert_eq!(f, OutputFormat::Docx);
    }
}
