//! REST client for the BI server.
//!
//! Wraps the handful of authenticated calls the workflow needs: sign-in,
//! project/workbook/view listings, view-as-PDF export, and sign-out. One
//! HTTP call per invocation — no retries, no caching; transient failures are
//! reported to the caller verbatim.
//!
//! ## Why an explicit `OneOrMany` union?
//!
//! The server's XML-derived JSON collapses single-element collections into a
//! bare object: `{"projects": {"project": {...}}}` instead of
//! `{"project": [{...}]}`. Rather than duck-typing at every call site, the
//! shape is modelled once as an untagged union and normalised to a `Vec` at
//! the client boundary. Everything past this module sees canonical sequences.

use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// REST API version used for every endpoint path.
const API_VERSION: &str = "3.20";

/// Opaque credential bundle returned by [`ApiClient::authenticate`].
///
/// Attached to every subsequent call until it expires or the user signs out.
/// Expiry is not tracked here — a stale token simply makes the next call
/// fail with an API error.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Opaque auth token, sent as the `X-Tableau-Auth` header.
    pub token: String,
    /// Server-resolved site id (a LUID, distinct from the site content URL).
    pub site_id: String,
    /// Server-resolved user id.
    pub user_id: String,
}

// Manual Debug keeps the token out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("site_id", &self.site_id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// An `{id, name}` pair as returned by every listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedRef {
    pub id: String,
    pub name: String,
}

/// Client for one server + site. Cheap to construct per request.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    /// Server base URL without a trailing slash.
    server_url: String,
    /// Site content URL (short name), used only for sign-in.
    site: String,
    credentials: Option<Credentials>,
}

impl ApiClient {
    /// Create an unauthenticated client for `server_url` + `site`.
    pub fn new(
        server_url: impl Into<String>,
        site: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ReportError> {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ReportError::Internal(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            server_url,
            site: site.into(),
            credentials: None,
        })
    }

    /// Attach a previously obtained credential bundle.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/api/{}/{}", self.server_url, API_VERSION, suffix)
    }

    fn site_url(&self, suffix: &str) -> Result<String, ReportError> {
        let creds = self.creds()?;
        Ok(self.url(&format!("sites/{}/{}", creds.site_id, suffix)))
    }

    fn creds(&self) -> Result<&Credentials, ReportError> {
        self.credentials.as_ref().ok_or(ReportError::NotAuthenticated)
    }

    /// Sign in and return the credential bundle.
    ///
    /// Token storage is the caller's responsibility: this call does not
    /// mutate the client. Chain [`ApiClient::with_credentials`] to keep
    /// using the same instance.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Credentials, ReportError> {
        let url = self.url("auth/signin");
        info!("Authenticating '{}' on site '{}'", username, self.site);

        let payload = serde_json::json!({
            "credentials": {
                "name": username,
                "password": password,
                "site": { "contentUrl": self.site }
            }
        });

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| network_error(&url, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let detail = extract_error_detail(response).await;
            return Err(ReportError::Auth {
                detail: format!("HTTP {status}: {detail}"),
            });
        }

        let body: SignInResponse = response
            .json()
            .await
            .map_err(|e| ReportError::Auth {
                detail: format!("malformed sign-in response: {e}"),
            })?;

        info!(
            "Authenticated '{}' (site id {})",
            username, body.credentials.site.id
        );
        Ok(Credentials {
            token: body.credentials.token,
            site_id: body.credentials.site.id,
            user_id: body.credentials.user.id,
        })
    }

    /// List all projects visible to the authenticated user.
    pub async fn list_projects(&self) -> Result<Vec<NamedRef>, ReportError> {
        let url = self.site_url("projects")?;
        let body: ProjectsEnvelope = self.get_json(&url).await?;
        let projects = body
            .projects
            .and_then(|p| p.project)
            .map(OneOrMany::into_vec)
            .unwrap_or_default();
        debug!("Retrieved {} projects", projects.len());
        Ok(projects)
    }

    /// List workbooks belonging to the named project.
    ///
    /// The project name is matched case-insensitively against
    /// [`ApiClient::list_projects`]. An unknown name yields an **empty
    /// sequence**, not an error — the UI treats it as "nothing to show".
    /// The server offers no by-project filter, so the full workbook
    /// collection is filtered client-side by project id.
    pub async fn list_workbooks_in_project(
        &self,
        project_name: &str,
    ) -> Result<Vec<NamedRef>, ReportError> {
        let projects = self.list_projects().await?;
        let Some(project_id) = projects
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(project_name))
            .map(|p| p.id.clone())
        else {
            warn!("Project '{}' not found", project_name);
            return Ok(Vec::new());
        };

        let url = self.site_url("workbooks")?;
        let body: WorkbooksEnvelope = self.get_json(&url).await?;
        let workbooks: Vec<NamedRef> = body
            .workbooks
            .and_then(|w| w.workbook)
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
            .into_iter()
            .filter(|wb| wb.project.as_ref().is_some_and(|p| p.id == project_id))
            .map(|wb| NamedRef {
                id: wb.id,
                name: wb.name,
            })
            .collect();

        debug!(
            "Retrieved {} workbooks for project '{}'",
            workbooks.len(),
            project_name
        );
        Ok(workbooks)
    }

    /// List views (dashboards/sheets) inside a workbook.
    pub async fn list_views_in_workbook(
        &self,
        workbook_id: &str,
    ) -> Result<Vec<NamedRef>, ReportError> {
        let url = self.site_url(&format!("workbooks/{workbook_id}/views"))?;
        let body: ViewsEnvelope = self.get_json(&url).await?;
        let views = body
            .views
            .and_then(|v| v.view)
            .map(OneOrMany::into_vec)
            .unwrap_or_default();
        debug!("Retrieved {} views for workbook {}", views.len(), workbook_id);
        Ok(views)
    }

    /// Export a view as PDF and return the raw payload.
    ///
    /// Synchronous from the workflow's point of view: the full body is read
    /// into memory. Dashboard exports are single pages, small enough that
    /// streaming would buy nothing.
    pub async fn export_view_as_pdf(&self, view_id: &str) -> Result<Vec<u8>, ReportError> {
        let url = self.site_url(&format!("views/{view_id}/pdf"))?;
        let token = self.creds()?.token.clone();

        let response = self
            .http
            .get(&url)
            .header("X-Tableau-Auth", token)
            .send()
            .await
            .map_err(|e| network_error(&url, e))?;

        let response = check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| network_error(&url, e))?;

        info!("Exported view {} as PDF ({} bytes)", view_id, bytes.len());
        Ok(bytes.to_vec())
    }

    /// Invalidate the token on the server. Best effort: a failure is logged,
    /// never raised, and the local credential state is cleared regardless.
    pub async fn sign_out(&mut self) {
        let Some(creds) = self.credentials.take() else {
            return;
        };
        let url = self.url("auth/signout");

        let result = self
            .http
            .post(&url)
            .header("X-Tableau-Auth", &creds.token)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => info!("Signed out"),
            Ok(resp) => warn!("Sign-out returned HTTP {}", resp.status()),
            Err(e) => warn!("Sign-out failed: {}", e),
        }
    }

    /// Authenticated GET returning a deserialised JSON body.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ReportError> {
        let token = self.creds()?.token.clone();
        let response = self
            .http
            .get(url)
            .header("X-Tableau-Auth", token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| network_error(url, e))?;

        let response = check_status(response).await?;
        response.json().await.map_err(|e| ReportError::Api {
            status: 200,
            detail: format!("malformed response body: {e}"),
        })
    }
}

/// Map a reqwest transport error to [`ReportError::Network`].
fn network_error(url: &str, e: reqwest::Error) -> ReportError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    };
    ReportError::Network {
        url: url.to_string(),
        reason,
    }
}

/// Turn a non-2xx response into [`ReportError::Api`], extracting the
/// server's structured error detail when present.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ReportError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let detail = extract_error_detail(response).await;
    Err(ReportError::Api { status, detail })
}

/// Pull `error.detail` (else `error.summary`, else the raw text) from an
/// error response body.
async fn extract_error_detail(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    if let Ok(body) = serde_json::from_str::<ApiErrorEnvelope>(&text) {
        if let Some(detail) = body.error.detail.filter(|d| !d.is_empty()) {
            return detail;
        }
        if let Some(summary) = body.error.summary.filter(|s| !s.is_empty()) {
            return summary;
        }
    }
    if text.is_empty() {
        "no error detail provided".to_string()
    } else {
        text
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

/// Either a single `T` or a collection of them.
///
/// The explicit normalisation step for the server's object-or-array shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    /// Canonicalise to a sequence; a single object becomes a one-element Vec.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Deserialize)]
struct SignInResponse {
    credentials: SignInCredentials,
}

#[derive(Deserialize)]
struct SignInCredentials {
    token: String,
    site: IdRef,
    user: IdRef,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Deserialize)]
struct ProjectsEnvelope {
    projects: Option<ProjectList>,
}

#[derive(Deserialize)]
struct ProjectList {
    project: Option<OneOrMany<NamedRef>>,
}

#[derive(Deserialize)]
struct WorkbooksEnvelope {
    workbooks: Option<WorkbookList>,
}

#[derive(Deserialize)]
struct WorkbookList {
    workbook: Option<OneOrMany<WorkbookItem>>,
}

/// A workbook entry; carries its project ref for client-side filtering.
#[derive(Debug, Deserialize)]
struct WorkbookItem {
    id: String,
    name: String,
    project: Option<IdRef>,
}

#[derive(Deserialize)]
struct ViewsEnvelope {
    views: Option<ViewList>,
}

#[derive(Deserialize)]
struct ViewList {
    view: Option<OneOrMany<NamedRef>>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    summary: Option<String>,
    detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_or_many_normalises_single_object() {
        let json = r#"{"projects": {"project": {"id": "p1", "name": "Default"}}}"#;
        let env: ProjectsEnvelope = serde_json::from_str(json).unwrap();
        let projects = env.projects.unwrap().project.unwrap().into_vec();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "Default");
    }

    #[test]
    fn one_or_many_passes_arrays_through() {
        let json = r#"{"projects": {"project": [
            {"id": "p1", "name": "A"}, {"id": "p2", "name": "B"}
        ]}}"#;
        let env: ProjectsEnvelope = serde_json::from_str(json).unwrap();
        let projects = env.projects.unwrap().project.unwrap().into_vec();
        assert_eq!(projects.len(), 2);
    }

    #[test]
    fn empty_envelope_is_no_projects() {
        let env: ProjectsEnvelope = serde_json::from_str("{}").unwrap();
        assert!(env.projects.is_none());
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let c = Credentials {
            token: "very-secret".into(),
            site_id: "s".into(),
            user_id: "u".into(),
        };
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("very-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn error_envelope_prefers_detail() {
        let json = r#"{"error": {"summary": "Signin Error", "detail": "Bad password"}}"#;
        let env: ApiErrorEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.error.detail.as_deref(), Some("Bad password"));
    }

    #[tokio::test]
    async fn calls_without_credentials_are_rejected() {
        let client = ApiClient::new("https://bi.example.com", "acme", 5).unwrap();
        let err = client.list_projects().await.unwrap_err();
        assert!(matches!(err, ReportError::NotAuthenticated));
    }
}
