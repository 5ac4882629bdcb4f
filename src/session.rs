//! Session state: slots, the workflow state machine, and the shared store.
//!
//! A [`Session`] is one user's workflow: a credential bundle obtained at
//! login plus an ordered vector of [`WorkbookSlot`]s. Each slot advances
//! through `Empty → Exported → Cropped`; combining requires every slot to
//! be `Cropped`. The state is never stored as an enum field — it is derived
//! from which artifacts the slot holds, so it cannot drift out of sync with
//! the files on disk.
//!
//! [`SessionStore`] is the only shared mutable state in the service. All
//! access goes through closures run under its `RwLock`, which keeps each
//! read-modify-write atomic without handing lock guards across `await`
//! points.

use crate::error::ReportError;
use crate::pipeline::SlotSummary;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Derived workflow state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Empty,
    Exported,
    Cropped,
}

/// One dashboard position in the report.
#[derive(Debug, Clone, Default)]
pub struct WorkbookSlot {
    pub project_name: Option<String>,
    pub workbook_name: Option<String>,
    pub dashboard_name: Option<String>,
    pub view_id: Option<String>,
    pub pdf_path: Option<PathBuf>,
    pub image_path: Option<PathBuf>,
    pub cropped_path: Option<PathBuf>,
    pub thumb_path: Option<PathBuf>,
    pub exported_at: Option<DateTime<Utc>>,
}

impl WorkbookSlot {
    pub fn state(&self) -> SlotState {
        if self.cropped_path.is_some() {
            SlotState::Cropped
        } else if self.image_path.is_some() {
            SlotState::Exported
        } else {
            SlotState::Empty
        }
    }

    /// Record a fresh export into this slot.
    ///
    /// Any previous artifacts become stale and are returned so the caller
    /// can delete them; a re-export always resets the slot to `Exported`,
    /// discarding an earlier crop rather than pairing it with the new image.
    pub fn record_export(
        &mut self,
        project_name: String,
        workbook_name: String,
        dashboard_name: String,
        view_id: String,
        pdf_path: PathBuf,
        image_path: PathBuf,
    ) -> Vec<PathBuf> {
        let orphans = self.take_files();
        self.project_name = Some(project_name);
        self.workbook_name = Some(workbook_name);
        self.dashboard_name = Some(dashboard_name);
        self.view_id = Some(view_id);
        self.pdf_path = Some(pdf_path);
        self.image_path = Some(image_path);
        self.exported_at = Some(Utc::now());
        orphans
    }

    /// Record a crop result. Replaces an earlier crop; its files are
    /// returned for deletion.
    pub fn record_crop(&mut self, cropped_path: PathBuf, thumb_path: PathBuf) -> Vec<PathBuf> {
        let mut stale = Vec::new();
        stale.extend(self.cropped_path.take());
        stale.extend(self.thumb_path.take());
        self.cropped_path = Some(cropped_path);
        self.thumb_path = Some(thumb_path);
        stale
    }

    /// Detach every file path this slot holds, leaving it empty.
    pub fn take_files(&mut self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        files.extend(self.pdf_path.take());
        files.extend(self.image_path.take());
        files.extend(self.cropped_path.take());
        files.extend(self.thumb_path.take());
        self.exported_at = None;
        files
    }

    /// All file paths currently attached, without detaching them.
    pub fn files(&self) -> Vec<PathBuf> {
        [
            &self.pdf_path,
            &self.image_path,
            &self.cropped_path,
            &self.thumb_path,
        ]
        .into_iter()
        .filter_map(|p| p.clone())
        .collect()
    }
}

/// Credential bundle held by a session after sign-in.
#[derive(Clone)]
pub struct SessionCredentials {
    pub token: String,
    pub site_id: String,
    pub user_id: String,
    pub server_url: String,
    pub site: String,
    pub username: String,
}

// Tokens must never reach the logs.
impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("token", &"<redacted>")
            .field("site_id", &self.site_id)
            .field("user_id", &self.user_id)
            .field("server_url", &self.server_url)
            .field("site", &self.site)
            .field("username", &self.username)
            .finish()
    }
}

/// One user's workflow state.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub credentials: SessionCredentials,
    pub slots: Vec<WorkbookSlot>,
    /// Path of the most recent combined artifact, for the download endpoint.
    pub last_artifact: Option<PathBuf>,
}

impl Session {
    pub fn new(credentials: SessionCredentials) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            credentials,
            slots: Vec::new(),
            last_artifact: None,
        }
    }

    /// Replace the slot vector with `count` empty slots.
    ///
    /// Changing the count mid-workflow discards all progress; returns the
    /// orphaned files.
    pub fn set_slot_count(&mut self, count: usize) -> Vec<PathBuf> {
        let mut orphans: Vec<PathBuf> = Vec::new();
        for slot in &mut self.slots {
            orphans.extend(slot.take_files());
        }
        self.slots = (0..count).map(|_| WorkbookSlot::default()).collect();
        orphans
    }

    pub fn slot(&self, index: usize) -> Result<&WorkbookSlot, ReportError> {
        self.slots.get(index).ok_or(ReportError::SlotOutOfRange {
            index,
            count: self.slots.len(),
        })
    }

    pub fn slot_mut(&mut self, index: usize) -> Result<&mut WorkbookSlot, ReportError> {
        let count = self.slots.len();
        self.slots
            .get_mut(index)
            .ok_or(ReportError::SlotOutOfRange { index, count })
    }

    /// The combine gate: every slot must be `Cropped`.
    pub fn require_all_cropped(&self) -> Result<(), ReportError> {
        if self.slots.is_empty() {
            return Err(ReportError::IncompleteWorkflow { missing: vec![] });
        }
        let missing: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state() != SlotState::Cropped)
            .map(|(i, _)| i)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ReportError::IncompleteWorkflow { missing })
        }
    }

    /// Cropped image paths in slot order. Only meaningful after
    /// [`require_all_cropped`](Self::require_all_cropped) passed.
    pub fn cropped_paths(&self) -> Vec<PathBuf> {
        self.slots
            .iter()
            .filter_map(|s| s.cropped_path.clone())
            .collect()
    }

    /// Per-slot metadata for the Word report, in slot order.
    pub fn summaries(&self) -> Vec<SlotSummary> {
        self.slots
            .iter()
            .map(|s| SlotSummary {
                project: s.project_name.clone().unwrap_or_default(),
                workbook: s.workbook_name.clone().unwrap_or_default(),
                dashboard: s.dashboard_name.clone().unwrap_or_default(),
                exported_at: s
                    .exported_at
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Every intermediate file the session references, slot files plus the
    /// last combined artifact.
    pub fn intermediate_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.slots.iter().flat_map(|s| s.files()).collect();
        files.extend(self.last_artifact.clone());
        files
    }

    /// Clear all slots and the artifact pointer, keeping the credentials so
    /// the user can start a new report without signing in again. Returns the
    /// orphaned files.
    pub fn reset(&mut self) -> Vec<PathBuf> {
        let mut orphans = self.intermediate_files();
        for slot in &mut self.slots {
            orphans.extend(slot.take_files());
        }
        self.slots.clear();
        self.last_artifact = None;
        orphans.sort();
        orphans.dedup();
        orphans
    }
}

/// Shared map of session id → [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session, returning its id.
    pub async fn insert(&self, session: Session) -> String {
        let id = session.id.clone();
        self.inner.write().await.insert(id.clone(), session);
        id
    }

    /// Run `f` with a shared borrow of the session.
    pub async fn with<R>(
        &self,
        id: &str,
        f: impl FnOnce(&Session) -> R,
    ) -> Result<R, ReportError> {
        let guard = self.inner.read().await;
        let session = guard.get(id).ok_or(ReportError::UnknownSession)?;
        Ok(f(session))
    }

    /// Run `f` with a mutable borrow of the session.
    pub async fn with_mut<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, ReportError> {
        let mut guard = self.inner.write().await;
        let session = guard.get_mut(id).ok_or(ReportError::UnknownSession)?;
        Ok(f(session))
    }

    /// Remove and return the session, if present.
    pub async fn remove(&self, id: &str) -> Option<Session> {
        self.inner.write().await.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_credentials() -> SessionCredentials {
        SessionCredentials {
            token: "secret-token".into(),
            site_id: "site-1".into(),
            user_id: "user-1".into(),
            server_url: "https://bi.example.com".into(),
            site: "acme".into(),
            username: "analyst".into(),
        }
    }

    fn exported(slot: &mut WorkbookSlot, n: usize) -> Vec<PathBuf> {
        slot.record_export(
            "Finance".into(),
            format!("Workbook {n}"),
            format!("Dashboard {n}"),
            format!("view-{n}"),
            PathBuf::from(format!("uploads/dashboard_{n}.pdf")),
            PathBuf::from(format!("uploads/dashboard_{n}.png")),
        )
    }

    #[test]
    fn slot_state_progression() {
        let mut slot = WorkbookSlot::default();
        assert_eq!(slot.state(), SlotState::Empty);

        exported(&mut slot, 0);
        assert_eq!(slot.state(), SlotState::Exported);

        slot.record_crop("a_cropped.png".into(), "a_thumb.png".into());
        assert_eq!(slot.state(), SlotState::Cropped);
    }

    #[test]
    fn re_export_resets_crop_and_returns_orphans() {
        let mut slot = WorkbookSlot::default();
        exported(&mut slot, 0);
        slot.record_crop("old_cropped.png".into(), "old_thumb.png".into());

        let orphans = exported(&mut slot, 1);
        assert_eq!(slot.state(), SlotState::Exported);
        assert!(slot.cropped_path.is_none());
        assert!(orphans.contains(&PathBuf::from("old_cropped.png")));
        assert!(orphans.contains(&PathBuf::from("uploads/dashboard_0.pdf")));
        assert_eq!(orphans.len(), 4);
    }

    #[test]
    fn changing_slot_count_discards_everything() {
        let mut session = Session::new(test_credentials());
        session.set_slot_count(2);
        exported(session.slot_mut(0).unwrap(), 0);

        let orphans = session.set_slot_count(3);
        assert_eq!(orphans.len(), 2);
        assert_eq!(session.slots.len(), 3);
        assert!(session.slots.iter().all(|s| s.state() == SlotState::Empty));
    }

    #[test]
    fn combine_gate_names_uncropped_slots() {
        let mut session = Session::new(test_credentials());
        session.set_slot_count(3);
        exported(session.slot_mut(1).unwrap(), 1);
        session
            .slot_mut(1)
            .unwrap()
            .record_crop("c.png".into(), "t.png".into());

        let err = session.require_all_cropped().unwrap_err();
        match err {
            ReportError::IncompleteWorkflow { missing } => assert_eq!(missing, vec![0, 2]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn combine_gate_rejects_empty_session() {
        let session = Session::new(test_credentials());
        let err = session.require_all_cropped().unwrap_err();
        assert!(err.to_string().contains("no slots configured"));
    }

    #[test]
    fn slot_index_guard() {
        let mut session = Session::new(test_credentials());
        session.set_slot_count(2);
        assert!(matches!(
            session.slot(5),
            Err(ReportError::SlotOutOfRange { index: 5, count: 2 })
        ));
    }

    #[test]
    fn reset_keeps_credentials() {
        let mut session = Session::new(test_credentials());
        session.set_slot_count(1);
        exported(session.slot_mut(0).unwrap(), 0);
        session.last_artifact = Some("output/report.pdf".into());

        let orphans = session.reset();
        assert!(orphans.contains(&PathBuf::from("output/report.pdf")));
        assert!(session.slots.is_empty());
        assert!(session.last_artifact.is_none());
        assert_eq!(session.credentials.username, "analyst");
    }

    #[test]
    fn credentials_debug_redacts_token() {
        let debug = format!("{:?}", test_credentials());
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[tokio::test]
    async fn store_round_trip_and_unknown_session() {
        let store = SessionStore::new();
        let id = store.insert(Session::new(test_credentials())).await;

        let username = store
            .with(&id, |s| s.credentials.username.clone())
            .await
            .unwrap();
        assert_eq!(username, "analyst");

        store.with_mut(&id, |s| s.set_slot_count(4)).await.unwrap();
        let count = store.with(&id, |s| s.slots.len()).await.unwrap();
        assert_eq!(count, 4);

        let err = store.with("nope", |_| ()).await.unwrap_err();
        assert!(matches!(err, ReportError::UnknownSession));

        assert!(store.remove(&id).await.is_some());
        assert!(store.remove(&id).await.is_none());
    }
}
