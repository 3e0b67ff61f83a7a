use std::cell::{Ref, RefCell};
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::host::{HostError, Workbench};
use crate::io::atomic_write;
use crate::model::document::{Document, language_for_path};
use crate::model::view::{ViewGroup, ViewId};
use crate::parse::span::BlockRange;

/// Error type for session file I/O
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Open views and their fold state (written to session.json)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// The globally focused view
    #[serde(default)]
    pub focused: Option<ViewId>,
    /// Tab groups in display order
    #[serde(default)]
    pub groups: Vec<GroupState>,
    /// Counter for allocating view ids
    #[serde(default)]
    pub next_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupState {
    #[serde(default)]
    pub active: Option<ViewId>,
    #[serde(default)]
    pub views: Vec<ViewState>,
}

/// One open view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub id: ViewId,
    /// Document path, relative to the workspace root when inside it
    pub path: PathBuf,
    #[serde(default)]
    pub cursor_line: usize,
    /// Folded spans, sorted
    #[serde(default)]
    pub folded: Vec<BlockRange>,
}

impl SessionState {
    pub fn view(&self, id: &ViewId) -> Option<&ViewState> {
        self.groups
            .iter()
            .flat_map(|g| g.views.iter())
            .find(|v| &v.id == id)
    }

    fn view_mut(&mut self, id: &ViewId) -> Option<&mut ViewState> {
        self.groups
            .iter_mut()
            .flat_map(|g| g.views.iter_mut())
            .find(|v| &v.id == id)
    }

    /// Add a view for `path` at the end of tab group `group`, creating
    /// groups as needed. The new view is not focused.
    pub fn open(&mut self, path: PathBuf, group: usize) -> ViewId {
        self.next_id += 1;
        let id = ViewId(format!("v{}", self.next_id));
        while self.groups.len() <= group {
            self.groups.push(GroupState::default());
        }
        self.groups[group].views.push(ViewState {
            id: id.clone(),
            path,
            cursor_line: 0,
            folded: Vec::new(),
        });
        id
    }

    /// Remove a view. Focus and group activation move to a neighbouring
    /// tab; when the group empties it is dropped and focus moves to another
    /// group's active tab. Returns false if no such view exists.
    pub fn close(&mut self, id: &ViewId) -> bool {
        let Some(gi) = self
            .groups
            .iter()
            .position(|g| g.views.iter().any(|v| &v.id == id))
        else {
            return false;
        };
        let group = &mut self.groups[gi];
        let pos = group.views.iter().position(|v| &v.id == id).unwrap_or(0);
        group.views.remove(pos);
        let neighbour = group
            .views
            .get(pos)
            .or_else(|| group.views.last())
            .map(|v| v.id.clone());
        if group.active.as_ref() == Some(id) {
            group.active = neighbour.clone();
        }
        if group.views.is_empty() {
            self.groups.remove(gi);
        }

        if self.focused.as_ref() == Some(id) {
            self.focused = neighbour.or_else(|| {
                // Nearest remaining group, preferring the one that slid into place
                let next = self.groups.get(gi).or_else(|| self.groups.last())?;
                next.active
                    .clone()
                    .or_else(|| next.views.first().map(|v| v.id.clone()))
            });
            if let Some(focused) = self.focused.clone() {
                self.focus(&focused);
            }
        }
        true
    }

    /// Focus a view and make it its group's active tab.
    pub fn focus(&mut self, id: &ViewId) -> bool {
        let Some(group) = self.groups.iter_mut().find(|g| g.views.iter().any(|v| &v.id == id))
        else {
            return false;
        };
        group.active = Some(id.clone());
        self.focused = Some(id.clone());
        true
    }

    pub fn view_groups(&self) -> Vec<ViewGroup> {
        self.groups
            .iter()
            .map(|g| ViewGroup {
                views: g.views.iter().map(|v| v.id.clone()).collect(),
                active: g.active.clone(),
            })
            .collect()
    }
}

/// Read session.json. A missing file is an empty session.
pub fn read_session(path: &Path) -> Result<SessionState, SessionError> {
    if !path.exists() {
        return Ok(SessionState::default());
    }
    let content = fs::read_to_string(path).map_err(|e| SessionError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| SessionError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write session.json, creating its directory if needed.
pub fn write_session(path: &Path, state: &SessionState) -> Result<(), SessionError> {
    let write_err = |e: std::io::Error| SessionError::WriteError {
        path: path.to_path_buf(),
        source: e,
    };
    let content = serde_json::to_string_pretty(state)
        .map_err(std::io::Error::other)
        .map_err(write_err)?;
    atomic_write(path, content.as_bytes()).map_err(write_err)
}

/// Workbench backed by a session file and the documents on disk.
///
/// Relative document paths are resolved against `base` (the workspace
/// root, or the working directory when there is none).
pub struct SessionHost {
    base: PathBuf,
    state: RefCell<SessionState>,
}

impl SessionHost {
    pub fn new(base: impl Into<PathBuf>, state: SessionState) -> Self {
        SessionHost {
            base: base.into(),
            state: RefCell::new(state),
        }
    }

    pub fn state(&self) -> Ref<'_, SessionState> {
        self.state.borrow()
    }

    pub fn into_state(self) -> SessionState {
        self.state.into_inner()
    }

    /// Path to store for a file: relative to `base` when inside it.
    pub fn session_path(&self, file: &Path) -> PathBuf {
        file.strip_prefix(&self.base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| file.to_path_buf())
    }

    pub fn open(&self, file: &Path, group: usize) -> ViewId {
        let path = self.session_path(file);
        self.state.borrow_mut().open(path, group)
    }

    pub fn close(&self, id: &ViewId) -> Result<(), HostError> {
        if self.state.borrow_mut().close(id) {
            Ok(())
        } else {
            Err(HostError::UnknownView(id.clone()))
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }

    fn focused_or_err(&self) -> Result<ViewId, HostError> {
        self.state.borrow().focused.clone().ok_or(HostError::NoFocusedView)
    }
}

#[async_trait(?Send)]
impl Workbench for SessionHost {
    fn document(&self, view: &ViewId) -> Result<Document, HostError> {
        let path = self
            .state
            .borrow()
            .view(view)
            .map(|v| v.path.clone())
            .ok_or_else(|| HostError::UnknownView(view.clone()))?;
        let full = self.resolve(&path);
        let text = fs::read_to_string(&full).map_err(|e| HostError::ReadError {
            path: full.clone(),
            source: e,
        })?;
        Ok(Document::from_text(&path, language_for_path(&path), &text))
    }

    fn view_groups(&self) -> Vec<ViewGroup> {
        self.state.borrow().view_groups()
    }

    fn focused_view(&self) -> Option<ViewId> {
        self.state.borrow().focused.clone()
    }

    async fn focus_view(&self, view: &ViewId) -> Result<(), HostError> {
        if self.state.borrow_mut().focus(view) {
            Ok(())
        } else {
            Err(HostError::UnknownView(view.clone()))
        }
    }

    async fn set_cursor(&self, view: &ViewId, line: usize) -> Result<(), HostError> {
        let mut state = self.state.borrow_mut();
        let v = state
            .view_mut(view)
            .ok_or_else(|| HostError::UnknownView(view.clone()))?;
        v.cursor_line = line;
        Ok(())
    }

    async fn fold(&self, range: BlockRange) -> Result<(), HostError> {
        let view = self.focused_or_err()?;
        let line_count = self.document(&view)?.line_count();
        if range.end_line >= line_count {
            return Err(HostError::RangeOutOfBounds { range, line_count });
        }
        let mut state = self.state.borrow_mut();
        let v = state
            .view_mut(&view)
            .ok_or_else(|| HostError::UnknownView(view.clone()))?;
        if !v.folded.contains(&range) {
            v.folded.push(range);
            v.folded.sort();
        }
        Ok(())
    }

    async fn unfold(&self, range: BlockRange) -> Result<(), HostError> {
        let view = self.focused_or_err()?;
        let mut state = self.state.borrow_mut();
        let v = state
            .view_mut(&view)
            .ok_or_else(|| HostError::UnknownView(view.clone()))?;
        v.folded.retain(|r| !r.overlaps(&range));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SettingsStore;
    use crate::io::settings_io::FileSettings;
    use crate::model::config::COLLAPSED_KEY;
    use crate::sync::{SyncConfig, Synchronizer};
    use tempfile::TempDir;

    const USER_RB: &str = "\
# == Schema Info
#
# Table name: users
#
class User < ApplicationRecord
end
";

    fn workspace() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("app/models")).unwrap();
        fs::write(tmp.path().join("app/models/user.rb"), USER_RB).unwrap();
        fs::write(tmp.path().join("README.md"), "# readme\nclass note\n").unwrap();
        tmp
    }

    #[test]
    fn open_allocates_ids_and_groups() {
        let mut state = SessionState::default();
        let a = state.open("a.rb".into(), 0);
        let b = state.open("b.rb".into(), 2);
        assert_eq!(a, ViewId::from("v1"));
        assert_eq!(b, ViewId::from("v2"));
        assert_eq!(state.groups.len(), 3);
        assert!(state.focused.is_none());
    }

    #[test]
    fn close_moves_focus_to_neighbour() {
        let mut state = SessionState::default();
        let a = state.open("a.rb".into(), 0);
        let b = state.open("b.rb".into(), 0);
        let c = state.open("c.rb".into(), 0);
        state.focus(&b);

        assert!(state.close(&b));
        assert_eq!(state.focused, Some(c.clone()));
        assert_eq!(state.groups[0].active, Some(c.clone()));

        assert!(state.close(&c));
        assert_eq!(state.focused, Some(a));
        assert!(!state.close(&c));
    }

    #[test]
    fn closing_last_tab_of_a_group_focuses_another_group() {
        let mut state = SessionState::default();
        let a = state.open("a.rb".into(), 0);
        let b = state.open("b.rb".into(), 0);
        let c = state.open("c.rb".into(), 1);
        state.focus(&a);
        state.focus(&c);

        assert!(state.close(&c));
        assert_eq!(state.groups.len(), 1);
        assert_eq!(state.focused, Some(a.clone()));
        assert_eq!(state.groups[0].active, Some(a.clone()));

        // Empty the first group while another group remains
        let d = state.open("d.rb".into(), 1);
        assert!(state.close(&b));
        assert!(state.close(&a));
        assert_eq!(state.groups.len(), 1);
        assert_eq!(state.groups[0].views[0].id, d);
        assert_eq!(state.focused, Some(d.clone()));
        assert_eq!(state.groups[0].active, Some(d.clone()));

        assert!(state.close(&d));
        assert!(state.groups.is_empty());
        assert_eq!(state.focused, None);
    }

    #[test]
    fn session_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".annofold/session.json");
        let mut state = SessionState::default();
        let id = state.open("app/models/user.rb".into(), 0);
        state.focus(&id);
        state.groups[0].views[0].folded.push(BlockRange::new(0, 3));

        write_session(&path, &state).unwrap();
        assert_eq!(read_session(&path).unwrap(), state);
    }

    #[test]
    fn missing_session_is_empty() {
        let tmp = TempDir::new().unwrap();
        let state = read_session(&tmp.path().join("session.json")).unwrap();
        assert_eq!(state, SessionState::default());
    }

    #[test]
    fn malformed_session_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(read_session(&path), Err(SessionError::ParseError { .. })));
    }

    #[test]
    fn document_is_read_from_disk_with_language() {
        let tmp = workspace();
        let host = SessionHost::new(tmp.path(), SessionState::default());
        let id = host.open(&tmp.path().join("app/models/user.rb"), 0);

        let doc = host.document(&id).unwrap();
        assert_eq!(doc.path, PathBuf::from("app/models/user.rb"));
        assert_eq!(doc.language_id, "ruby");
        assert_eq!(doc.line_count(), 6);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let tmp = workspace();
        let host = SessionHost::new(tmp.path(), SessionState::default());
        let id = host.open(Path::new("gone.rb"), 0);
        assert!(matches!(host.document(&id), Err(HostError::ReadError { .. })));
    }

    #[tokio::test]
    async fn fold_targets_focused_view() {
        let tmp = workspace();
        let host = SessionHost::new(tmp.path(), SessionState::default());
        let a = host.open(Path::new("app/models/user.rb"), 0);
        let b = host.open(Path::new("app/models/user.rb"), 1);
        host.focus_view(&b).await.unwrap();

        host.fold(BlockRange::new(0, 3)).await.unwrap();
        host.fold(BlockRange::new(0, 3)).await.unwrap();

        let state = host.state();
        assert!(state.view(&a).unwrap().folded.is_empty());
        assert_eq!(state.view(&b).unwrap().folded, vec![BlockRange::new(0, 3)]);
    }

    #[tokio::test]
    async fn fold_past_end_of_document_is_rejected() {
        let tmp = workspace();
        let host = SessionHost::new(tmp.path(), SessionState::default());
        let a = host.open(Path::new("app/models/user.rb"), 0);
        host.focus_view(&a).await.unwrap();

        let err = host.fold(BlockRange::new(0, 40)).await.unwrap_err();
        assert!(matches!(err, HostError::RangeOutOfBounds { line_count: 6, .. }));
    }

    #[tokio::test]
    async fn focus_unknown_view_fails() {
        let host = SessionHost::new("/", SessionState::default());
        let err = host.focus_view(&"v9".into()).await.unwrap_err();
        assert!(matches!(err, HostError::UnknownView(_)));
    }

    #[tokio::test]
    async fn toggle_over_session_and_settings_files() {
        let tmp = workspace();
        let settings = FileSettings::new(
            Some(tmp.path().join(".annofold/settings.toml")),
            tmp.path().join("global/settings.toml"),
        );
        let host = SessionHost::new(tmp.path(), SessionState::default());
        let model = host.open(Path::new("app/models/user.rb"), 0);
        let readme = host.open(Path::new("README.md"), 0);
        let split = host.open(Path::new("app/models/user.rb"), 1);
        host.focus_view(&readme).await.unwrap();

        let sync = Synchronizer::new(&host, &settings, SyncConfig::default());
        sync.initialize().await;
        sync.toggle().await;
        drop(sync);

        let state = host.into_state();
        assert_eq!(state.focused, Some(readme.clone()));
        assert_eq!(state.view(&model).unwrap().folded, vec![BlockRange::new(0, 3)]);
        assert_eq!(state.view(&split).unwrap().folded, vec![BlockRange::new(0, 3)]);
        assert!(state.view(&readme).unwrap().folded.is_empty());
        assert_eq!(settings.get_bool(settings.preferred_scope(), COLLAPSED_KEY), Some(true));
    }
}
