//! Capabilities the synchronizer needs from the editor host.
//!
//! The host owns documents, views and persisted settings. Its fold and
//! unfold primitives act only on the focused view, which is why the
//! synchronizer has to move focus around while it works.

pub mod memory;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;

use crate::io::lock::LockError;
use crate::io::settings_io::SettingsError;
use crate::model::document::Document;
use crate::model::view::{ViewGroup, ViewId};
use crate::parse::span::BlockRange;

/// Error type for host capability calls
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("unknown view: {0}")]
    UnknownView(ViewId),
    #[error("no view is focused")]
    NoFocusedView,
    #[error("{range} is outside the document ({line_count} lines)")]
    RangeOutOfBounds { range: BlockRange, line_count: usize },
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("host rejected the request: {0}")]
    Rejected(String),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// View, document and fold access.
#[async_trait(?Send)]
pub trait Workbench {
    /// Current content of the document shown in `view`.
    fn document(&self, view: &ViewId) -> Result<Document, HostError>;

    /// Open views grouped by tab group, in group order.
    fn view_groups(&self) -> Vec<ViewGroup>;

    fn focused_view(&self) -> Option<ViewId>;

    /// Make `view` the focused view. Hosts may report the switch back as an
    /// activation event.
    async fn focus_view(&self, view: &ViewId) -> Result<(), HostError>;

    async fn set_cursor(&self, view: &ViewId, line: usize) -> Result<(), HostError>;

    /// Fold `range` in the focused view.
    async fn fold(&self, range: BlockRange) -> Result<(), HostError>;

    /// Unfold `range` in the focused view.
    async fn unfold(&self, range: BlockRange) -> Result<(), HostError>;
}

/// Where a setting is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingScope {
    Workspace,
    Global,
}

impl std::fmt::Display for SettingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingScope::Workspace => f.write_str("workspace"),
            SettingScope::Global => f.write_str("global"),
        }
    }
}

/// Persisted boolean settings.
#[async_trait(?Send)]
pub trait SettingsStore {
    fn has_workspace(&self) -> bool;

    fn get_bool(&self, scope: SettingScope, key: &str) -> Option<bool>;

    async fn set_bool(&self, scope: SettingScope, key: &str, value: bool) -> Result<(), HostError>;

    /// Workspace scope when a workspace is open, global otherwise.
    fn preferred_scope(&self) -> SettingScope {
        if self.has_workspace() {
            SettingScope::Workspace
        } else {
            SettingScope::Global
        }
    }
}
