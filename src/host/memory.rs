use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use async_trait::async_trait;

use super::{HostError, SettingScope, SettingsStore, Workbench};
use crate::model::document::Document;
use crate::model::view::{ViewGroup, ViewId};
use crate::parse::span::BlockRange;
use crate::sync::state::SyncState;

/// A host call as seen by [`MemoryHost`], with whether the synchronizer's
/// reentrancy guard was engaged at the time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Focus { view: ViewId, guarded: bool },
    Cursor { view: ViewId, line: usize, guarded: bool },
    Fold { view: ViewId, range: BlockRange, guarded: bool },
    Unfold { view: ViewId, range: BlockRange, guarded: bool },
    SetSetting { scope: SettingScope, key: String, value: bool },
}

/// In-memory workbench and settings store.
///
/// Keeps per-view fold state the way an editor does (independent even when
/// two views show the same document) and records every call it receives.
/// Focus changes are queued as activation events for the embedder to
/// deliver; `focus_view` yields right after queuing, the way a real editor
/// hands control back to its event loop, so a concurrently polled
/// delivery loop sees the event while the caller is still mid-operation.
#[derive(Default)]
pub struct MemoryHost {
    documents: RefCell<HashMap<ViewId, Document>>,
    groups: RefCell<Vec<ViewGroup>>,
    focused: RefCell<Option<ViewId>>,
    folded: RefCell<HashMap<ViewId, BTreeSet<BlockRange>>>,
    cursors: RefCell<HashMap<ViewId, usize>>,
    settings: RefCell<HashMap<(SettingScope, String), bool>>,
    workspace_open: Cell<bool>,
    calls: RefCell<Vec<HostCall>>,
    activations: RefCell<Vec<ViewId>>,
    failing_folds: RefCell<HashSet<ViewId>>,
    focus_thief: RefCell<Option<ViewId>>,
    reject_settings: Cell<bool>,
    observed: RefCell<Option<Rc<SyncState>>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        MemoryHost::default()
    }

    pub fn set_workspace_open(&self, open: bool) {
        self.workspace_open.set(open);
    }

    /// Open a view at the end of tab group `group`, creating groups as needed.
    pub fn add_view(&self, group: usize, id: impl Into<ViewId>, doc: Document) {
        let id = id.into();
        let mut groups = self.groups.borrow_mut();
        while groups.len() <= group {
            groups.push(ViewGroup::default());
        }
        groups[group].views.push(id.clone());
        self.documents.borrow_mut().insert(id, doc);
    }

    /// Replace the content shown in a view.
    pub fn set_document(&self, id: &ViewId, doc: Document) {
        self.documents.borrow_mut().insert(id.clone(), doc);
    }

    /// Focus a view without recording a call or emitting an activation.
    pub fn set_focus(&self, id: impl Into<ViewId>) {
        let id = id.into();
        self.mark_active(&id);
        *self.focused.borrow_mut() = Some(id);
    }

    /// Pre-fold a block in a view, as if the user had folded it.
    pub fn seed_fold(&self, id: &ViewId, range: BlockRange) {
        self.folded.borrow_mut().entry(id.clone()).or_default().insert(range);
    }

    pub fn seed_setting(&self, scope: SettingScope, key: &str, value: bool) {
        self.settings.borrow_mut().insert((scope, key.to_string()), value);
    }

    /// Make every fold/unfold in `id` fail.
    pub fn fail_folds_in(&self, id: impl Into<ViewId>) {
        self.failing_folds.borrow_mut().insert(id.into());
    }

    /// Every focus request lands on `id` instead, simulating a user who
    /// grabs focus while the synchronizer is switching views.
    pub fn steal_focus_to(&self, id: impl Into<ViewId>) {
        *self.focus_thief.borrow_mut() = Some(id.into());
    }

    pub fn reject_setting_writes(&self) {
        self.reject_settings.set(true);
    }

    /// Record guard state from `state` on every call.
    pub fn observe(&self, state: Rc<SyncState>) {
        *self.observed.borrow_mut() = Some(state);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Drain activation events produced by focus changes.
    pub fn take_activations(&self) -> Vec<ViewId> {
        std::mem::take(&mut *self.activations.borrow_mut())
    }

    pub fn folded(&self, id: &ViewId) -> Vec<BlockRange> {
        self.folded
            .borrow()
            .get(id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn cursor(&self, id: &ViewId) -> Option<usize> {
        self.cursors.borrow().get(id).copied()
    }

    pub fn setting(&self, scope: SettingScope, key: &str) -> Option<bool> {
        self.settings.borrow().get(&(scope, key.to_string())).copied()
    }

    fn guarded(&self) -> bool {
        self.observed
            .borrow()
            .as_ref()
            .is_some_and(|state| state.guard_engaged())
    }

    fn record(&self, call: HostCall) {
        self.calls.borrow_mut().push(call);
    }

    fn mark_active(&self, id: &ViewId) {
        for group in self.groups.borrow_mut().iter_mut() {
            if group.views.contains(id) {
                group.active = Some(id.clone());
            }
        }
    }

    fn focused_or_err(&self) -> Result<ViewId, HostError> {
        self.focused.borrow().clone().ok_or(HostError::NoFocusedView)
    }

    fn check_fold(&self, view: &ViewId, range: BlockRange) -> Result<(), HostError> {
        if self.failing_folds.borrow().contains(view) {
            return Err(HostError::Rejected(format!("fold refused in {}", view)));
        }
        let line_count = self
            .documents
            .borrow()
            .get(view)
            .map(|d| d.line_count())
            .ok_or_else(|| HostError::UnknownView(view.clone()))?;
        if range.end_line >= line_count {
            return Err(HostError::RangeOutOfBounds { range, line_count });
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl Workbench for MemoryHost {
    fn document(&self, view: &ViewId) -> Result<Document, HostError> {
        self.documents
            .borrow()
            .get(view)
            .cloned()
            .ok_or_else(|| HostError::UnknownView(view.clone()))
    }

    fn view_groups(&self) -> Vec<ViewGroup> {
        self.groups.borrow().clone()
    }

    fn focused_view(&self) -> Option<ViewId> {
        self.focused.borrow().clone()
    }

    async fn focus_view(&self, view: &ViewId) -> Result<(), HostError> {
        if !self.documents.borrow().contains_key(view) {
            return Err(HostError::UnknownView(view.clone()));
        }
        self.record(HostCall::Focus {
            view: view.clone(),
            guarded: self.guarded(),
        });
        let target = self.focus_thief.borrow().clone().unwrap_or_else(|| view.clone());
        self.mark_active(&target);
        *self.focused.borrow_mut() = Some(target.clone());
        self.activations.borrow_mut().push(target);
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn set_cursor(&self, view: &ViewId, line: usize) -> Result<(), HostError> {
        if !self.documents.borrow().contains_key(view) {
            return Err(HostError::UnknownView(view.clone()));
        }
        self.record(HostCall::Cursor {
            view: view.clone(),
            line,
            guarded: self.guarded(),
        });
        self.cursors.borrow_mut().insert(view.clone(), line);
        Ok(())
    }

    async fn fold(&self, range: BlockRange) -> Result<(), HostError> {
        let view = self.focused_or_err()?;
        self.record(HostCall::Fold {
            view: view.clone(),
            range,
            guarded: self.guarded(),
        });
        self.check_fold(&view, range)?;
        self.folded.borrow_mut().entry(view).or_default().insert(range);
        Ok(())
    }

    async fn unfold(&self, range: BlockRange) -> Result<(), HostError> {
        let view = self.focused_or_err()?;
        self.record(HostCall::Unfold {
            view: view.clone(),
            range,
            guarded: self.guarded(),
        });
        self.check_fold(&view, range)?;
        if let Some(set) = self.folded.borrow_mut().get_mut(&view) {
            set.retain(|r| !r.overlaps(&range));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl SettingsStore for MemoryHost {
    fn has_workspace(&self) -> bool {
        self.workspace_open.get()
    }

    fn get_bool(&self, scope: SettingScope, key: &str) -> Option<bool> {
        self.setting(scope, key)
    }

    async fn set_bool(&self, scope: SettingScope, key: &str, value: bool) -> Result<(), HostError> {
        self.record(HostCall::SetSetting {
            scope,
            key: key.to_string(),
            value,
        });
        if self.reject_settings.get() {
            return Err(HostError::Rejected(format!("{} is read-only", key)));
        }
        self.seed_setting(scope, key, value);
        Ok(())
    }
}
