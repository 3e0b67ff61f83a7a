use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::host::{SettingScope, SettingsStore, Workbench};
use crate::model::config::{COLLAPSED_KEY, DEFAULT_COLLAPSED, Settings, TargetConfig};
use crate::model::view::{FoldAction, ViewId};
use crate::parse::block_locator::{MarkerError, Markers, locate};
use crate::parse::span::BlockRange;
use crate::sync::state::SyncState;

/// What the synchronizer looks for, and in which documents.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub markers: Markers,
    pub target: TargetConfig,
}

impl SyncConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, MarkerError> {
        Ok(SyncConfig {
            markers: Markers::from_config(&settings.markers)?,
            target: settings.target.clone(),
        })
    }
}

/// Whether applying a fold state also moves the cursor to the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reveal {
    /// Explicit user toggle: put the cursor on the block's first line
    MoveCursor,
    /// Background sync: leave the cursor alone
    KeepCursor,
}

/// Result of running the per-view protocol on one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOutcome {
    NotQualified,
    NoBlock,
    Applied { action: FoldAction, range: BlockRange },
    /// Focus moved elsewhere before the fold could be issued
    StaleFocus,
    Failed,
}

/// Per-operation tally of view outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub collapsed: bool,
    pub applied: usize,
    pub no_block: usize,
    pub not_qualified: usize,
    pub stale: usize,
    pub failed: usize,
    pub focus_restored: bool,
}

impl SyncReport {
    fn new(collapsed: bool) -> Self {
        SyncReport {
            collapsed,
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: &ViewOutcome) {
        match outcome {
            ViewOutcome::NotQualified => self.not_qualified += 1,
            ViewOutcome::NoBlock => self.no_block += 1,
            ViewOutcome::Applied { .. } => self.applied += 1,
            ViewOutcome::StaleFocus => self.stale += 1,
            ViewOutcome::Failed => self.failed += 1,
        }
    }
}

/// Keeps every open view's annotation block folded or unfolded according
/// to one persisted flag.
///
/// The host can only fold the focused view, so each view is handled by
/// focusing it, folding, and moving on; the original focus is restored at
/// the end. While focus is being moved the reentrancy guard is engaged and
/// activation events are ignored.
pub struct Synchronizer<'h, W: Workbench + ?Sized, S: SettingsStore + ?Sized> {
    workbench: &'h W,
    settings: &'h S,
    state: Rc<SyncState>,
    config: SyncConfig,
}

impl<'h, W: Workbench + ?Sized, S: SettingsStore + ?Sized> Synchronizer<'h, W, S> {
    pub fn new(workbench: &'h W, settings: &'h S, config: SyncConfig) -> Self {
        Self::with_state(workbench, settings, config, Rc::new(SyncState::default()))
    }

    pub fn with_state(
        workbench: &'h W,
        settings: &'h S,
        config: SyncConfig,
        state: Rc<SyncState>,
    ) -> Self {
        Synchronizer {
            workbench,
            settings,
            state,
            config,
        }
    }

    pub fn state(&self) -> &Rc<SyncState> {
        &self.state
    }

    pub fn collapsed(&self) -> bool {
        self.state.collapsed()
    }

    /// Load the flag from storage, seeding the default when nothing has
    /// been persisted yet. Only the first call reads storage.
    pub async fn initialize(&self) -> bool {
        if self.state.is_initialized() {
            warn!("synchronizer already initialized; keeping in-memory flag");
            return self.state.collapsed();
        }
        self.state.mark_initialized();

        let scope = self.settings.preferred_scope();
        let stored = self.settings.get_bool(scope, COLLAPSED_KEY).or_else(|| {
            if scope == SettingScope::Workspace {
                self.settings.get_bool(SettingScope::Global, COLLAPSED_KEY)
            } else {
                None
            }
        });

        match stored {
            Some(collapsed) => {
                debug!(collapsed, "loaded annotation visibility");
                self.state.set_collapsed(collapsed);
                collapsed
            }
            None => {
                debug!(collapsed = DEFAULT_COLLAPSED, %scope, "seeding annotation visibility");
                self.set_flag(DEFAULT_COLLAPSED).await;
                DEFAULT_COLLAPSED
            }
        }
    }

    /// Update the in-memory flag, then persist it. A failed write is logged
    /// and the in-memory value stays authoritative.
    pub async fn set_flag(&self, collapsed: bool) {
        self.state.set_collapsed(collapsed);
        let scope = self.settings.preferred_scope();
        if let Err(e) = self.settings.set_bool(scope, COLLAPSED_KEY, collapsed).await {
            warn!(%scope, error = %e, "could not persist annotation visibility");
        }
    }

    /// The user-facing command: flip the flag and apply it everywhere.
    pub async fn toggle(&self) -> SyncReport {
        let collapsed = !self.state.collapsed();
        self.set_flag(collapsed).await;
        self.apply_to_all_views(collapsed, Reveal::MoveCursor).await
    }

    /// Apply a fold state to every qualifying open view, one view at a
    /// time, then give focus back to the view that had it.
    pub async fn apply_to_all_views(&self, collapsed: bool, reveal: Reveal) -> SyncReport {
        let original = self.workbench.focused_view();
        let _hold = self.state.hold_guard();
        let mut report = SyncReport::new(collapsed);

        for group in self.workbench.view_groups() {
            for view in group.processing_order() {
                let outcome = self.apply_to_view(view, collapsed, reveal).await;
                report.record(&outcome);
            }
        }

        if let Some(original) = original
            && self.workbench.focused_view().as_ref() != Some(&original)
        {
            match self.workbench.focus_view(&original).await {
                Ok(()) => report.focus_restored = true,
                Err(e) => warn!(view = %original, error = %e, "could not restore focus"),
            }
        }

        debug!(?report, "applied annotation visibility");
        report
    }

    /// Host notification that `view` became active. Ignored while the
    /// synchronizer is switching focus itself; returns `None` in that case.
    pub async fn on_view_activated(&self, view: &ViewId) -> Option<ViewOutcome> {
        if self.state.guard_engaged() {
            debug!(%view, "ignoring self-triggered activation");
            return None;
        }
        let collapsed = self.state.collapsed();
        Some(self.apply_to_view(view, collapsed, Reveal::KeepCursor).await)
    }

    async fn apply_to_view(&self, view: &ViewId, collapsed: bool, reveal: Reveal) -> ViewOutcome {
        let doc = match self.workbench.document(view) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(%view, error = %e, "could not read document");
                return ViewOutcome::Failed;
            }
        };
        if !self.config.target.qualifies(&doc) {
            return ViewOutcome::NotQualified;
        }
        let Some(range) = locate(&doc, &self.config.markers) else {
            debug!(%view, path = %doc.path.display(), "no annotation block");
            return ViewOutcome::NoBlock;
        };

        let _hold = self.state.hold_guard();

        if self.workbench.focused_view().as_ref() != Some(view)
            && let Err(e) = self.workbench.focus_view(view).await
        {
            warn!(%view, error = %e, "could not focus view");
            return ViewOutcome::Failed;
        }

        if reveal == Reveal::MoveCursor
            && let Err(e) = self.workbench.set_cursor(view, range.start_line).await
        {
            warn!(%view, error = %e, "could not move cursor");
        }

        if self.workbench.focused_view().as_ref() != Some(view) {
            warn!(%view, "focus moved before folding; skipping view");
            return ViewOutcome::StaleFocus;
        }

        let action = FoldAction::for_collapsed(collapsed);
        let result = match action {
            FoldAction::Fold => self.workbench.fold(range).await,
            FoldAction::Unfold => self.workbench.unfold(range).await,
        };
        match result {
            Ok(()) => {
                debug!(%view, %range, ?action, "applied");
                ViewOutcome::Applied { action, range }
            }
            Err(e) => {
                warn!(%view, %range, ?action, error = %e, "fold request failed");
                ViewOutcome::Failed
            }
        }
    }
}
