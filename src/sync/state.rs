use std::cell::Cell;

/// Shared visibility flag and reentrancy guard.
///
/// Everything runs on one thread with cooperative scheduling, so plain
/// cells are enough: no two tasks ever touch the state at the same time,
/// they only interleave at await points.
#[derive(Debug, Default)]
pub struct SyncState {
    collapsed: Cell<bool>,
    guard: Cell<bool>,
    initialized: Cell<bool>,
}

impl SyncState {
    pub fn new(collapsed: bool) -> Self {
        SyncState {
            collapsed: Cell::new(collapsed),
            ..Default::default()
        }
    }

    /// Snapshot of the visibility flag. Callers must not keep it beyond
    /// the operation they are running.
    pub fn collapsed(&self) -> bool {
        self.collapsed.get()
    }

    pub fn set_collapsed(&self, collapsed: bool) {
        self.collapsed.set(collapsed);
    }

    /// True while the synchronizer is moving focus between views.
    pub fn guard_engaged(&self) -> bool {
        self.guard.get()
    }

    /// Engage the guard until the returned hold is dropped.
    ///
    /// Dropping restores the value seen on entry, so nested holds leave the
    /// guard engaged until the outermost one goes away.
    pub fn hold_guard(&self) -> GuardHold<'_> {
        let previous = self.guard.replace(true);
        GuardHold {
            state: self,
            previous,
        }
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.set(true);
    }
}

/// RAII hold on the reentrancy guard; see [`SyncState::hold_guard`].
#[must_use = "the guard is released as soon as the hold is dropped"]
pub struct GuardHold<'a> {
    state: &'a SyncState,
    previous: bool,
}

impl Drop for GuardHold<'_> {
    fn drop(&mut self) {
        self.state.guard.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_is_released_on_drop() {
        let state = SyncState::default();
        assert!(!state.guard_engaged());
        {
            let _hold = state.hold_guard();
            assert!(state.guard_engaged());
        }
        assert!(!state.guard_engaged());
    }

    #[test]
    fn nested_holds_release_with_the_outermost() {
        let state = SyncState::default();
        let outer = state.hold_guard();
        {
            let _inner = state.hold_guard();
        }
        assert!(state.guard_engaged());
        drop(outer);
        assert!(!state.guard_engaged());
    }

    #[test]
    fn guard_is_released_on_early_return() {
        fn bail(state: &SyncState) -> Result<(), ()> {
            let _hold = state.hold_guard();
            Err::<(), ()>(())?;
            Ok(())
        }
        let state = SyncState::default();
        assert!(bail(&state).is_err());
        assert!(!state.guard_engaged());
    }

    #[test]
    fn flag_round_trips() {
        let state = SyncState::new(true);
        assert!(state.collapsed());
        state.set_collapsed(false);
        assert!(!state.collapsed());
    }
}
