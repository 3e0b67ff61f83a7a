use std::fmt;

use serde::{Deserialize, Serialize};

/// Host handle for one open view (tab) onto a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub String);

impl ViewId {
    pub fn new(id: impl Into<String>) -> Self {
        ViewId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewId {
    fn from(s: &str) -> Self {
        ViewId(s.to_string())
    }
}

/// One tab group: its views in tab order plus the group's active tab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewGroup {
    pub views: Vec<ViewId>,
    pub active: Option<ViewId>,
}

impl ViewGroup {
    /// Views in the order they are synchronized: the active tab first,
    /// then the remaining tabs in tab order.
    pub fn processing_order(&self) -> Vec<&ViewId> {
        let mut order = Vec::with_capacity(self.views.len());
        if let Some(active) = &self.active
            && self.views.contains(active)
        {
            order.push(active);
        }
        for view in &self.views {
            if Some(view) != self.active.as_ref() {
                order.push(view);
            }
        }
        order
    }
}

/// Whether an annotation block should end up folded or unfolded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoldAction {
    Fold,
    Unfold,
}

impl FoldAction {
    /// Action that realises the given collapsed flag.
    pub fn for_collapsed(collapsed: bool) -> Self {
        if collapsed {
            FoldAction::Fold
        } else {
            FoldAction::Unfold
        }
    }
}
