use serde::{Deserialize, Serialize};

use super::document::Document;

/// Dotted key of the persisted visibility flag (`[annotations] collapsed`).
pub const COLLAPSED_KEY: &str = "annotations.collapsed";

/// Value seeded into storage when no flag has been persisted yet:
/// annotations start expanded.
pub const DEFAULT_COLLAPSED: bool = false;

/// Configuration from settings.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub annotations: AnnotationsConfig,
    #[serde(default)]
    pub markers: MarkerConfig,
    #[serde(default)]
    pub target: TargetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationsConfig {
    /// Persisted visibility flag; absent until the first run seeds it
    #[serde(default)]
    pub collapsed: Option<bool>,
    /// Apply the flag to views as they are opened or focused from outside
    /// (`open`, `watch`). On by default.
    #[serde(default = "default_apply_on_open")]
    pub apply_on_open: bool,
}

impl Default for AnnotationsConfig {
    fn default() -> Self {
        AnnotationsConfig {
            collapsed: None,
            apply_on_open: default_apply_on_open(),
        }
    }
}

fn default_apply_on_open() -> bool {
    true
}

/// Line-start patterns bounding an annotation block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerConfig {
    #[serde(default = "default_start_marker")]
    pub start: String,
    #[serde(default = "default_end_marker")]
    pub end: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        MarkerConfig {
            start: default_start_marker(),
            end: default_end_marker(),
        }
    }
}

pub const DEFAULT_START_MARKER: &str = r"^# == Schema Info";
pub const DEFAULT_END_MARKER: &str = r"^class\s";

fn default_start_marker() -> String {
    DEFAULT_START_MARKER.to_string()
}

fn default_end_marker() -> String {
    DEFAULT_END_MARKER.to_string()
}

/// Which documents the synchronizer acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Host language id that qualifies a document
    #[serde(default = "default_language")]
    pub language: String,
    /// Filename suffix that qualifies a document whatever its language
    /// (e.g. `.rb.git` for the old side of a git diff)
    #[serde(default = "default_secondary_extension")]
    pub secondary_extension: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            language: default_language(),
            secondary_extension: default_secondary_extension(),
        }
    }
}

fn default_language() -> String {
    "ruby".to_string()
}

fn default_secondary_extension() -> String {
    ".rb.git".to_string()
}

impl TargetConfig {
    /// A document qualifies when its language matches, or its filename
    /// carries the secondary extension.
    pub fn qualifies(&self, doc: &Document) -> bool {
        if doc.language_id == self.language {
            return true;
        }
        !self.secondary_extension.is_empty()
            && doc
                .file_name()
                .is_some_and(|name| name.ends_with(&self.secondary_extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_use_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.annotations.collapsed, None);
        assert!(settings.annotations.apply_on_open);
        assert_eq!(settings.markers, MarkerConfig::default());
        assert_eq!(settings.target.language, "ruby");
        assert_eq!(settings.target.secondary_extension, ".rb.git");
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let settings: Settings = toml::from_str(
            r#"[annotations]
collapsed = true

[markers]
end = "^module\\s"
"#,
        )
        .unwrap();
        assert_eq!(settings.annotations.collapsed, Some(true));
        assert!(settings.annotations.apply_on_open);
        assert_eq!(settings.markers.start, DEFAULT_START_MARKER);
        assert_eq!(settings.markers.end, r"^module\s");
    }

    #[test]
    fn apply_on_open_can_be_turned_off() {
        let settings: Settings =
            toml::from_str("[annotations]\napply_on_open = false\n").unwrap();
        assert!(!settings.annotations.apply_on_open);
        assert_eq!(settings.annotations.collapsed, None);
    }

    #[test]
    fn qualifies_by_language() {
        let target = TargetConfig::default();
        let doc = Document::new("user.rb", "ruby", vec![]);
        assert!(target.qualifies(&doc));
        let doc = Document::new("user.py", "python", vec![]);
        assert!(!target.qualifies(&doc));
    }

    #[test]
    fn qualifies_by_secondary_extension() {
        let target = TargetConfig::default();
        let doc = Document::new("app/models/user.rb.git", "plaintext", vec![]);
        assert!(target.qualifies(&doc));
    }

    #[test]
    fn empty_secondary_extension_matches_nothing() {
        let target = TargetConfig {
            secondary_extension: String::new(),
            ..Default::default()
        };
        let doc = Document::new("notes.txt", "plaintext", vec![]);
        assert!(!target.qualifies(&doc));
    }
}
