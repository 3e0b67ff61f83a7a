use std::path::{Path, PathBuf};

/// A snapshot of a host document: its identity, language and lines.
///
/// Documents are owned by the host. The core reads them fresh for every
/// operation because content can change between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Stable identity of the document (usually its path)
    pub path: PathBuf,
    /// Host language classification (e.g. "ruby", "plaintext")
    pub language_id: String,
    /// Lines without their terminators, index 0 is the first line
    pub lines: Vec<String>,
}

impl Document {
    pub fn new(
        path: impl Into<PathBuf>,
        language_id: impl Into<String>,
        lines: Vec<String>,
    ) -> Self {
        Document {
            path: path.into(),
            language_id: language_id.into(),
            lines,
        }
    }

    /// Build a document from raw text, splitting on line terminators.
    pub fn from_text(path: impl Into<PathBuf>, language_id: impl Into<String>, text: &str) -> Self {
        let lines = text.lines().map(|l| l.to_string()).collect();
        Document::new(path, language_id, lines)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, idx: usize) -> Option<&str> {
        self.lines.get(idx).map(|l| l.as_str())
    }

    /// Final path component as UTF-8, if any
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Language id assigned to files that match no known extension.
pub const PLAIN_TEXT: &str = "plaintext";

/// Classify a file by name and extension, the way an editor assigns a
/// language mode when a file is opened.
pub fn language_for_path(path: &Path) -> &'static str {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    match name {
        "Gemfile" | "Rakefile" | "Guardfile" | "Capfile" => return "ruby",
        _ => {}
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("rb" | "rake" | "gemspec" | "ru" | "rbw") => "ruby",
        Some("py" | "pyw") => "python",
        Some("rs") => "rust",
        Some("js" | "mjs" | "cjs") => "javascript",
        Some("ts") => "typescript",
        Some("md" | "markdown") => "markdown",
        Some("toml") => "toml",
        Some("json") => "json",
        Some("yml" | "yaml") => "yaml",
        Some("sql") => "sql",
        _ => PLAIN_TEXT,
    }
}
