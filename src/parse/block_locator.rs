use regex::Regex;

use crate::model::config::{DEFAULT_END_MARKER, DEFAULT_START_MARKER, MarkerConfig};
use crate::model::document::Document;
use crate::parse::span::BlockRange;

/// Error for a marker pattern that is not a valid regex
#[derive(Debug, thiserror::Error)]
#[error("invalid {which} marker pattern: {source}")]
pub struct MarkerError {
    pub which: &'static str,
    pub source: regex::Error,
}

/// Compiled start/end patterns for annotation blocks.
///
/// Matches are only accepted when they begin at the first character of the
/// line, so an unanchored pattern still behaves as a line-start test.
#[derive(Debug, Clone)]
pub struct Markers {
    start: Regex,
    end: Regex,
}

impl Markers {
    pub fn new(start: &str, end: &str) -> Result<Self, MarkerError> {
        let start = Regex::new(start).map_err(|source| MarkerError {
            which: "start",
            source,
        })?;
        let end = Regex::new(end).map_err(|source| MarkerError {
            which: "end",
            source,
        })?;
        Ok(Markers { start, end })
    }

    pub fn from_config(config: &MarkerConfig) -> Result<Self, MarkerError> {
        Markers::new(&config.start, &config.end)
    }

    pub fn is_start(&self, line: &str) -> bool {
        matches_at_line_start(&self.start, line)
    }

    pub fn is_end(&self, line: &str) -> bool {
        matches_at_line_start(&self.end, line)
    }
}

impl Default for Markers {
    fn default() -> Self {
        Markers::new(DEFAULT_START_MARKER, DEFAULT_END_MARKER)
            .expect("built-in marker patterns are valid")
    }
}

fn matches_at_line_start(re: &Regex, line: &str) -> bool {
    re.find(line).is_some_and(|m| m.start() == 0)
}

/// Iterator over the completed blocks of a line sequence.
///
/// A start marker opens a candidate (replacing any open one); the next end
/// marker closes it just above the end line. End markers with no open
/// candidate are ignored, and a trailing unterminated candidate yields nothing.
struct BlockScanner<'a, S> {
    lines: &'a [S],
    markers: &'a Markers,
    idx: usize,
    open: Option<usize>,
}

impl<'a, S: AsRef<str>> Iterator for BlockScanner<'a, S> {
    type Item = BlockRange;

    fn next(&mut self) -> Option<BlockRange> {
        while self.idx < self.lines.len() {
            let idx = self.idx;
            let line = self.lines[idx].as_ref();
            self.idx += 1;

            if self.markers.is_start(line) {
                self.open = Some(idx);
            } else if self.markers.is_end(line)
                && let Some(start) = self.open.take()
            {
                return Some(BlockRange::new(start, idx - 1));
            }
        }
        None
    }
}

fn scan<'a, S: AsRef<str>>(lines: &'a [S], markers: &'a Markers) -> BlockScanner<'a, S> {
    BlockScanner {
        lines,
        markers,
        idx: 0,
        open: None,
    }
}

/// Find the first annotation block in a document.
pub fn locate(doc: &Document, markers: &Markers) -> Option<BlockRange> {
    locate_lines(&doc.lines, markers)
}

/// Find the first annotation block in a sequence of lines. Scanning stops
/// at the first completed block.
pub fn locate_lines<S: AsRef<str>>(lines: &[S], markers: &Markers) -> Option<BlockRange> {
    scan(lines, markers).next()
}

/// Every completed annotation block in a document, in order. Used to
/// answer folding-range queries; the first entry is what `locate` returns.
pub fn folding_ranges(doc: &Document, markers: &Markers) -> Vec<BlockRange> {
    scan(&doc.lines, markers).collect()
}
