//! Read-only view of a host document.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::types::DocumentId;

/// Indexed, read-only line access to a document owned by the host.
///
/// The engine never mutates a document. When the host edits one it replaces
/// it wholesale and tells the [`Timeline`](crate::Timeline) about the change.
pub trait Document {
    /// Returns the document's identity.
    fn id(&self) -> &DocumentId;

    /// Returns the number of lines.
    fn line_count(&self) -> usize;

    /// Returns the text of line `index`, without its line terminator.
    fn line_at(&self, index: usize) -> Option<&str>;

    /// Returns the whole text, lines joined by `\n`.
    fn text(&self) -> Cow<'_, str> {
        let mut text = String::new();
        for i in 0..self.line_count() {
            if i > 0 {
                text.push('\n');
            }
            text.push_str(self.line_at(i).unwrap_or_default());
        }
        Cow::Owned(text)
    }

    /// Returns the range covering line `index`, if it exists.
    fn line_range(&self, index: usize) -> Option<LineRange> {
        self.line_at(index).map(|text| LineRange {
            line: index,
            start: 0,
            end: text.chars().count(),
        })
    }
}

/// A character range within a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub line: usize,
    pub start: usize,
    pub end: usize,
}

/// An in-memory document backed by owned lines.
#[derive(Debug, Clone)]
pub struct TextDocument {
    id: DocumentId,
    text: String,
    /// Byte offsets of each line within `text`.
    lines: Vec<(usize, usize)>,
}

impl TextDocument {
    /// Creates a document from its full text. `\n` and `\r\n` both end a line.
    pub fn new(id: DocumentId, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut lines = Vec::new();
        let mut start = 0;
        for (pos, _) in text.match_indices('\n') {
            let end = if pos > start && text.as_bytes()[pos - 1] == b'\r' {
                pos - 1
            } else {
                pos
            };
            lines.push((start, end));
            start = pos + 1;
        }
        if start < text.len() || lines.is_empty() {
            lines.push((start, text.len()));
        }
        Self { id, text, lines }
    }

    /// Creates a document from separate lines.
    pub fn from_lines<I, S>(id: DocumentId, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = lines
            .into_iter()
            .map(|l| l.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Self::new(id, joined)
    }
}

impl Document for TextDocument {
    fn id(&self) -> &DocumentId {
        &self.id
    }

    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line_at(&self, index: usize) -> Option<&str> {
        self.lines
            .get(index)
            .map(|&(start, end)| &self.text[start..end])
    }

    fn text(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.text)
    }
}
