//! Source text preparation and offset tables
//!
//! Every offset in spanlink is a codepoint index into the *normalized* source
//! text: line endings folded to `\n`, zero-width spaces removed. This module
//! owns that normalization and the tables that convert between parser byte
//! spans, codepoint offsets and 1-based line numbers.

use crate::offset::SourceOffset;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::Path;
use tracing::warn;

/// Whether a source file is a requirement document or a code file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Markdown requirement document
    Doc,
    /// Line-numbered source code
    Code,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Doc => "doc",
            SourceKind::Code => "code",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "doc" => Some(SourceKind::Doc),
            "code" => Some(SourceKind::Code),
            _ => None,
        }
    }

    /// Classify a file by extension. Unknown extensions yield `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?;
        if is_doc_extension(ext) {
            Some(SourceKind::Doc)
        } else if is_code_extension(ext) {
            Some(SourceKind::Code)
        } else {
            None
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File extensions rendered through the Markdown path.
pub const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "mdown", "mkd"];

/// File extensions rendered through the line-numbered code path.
pub const CODE_EXTENSIONS: &[&str] = &[
    "rs",    // Rust
    "c",     // C
    "h",     // C headers
    "cpp",   // C++
    "hpp",   // C++ headers
    "cc",    // C++
    "cxx",   // C++
    "java",  // Java
    "kt",    // Kotlin
    "cs",    // C#
    "go",    // Go
    "py",    // Python
    "rb",    // Ruby
    "js",    // JavaScript
    "jsx",   // JavaScript JSX
    "ts",    // TypeScript
    "tsx",   // TypeScript JSX
    "swift", // Swift
    "zig",   // Zig
    "lua",   // Lua
    "sh",    // Shell
    "txt",   // Plain text
];

fn is_doc_extension(ext: &OsStr) -> bool {
    ext.to_str()
        .map(|e| DOC_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_code_extension(ext: &OsStr) -> bool {
    ext.to_str()
        .map(|e| CODE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// Decode raw file bytes: UTF-8 first, then the GBK legacy codepage.
pub fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.strip_prefix('\u{feff}').unwrap_or(text).to_owned(),
        Err(_) => {
            let (text, _, had_errors) = encoding_rs::GBK.decode(bytes);
            if had_errors {
                warn!("input is neither valid UTF-8 nor GBK; malformed sequences were replaced");
            }
            text.into_owned()
        }
    }
}

/// Canonicalize raw text before indexing or rendering.
///
/// Line endings become `\n` and U+200B is removed. For documents, when
/// `split_adjacent_math` is set, `$a$$b$` becomes `$a$ $b$` so the math
/// parser sees two inline formulas instead of a display-math opener.
pub fn normalize(text: &str, kind: SourceKind, split_adjacent_math: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().filter(|&c| c != '\u{200b}').peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }

    if kind == SourceKind::Doc && split_adjacent_math {
        split_contiguous_math(&out)
    } else {
        out
    }
}

fn split_contiguous_math(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let is_joint = chars[i] == '$'
            && chars.get(i + 1) == Some(&'$')
            && i > 0
            && !chars[i - 1].is_whitespace()
            && chars.get(i + 2).is_some_and(|c| !c.is_whitespace());
        if is_joint {
            out.push_str("$ $");
            i += 2;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Split normalized text into `[lineStart, lineEnd)` spans, newline excluded.
///
/// The empty segment after a final `\n` is not a line, so `"a\nbb\n"` has two
/// lines and `""` has none.
pub fn build_line_index(source: &str) -> Vec<SourceOffset> {
    let mut lines = Vec::new();
    let mut start = 0usize;
    let mut len = 0usize;
    for (i, c) in source.chars().enumerate() {
        if c == '\n' {
            lines.push(SourceOffset { start, end: i });
            start = i + 1;
        }
        len = i + 1;
    }
    if start < len {
        lines.push(SourceOffset { start, end: len });
    }
    lines
}

/// A normalized source text with its codepoint and line tables.
#[derive(Debug, Clone)]
pub struct SourceIndex {
    text: String,
    /// Byte position of each codepoint, plus a final entry for `text.len()`
    char_bytes: Vec<usize>,
    lines: Vec<SourceOffset>,
}

impl SourceIndex {
    /// Index text that has already been normalized.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut char_bytes: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        char_bytes.push(text.len());
        let lines = build_line_index(&text);
        Self {
            text,
            char_bytes,
            lines,
        }
    }

    /// Normalize raw text for `kind`, then index it.
    pub fn prepare(raw: &str, kind: SourceKind, split_adjacent_math: bool) -> Self {
        Self::new(normalize(raw, kind, split_adjacent_math))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in codepoints.
    pub fn len(&self) -> usize {
        self.char_bytes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Range covering the whole source.
    pub fn full_range(&self) -> SourceOffset {
        SourceOffset::at(0, self.len())
    }

    pub fn lines(&self) -> &[SourceOffset] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Convert a byte position to a codepoint offset. A byte inside a
    /// multi-byte character maps to that character.
    pub fn byte_to_char(&self, byte: usize) -> usize {
        match self.char_bytes.binary_search(&byte) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        }
    }

    /// Convert a codepoint offset to a byte position, clamped to the text.
    pub fn char_to_byte(&self, offset: usize) -> usize {
        self.char_bytes[offset.min(self.len())]
    }

    /// Convert a parser byte span to a codepoint range.
    pub fn span_to_offset(&self, span: std::ops::Range<usize>) -> SourceOffset {
        let start = self.byte_to_char(span.start);
        let end = self.byte_to_char(span.end).max(start);
        SourceOffset { start, end }
    }

    /// Source text for a range, clamped to the text.
    pub fn slice(&self, range: SourceOffset) -> &str {
        let start = self.char_to_byte(range.start);
        let end = self.char_to_byte(range.end).max(start);
        &self.text[start..end]
    }

    /// Span of a 1-based line number.
    pub fn line_span(&self, line: usize) -> Option<SourceOffset> {
        line.checked_sub(1).and_then(|i| self.lines.get(i)).copied()
    }

    /// 1-based line containing `offset`. The position of a line's trailing
    /// newline belongs to that line.
    pub fn line_of(&self, offset: usize) -> Option<usize> {
        if offset > self.len() {
            return None;
        }
        let idx = self.lines.partition_point(|l| l.start <= offset);
        (idx > 0).then_some(idx)
    }

    /// Span from the start of `first` to the end of `last` (1-based, inclusive).
    pub fn lines_span(&self, first: usize, last: usize) -> Option<SourceOffset> {
        if first > last {
            return None;
        }
        let start = self.line_span(first)?;
        let end = self.line_span(last)?;
        Some(SourceOffset {
            start: start.start,
            end: end.end,
        })
    }

    /// 1-based inclusive line range touched by `range`.
    pub fn line_range_of(&self, range: SourceOffset) -> Option<(usize, usize)> {
        let first = self.line_of(range.start)?;
        let last_offset = if range.is_empty() {
            range.end
        } else {
            range.end - 1
        };
        let last = self.line_of(last_offset)?.max(first);
        Some((first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_excludes_trailing_empty_segment() {
        let lines = build_line_index("a\nbb\n");
        assert_eq!(
            lines,
            vec![SourceOffset { start: 0, end: 1 }, SourceOffset { start: 2, end: 4 }]
        );
    }

    #[test]
    fn line_index_of_empty_source_is_empty() {
        assert!(build_line_index("").is_empty());
    }

    #[test]
    fn line_index_keeps_last_line_without_newline() {
        let lines = build_line_index("a\n\nccc");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], SourceOffset { start: 2, end: 2 });
        assert_eq!(lines[2], SourceOffset { start: 3, end: 6 });
    }

    #[test]
    fn line_index_counts_codepoints() {
        let lines = build_line_index("héllo\nwörld");
        assert_eq!(lines[0], SourceOffset { start: 0, end: 5 });
        assert_eq!(lines[1], SourceOffset { start: 6, end: 11 });
    }

    #[test]
    fn normalize_folds_line_endings_and_gremlins() {
        let text = normalize("a\r\nb\rc\u{200b}d", SourceKind::Code, true);
        assert_eq!(text, "a\nb\ncd");
    }

    #[test]
    fn normalize_splits_contiguous_inline_math_in_docs_only() {
        assert_eq!(normalize("$a$$b$", SourceKind::Doc, true), "$a$ $b$");
        assert_eq!(normalize("$a$$b$", SourceKind::Code, true), "$a$$b$");
        assert_eq!(normalize("$a$$b$", SourceKind::Doc, false), "$a$$b$");
        assert_eq!(normalize("x\n$$\ny\n$$", SourceKind::Doc, true), "x\n$$\ny\n$$");
    }

    #[test]
    fn byte_and_char_offsets_convert() {
        let index = SourceIndex::new("aé€b");
        assert_eq!(index.len(), 4);
        assert_eq!(index.char_to_byte(2), 3);
        assert_eq!(index.byte_to_char(3), 2);
        // inside the euro sign
        assert_eq!(index.byte_to_char(4), 2);
        assert_eq!(index.span_to_offset(1..6), SourceOffset { start: 1, end: 3 });
        assert_eq!(index.slice(SourceOffset { start: 1, end: 3 }), "é€");
    }

    #[test]
    fn line_lookups_are_one_based() {
        let index = SourceIndex::new("one\ntwo\nthree");
        assert_eq!(index.line_span(2), Some(SourceOffset { start: 4, end: 7 }));
        assert_eq!(index.line_span(0), None);
        assert_eq!(index.line_span(4), None);
        assert_eq!(index.line_of(0), Some(1));
        assert_eq!(index.line_of(3), Some(1));
        assert_eq!(index.line_of(4), Some(2));
        assert_eq!(index.line_of(13), Some(3));
        assert_eq!(index.line_of(14), None);
        assert_eq!(index.lines_span(2, 3), Some(SourceOffset { start: 4, end: 13 }));
        assert_eq!(index.lines_span(3, 2), None);
        assert_eq!(
            index.line_range_of(SourceOffset { start: 5, end: 9 }),
            Some((2, 3))
        );
    }

    #[test]
    fn decode_falls_back_to_gbk() {
        // "中文" in GBK
        let bytes = [0xD6, 0xD0, 0xCE, 0xC4];
        assert_eq!(decode(&bytes), "中文");
        assert_eq!(decode("plain".as_bytes()), "plain");
        assert_eq!(decode("\u{feff}bom".as_bytes()), "bom");
    }

    #[test]
    fn classifies_paths() {
        assert_eq!(SourceKind::from_path(Path::new("req/timer.md")), Some(SourceKind::Doc));
        assert_eq!(SourceKind::from_path(Path::new("src/code.h")), Some(SourceKind::Code));
        assert_eq!(SourceKind::from_path(Path::new("image.png")), None);
    }
}
