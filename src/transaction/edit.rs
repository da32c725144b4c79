//! Text edits and the line arithmetic the planners share.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::RejectReason;
use crate::graph::Span;

/// Replace `[start, end)` with `text`. Inserts have `start == end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl TextEdit {
    pub fn replace(start: usize, end: usize, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(at, at, text)
    }

    pub fn delete(start: usize, end: usize) -> Self {
        Self::replace(start, end, "")
    }

    pub fn of_span(span: Span, text: impl Into<String>) -> Self {
        Self::replace(span.start, span.end, text)
    }
}

/// Edits grouped by file, in planning order.
#[derive(Debug, Clone, Default)]
pub struct EditSet {
    files: BTreeMap<PathBuf, Vec<TextEdit>>,
}

impl EditSet {
    pub fn push(&mut self, file: &Path, edit: TextEdit) {
        self.files.entry(file.to_path_buf()).or_default().push(edit);
    }

    pub fn into_files(self) -> BTreeMap<PathBuf, Vec<TextEdit>> {
        self.files
    }
}

/// Apply `edits` to `text`. Identical edits collapse into one; inserts at
/// the same offset keep their planning order. Any other overlap rejects.
pub fn apply_edits(file: &Path, text: &str, edits: &[TextEdit]) -> Result<String, RejectReason> {
    let mut ordered: Vec<(usize, &TextEdit)> = edits.iter().enumerate().collect();
    ordered.sort_by(|(ia, a), (ib, b)| {
        a.start
            .cmp(&b.start)
            .then(a.end.cmp(&b.end))
            .then(ia.cmp(ib))
    });
    ordered.dedup_by(|(_, later), (_, earlier)| later == earlier);

    for (_, edit) in &ordered {
        let in_bounds = edit.start <= edit.end && edit.end <= text.len();
        if !in_bounds || !text.is_char_boundary(edit.start) || !text.is_char_boundary(edit.end) {
            return Err(RejectReason::InvalidSpan {
                file: file.to_path_buf(),
                start: edit.start,
                end: edit.end,
            });
        }
    }
    for pair in ordered.windows(2) {
        let (a, b) = (pair[0].1, pair[1].1);
        if a.end > b.start {
            return Err(RejectReason::OverlappingEdits {
                file: file.to_path_buf(),
            });
        }
    }

    let mut out = text.to_string();
    for (_, edit) in ordered.iter().rev() {
        out.replace_range(edit.start..edit.end, &edit.text);
    }
    Ok(out)
}

/// Start of the line containing `offset`.
pub fn line_start(text: &str, offset: usize) -> usize {
    text.get(..offset)
        .and_then(|before| before.rfind('\n'))
        .map_or(0, |pos| pos + 1)
}

/// Offset just past the newline ending the line that contains `offset`.
pub fn line_end(text: &str, offset: usize) -> usize {
    match text.get(offset..).and_then(|rest| rest.find('\n')) {
        Some(pos) => offset + pos + 1,
        None => text.len(),
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Lines a top-level declaration occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarationLines {
    /// Range to delete: leading comments, the declaration and the blank
    /// lines after it.
    pub removal: (usize, usize),
    /// Leading comments plus the declaration, ending in one newline.
    pub text: String,
    /// Offset in the file where `text` starts.
    pub text_start: usize,
}

/// The whole lines of a declaration, or `None` when other code shares them.
pub fn declaration_lines(text: &str, span: Span, comment: &str) -> Option<DeclarationLines> {
    let first = line_start(text, span.start);
    if !text.get(first..span.start)?.trim().is_empty() {
        return None;
    }
    let decl_end = line_end(text, span.end.saturating_sub(1).max(span.start));
    let tail = text.get(span.end..decl_end)?.trim();
    if !tail.is_empty() && !tail.starts_with(comment) {
        return None;
    }

    let mut start = first;
    while start > 0 {
        let prev = line_start(text, start - 1);
        if text[prev..start].trim_start().starts_with(comment) {
            start = prev;
        } else {
            break;
        }
    }
    let body = format!("{}\n", text[start..decl_end].trim_end());
    let text_start = start;

    let mut end = decl_end;
    while end < text.len() {
        let next = line_end(text, end);
        if !is_blank(&text[end..next]) {
            break;
        }
        end = next;
    }
    if end >= text.len() {
        while start > 0 {
            let prev = line_start(text, start - 1);
            if !is_blank(&text[prev..start]) {
                break;
            }
            start = prev;
        }
    }
    Some(DeclarationLines {
        removal: (start, end),
        text: body,
        text_start,
    })
}

/// Range removing a whole statement, with its line when nothing else is on it.
pub fn statement_removal(text: &str, span: Span) -> (usize, usize) {
    let first = line_start(text, span.start);
    let last = line_end(text, span.end.saturating_sub(1).max(span.start));
    let alone = text[first..span.start].trim().is_empty() && text[span.end..last].trim().is_empty();
    if alone {
        (first, last)
    } else {
        (span.start, span.end)
    }
}

/// Range removing one clause of a multi-name import together with the comma
/// that separates it from its neighbour.
pub fn clause_removal(text: &str, clause: Span, statement: Span) -> (usize, usize) {
    let after = &text[clause.end..statement.end];
    let trimmed = after.trim_start();
    if trimmed.starts_with(',') {
        let comma = clause.end + (after.len() - trimmed.len());
        let rest = &text[comma + 1..statement.end];
        let spaces = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        return (clause.start, comma + 1 + spaces);
    }
    let before = &text[statement.start..clause.start];
    let trimmed = before.trim_end();
    if trimmed.ends_with(',') {
        return (statement.start + trimmed.len() - 1, clause.end);
    }
    (clause.start, clause.end)
}

/// Where appended top-level code goes, and the text that must precede it.
pub fn append_point(text: &str, separator: &str) -> (usize, usize, String) {
    let kept = text.trim_end().len();
    if kept == 0 {
        (0, text.len(), String::new())
    } else {
        (kept, text.len(), format!("\n{separator}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_of(text: &str, needle: &str) -> Span {
        let start = text.find(needle).unwrap();
        Span::new(start, start + needle.len(), 0, 0)
    }

    #[test]
    fn test_apply_back_to_front() {
        let text = "abc def ghi";
        let edits = vec![
            TextEdit::replace(0, 3, "x"),
            TextEdit::replace(8, 11, "yyyy"),
            TextEdit::insert(4, ">"),
            TextEdit::insert(4, ">"),
        ];
        let out = apply_edits(Path::new("a.py"), text, &edits).unwrap();
        assert_eq!(out, "x >def yyyy");
    }

    #[test]
    fn test_inserts_keep_order() {
        let edits = vec![TextEdit::insert(0, "one\n"), TextEdit::insert(0, "two\n")];
        let out = apply_edits(Path::new("a.py"), "", &edits).unwrap();
        assert_eq!(out, "one\ntwo\n");
    }

    #[test]
    fn test_overlap_and_bounds_rejected() {
        let text = "héllo";
        let overlap = vec![TextEdit::replace(0, 3, "a"), TextEdit::replace(1, 4, "b")];
        assert!(matches!(
            apply_edits(Path::new("a.py"), text, &overlap),
            Err(RejectReason::OverlappingEdits { .. })
        ));
        let split_char = vec![TextEdit::delete(1, 2)];
        assert!(matches!(
            apply_edits(Path::new("a.py"), text, &split_char),
            Err(RejectReason::InvalidSpan { .. })
        ));
        let past_end = vec![TextEdit::delete(3, 99)];
        assert!(apply_edits(Path::new("a.py"), text, &past_end).is_err());
    }

    #[test]
    fn test_declaration_lines_middle() {
        let text = "import os\n\n\n# Helps.\ndef helper():\n    pass\n\n\ndef other():\n    pass\n";
        let decl = span_of(text, "def helper():\n    pass");
        let lines = declaration_lines(text, decl, "#").unwrap();
        assert_eq!(lines.text, "# Helps.\ndef helper():\n    pass\n");
        let (start, end) = lines.removal;
        let mut out = text.to_string();
        out.replace_range(start..end, "");
        assert_eq!(out, "import os\n\n\ndef other():\n    pass\n");
    }

    #[test]
    fn test_declaration_lines_last() {
        let text = "def a():\n    pass\n\n\ndef helper():\n    pass\n";
        let decl = span_of(text, "def helper():\n    pass");
        let (start, end) = declaration_lines(text, decl, "#").unwrap().removal;
        let mut out = text.to_string();
        out.replace_range(start..end, "");
        assert_eq!(out, "def a():\n    pass\n");
    }

    #[test]
    fn test_declaration_sharing_line() {
        let text = "const a = 1; const b = 2;\n";
        assert!(declaration_lines(text, span_of(text, "const a = 1;"), "//").is_none());
    }

    #[test]
    fn test_clause_removal() {
        let text = "from util import a, helper, b\n";
        let stmt = span_of(text, "from util import a, helper, b");
        let (s, e) = clause_removal(text, span_of(text, "helper"), stmt);
        assert_eq!(format!("{}{}", &text[..s], &text[e..]), "from util import a, b\n");

        let text = "import { a, helper } from './util';\n";
        let stmt = span_of(text, "import { a, helper } from './util';");
        let (s, e) = clause_removal(text, span_of(text, "helper"), stmt);
        assert_eq!(format!("{}{}", &text[..s], &text[e..]), "import { a } from './util';\n");
    }

    #[test]
    fn test_statement_removal_whole_line() {
        let text = "import os\nfrom util import helper\nx = 1\n";
        let (s, e) = statement_removal(text, span_of(text, "from util import helper"));
        assert_eq!(format!("{}{}", &text[..s], &text[e..]), "import os\nx = 1\n");
    }

    #[test]
    fn test_append_point() {
        assert_eq!(append_point("", "\n\n"), (0, 0, String::new()));
        let (at, end, lead) = append_point("x = 1\n\n", "\n\n");
        assert_eq!((at, end), (5, 7));
        assert_eq!(lead, "\n\n\n");
    }
}
