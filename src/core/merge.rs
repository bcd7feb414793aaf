//! Line-accurate merge engine.
//!
//! Splices edited blocks back into full file text by their 1-based,
//! inclusive line ranges. Splicing never re-parses; `validate` is the
//! separate syntactic gate callers run on the result.

use crate::core::blocks::Block;
use crate::infra::lines::SourceLines;
use crate::parsers::PythonAnalyzer;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("block '{name}' range {start}-{end} is outside the file's {line_count} lines")]
    OutOfRange {
        name: String,
        start: usize,
        end: usize,
        line_count: usize,
    },
}

/// Replace `block`'s line range in `original` with `block.content`.
///
/// Newline style and the presence of a final newline are preserved, so
/// splicing a block's own extracted content returns `original` unchanged.
pub fn merge_one(original: &str, block: &Block) -> Result<String, MergeError> {
    let lines = SourceLines::split(original);

    if !lines.contains_range(block.start_line, block.end_line) {
        return Err(MergeError::OutOfRange {
            name: block.name.clone(),
            start: block.start_line,
            end: block.end_line,
            line_count: lines.len(),
        });
    }

    Ok(lines.splice(block.start_line, block.end_line, &block.content))
}

/// Apply several blocks, bottom-up.
///
/// Sorting by descending start line means a block that changes its line
/// count never shifts the ranges of blocks still waiting above it.
pub fn merge_many(original: &str, blocks: &[Block]) -> Result<String, MergeError> {
    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by(|a, b| b.start_line.cmp(&a.start_line));

    ordered
        .into_iter()
        .try_fold(original.to_string(), |text, block| merge_one(&text, block))
}

/// Accept `merged` only if it is non-empty and parses cleanly.
///
/// `original` is not consulted; the check is purely syntactic.
pub fn validate(_original: &str, merged: &str) -> bool {
    if merged.is_empty() || SourceLines::split(merged).is_empty() {
        return false;
    }
    PythonAnalyzer::new().is_well_formed(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blocks::BlockKind;

    fn edit(start: usize, end: usize, content: &str) -> Block {
        Block {
            kind: BlockKind::Function,
            name: format!("edit_{start}"),
            start_line: start,
            end_line: end,
            content: content.to_string(),
            docstring: None,
            dependencies: Default::default(),
        }
    }

    const FIVE: &str = "line1\nline2\nline3\nline4\nline5";

    #[test]
    fn replaces_inclusive_range() {
        let merged = merge_one(FIVE, &edit(2, 3, "new_line2\nnew_line3")).unwrap();
        assert_eq!(merged, "line1\nnew_line2\nnew_line3\nline4\nline5");
    }

    #[test]
    fn growing_and_shrinking_ranges() {
        assert_eq!(merge_one(FIVE, &edit(5, 5, "a\nb")).unwrap(), "line1\nline2\nline3\nline4\na\nb");
        assert_eq!(merge_one(FIVE, &edit(1, 4, "top")).unwrap(), "top\nline5");
    }

    #[test]
    fn merge_many_is_order_independent() {
        let expected = "line1\nEDIT2\nline3\nEDIT4\nline5";
        let forward = [edit(2, 2, "EDIT2"), edit(4, 4, "EDIT4")];
        let backward = [edit(4, 4, "EDIT4"), edit(2, 2, "EDIT2")];
        assert_eq!(merge_many(FIVE, &forward).unwrap(), expected);
        assert_eq!(merge_many(FIVE, &backward).unwrap(), expected);
    }

    #[test]
    fn merge_many_handles_line_count_changes() {
        let blocks = [edit(1, 1, "a\nb\nc"), edit(4, 5, "tail")];
        assert_eq!(merge_many(FIVE, &blocks).unwrap(), "a\nb\nc\nline2\nline3\ntail");
    }

    #[test]
    fn out_of_range_is_an_error() {
        assert!(matches!(merge_one(FIVE, &edit(0, 1, "x")), Err(MergeError::OutOfRange { .. })));
        assert!(matches!(merge_one(FIVE, &edit(5, 6, "x")), Err(MergeError::OutOfRange { .. })));
        assert!(matches!(merge_one(FIVE, &edit(3, 2, "x")), Err(MergeError::OutOfRange { .. })));
        assert!(matches!(merge_one("", &edit(1, 1, "x")), Err(MergeError::OutOfRange { .. })));
    }

    #[test]
    fn validate_rejects_empty_and_broken_text() {
        assert!(!validate("x = 1\n", ""));
        assert!(!validate("x = 1\n", "def f(:\n    pass\n"));
        assert!(!validate("x = 1\n", "class A:\n    def m(self)\n        pass\n"));
    }

    #[test]
    fn validate_accepts_unrelated_but_valid_text() {
        assert!(validate("x = 1\n", "def totally_different():\n    return 42\n"));
    }
}
