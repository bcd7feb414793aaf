//! Line table with LF/CRLF-robust splitting and rejoining.
//!
//! Goals
//! - 1-based inclusive line ranges (the unit blocks are addressed in).
//! - Untouched lines keep their own terminators, even in mixed files.
//! - Preserve presence/absence of a final newline.
//!
//! Notes
//! - An empty buffer has 0 lines.
//! - "a\nb\n" and "a\nb" both have 2 lines; the final newline is a flag.
//! - Slices are always joined with '\n' so block content is style-neutral.
//! - Spliced-in lines reuse the terminators of the lines they replace,
//!   position by position; surplus lines take the buffer's detected style.

/// Borrowed view over the logical lines of a text buffer.
#[derive(Debug, Clone)]
pub struct SourceLines<'a> {
    /// Line bodies without their terminators.
    lines: Vec<&'a str>,
    /// Terminator of each line: "\n", "\r\n", or "" for an unterminated last line.
    endings: Vec<&'a str>,
    /// Style for lines that have no original terminator to reuse.
    newline: &'static str,
}

impl<'a> SourceLines<'a> {
    /// Split `text` into lines, remembering each line's terminator.
    pub fn split(text: &'a str) -> Self {
        let mut lines = Vec::new();
        let mut endings = Vec::new();
        for piece in text.split_inclusive('\n') {
            let (body, ending) = if let Some(body) = piece.strip_suffix("\r\n") {
                (body, &piece[body.len()..])
            } else if let Some(body) = piece.strip_suffix('\n') {
                (body, &piece[body.len()..])
            } else {
                (piece, "")
            };
            lines.push(body);
            endings.push(ending);
        }

        // The first terminator decides the style for new lines
        let newline = match endings.first() {
            Some(&"\r\n") => "\r\n",
            _ => "\n",
        };

        Self { lines, endings, newline }
    }

    /// Number of logical lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True for an empty buffer.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Separator used for lines without an original terminator to reuse.
    pub fn newline(&self) -> &'static str {
        self.newline
    }

    /// Text of the inclusive 1-based range `[start, end]`, joined with '\n'.
    /// Returns None when the range is empty or out of bounds.
    pub fn slice(&self, start: usize, end: usize) -> Option<String> {
        if !self.contains_range(start, end) {
            return None;
        }
        Some(self.lines[start - 1..end].join("\n"))
    }

    /// True if `[start, end]` is a valid 1-based inclusive range here.
    pub fn contains_range(&self, start: usize, end: usize) -> bool {
        start >= 1 && start <= end && end <= self.lines.len()
    }

    /// Replace `[start, end]` with the lines of `replacement` and rejoin.
    /// Callers validate the range first with `contains_range`.
    pub fn splice(&self, start: usize, end: usize, replacement: &str) -> String {
        let old = &self.endings[start - 1..end];
        let new: Vec<&str> = replacement.lines().collect();

        let mut out = String::with_capacity(replacement.len() + self.lines.len() * 40);
        for (line, ending) in self.lines[..start - 1].iter().zip(&self.endings) {
            out.push_str(line);
            out.push_str(ending);
        }

        for (i, line) in new.iter().enumerate() {
            // The last new line inherits the last replaced terminator, which
            // carries the final-newline state when the range reaches the end
            let ending = if i + 1 == new.len() {
                old[old.len() - 1]
            } else if i + 1 < old.len() {
                old[i]
            } else {
                self.newline
            };
            out.push_str(line);
            out.push_str(ending);
        }

        for (line, ending) in self.lines[end..].iter().zip(&self.endings[end..]) {
            out.push_str(line);
            out.push_str(ending);
        }

        // Deleting the tail of an unterminated buffer keeps it unterminated
        if new.is_empty() && end == self.lines.len() && old[old.len() - 1].is_empty() {
            let trimmed = out.strip_suffix('\n').map(|s| s.strip_suffix('\r').unwrap_or(s));
            if let Some(trimmed) = trimmed {
                out.truncate(trimmed.len());
            }
        }
        out
    }
}

/// Count logical lines without building a table.
pub fn line_count(text: &str) -> usize {
    text.lines().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_ignore_final_newline() {
        assert_eq!(SourceLines::split("").len(), 0);
        assert_eq!(SourceLines::split("a").len(), 1);
        assert_eq!(SourceLines::split("a\nb").len(), 2);
        assert_eq!(SourceLines::split("a\nb\n").len(), 2);
        assert_eq!(SourceLines::split("a\n\n").len(), 2);
        assert_eq!(line_count("a\r\nb\r\n"), 2);
    }

    #[test]
    fn slice_is_inclusive_and_bounded() {
        let t = SourceLines::split("l1\nl2\nl3\nl4");
        assert_eq!(t.slice(2, 3).as_deref(), Some("l2\nl3"));
        assert_eq!(t.slice(4, 4).as_deref(), Some("l4"));
        assert!(t.slice(0, 1).is_none());
        assert!(t.slice(3, 2).is_none());
        assert!(t.slice(4, 5).is_none());
    }

    #[test]
    fn splice_preserves_crlf_and_final_newline() {
        let text = "a\r\nb\r\nc\r\n";
        let t = SourceLines::split(text);
        assert_eq!(t.newline(), "\r\n");
        assert_eq!(t.splice(2, 2, "B1\nB2"), "a\r\nB1\r\nB2\r\nc\r\n");
        assert_eq!(t.splice(2, 2, "b"), text);
    }

    #[test]
    fn splice_can_delete_lines() {
        let t = SourceLines::split("a\nb\nc");
        assert_eq!(t.splice(2, 2, ""), "a\nc");
        assert_eq!(t.splice(3, 3, ""), "a\nb");
        assert_eq!(SourceLines::split("a\r\nb").splice(2, 2, ""), "a");
    }

    #[test]
    fn mixed_endings_survive_outside_the_edit() {
        let text = "a = 1\nb = 2\r\nc = 3\n";
        let t = SourceLines::split(text);
        assert_eq!(t.newline(), "\n");
        for n in 1..=3 {
            let same = t.slice(n, n).unwrap();
            assert_eq!(t.splice(n, n, &same), text);
        }
        assert_eq!(t.splice(1, 1, "a = 0\nz = 9"), "a = 0\nz = 9\nb = 2\r\nc = 3\n");

        let crlf_first = SourceLines::split("a = 1\r\nb = 2\nc = 3\n");
        assert_eq!(crlf_first.splice(3, 3, "c = 4"), "a = 1\r\nb = 2\nc = 4\n");
        assert_eq!(crlf_first.splice(2, 2, "x\ny"), "a = 1\r\nx\r\ny\nc = 3\n");
    }

    #[test]
    fn unterminated_last_line_stays_unterminated() {
        let t = SourceLines::split("a\r\nb");
        assert_eq!(t.splice(2, 2, "b1\nb2"), "a\r\nb1\r\nb2");
        assert_eq!(t.splice(1, 2, "only"), "only");
    }
}
