//! Filepath: src/infra/utils.rs
//! Utility helpers organized by small, focused structs.
//! All functions are associated fns to keep call sites
//! ergonomic, testable, and discoverable.

use std::collections::BTreeSet;

// Tree-sitter types for node helpers
use tree_sitter::Node;

/// Common Tree-sitter node helpers
pub struct TsNodeUtils;

impl TsNodeUtils
{
    /// Convert node positions to a 1-based inclusive line range.
    /// A node ending at column 0 of a later row ends on the previous line.
    pub fn line_range_1based(node: Node) -> (usize, usize)
    {
        let s = node.start_position();
        let e = node.end_position();

        // Trailing newline swallowed into the node: stop at the row before
        let end = if e.column == 0 && e.row > s.row { e.row } else { e.row + 1 };

        (s.row + 1, end)
    }

    /// Visit `node` and all of its descendants in pre-order.
    pub fn visit<'t, F>(
        node: Node<'t>,
        mut f: F,
    ) where
        F: FnMut(Node<'t>),
    {
        let mut stack = vec![node];

        while let Some(n) = stack.pop()
        {
            f(n);

            // Push children reversed so the leftmost is visited first
            let mut cursor = n.walk();
            let children: Vec<Node<'t>> = n
                .children(&mut cursor)
                .collect();
            stack.extend(
                children
                    .into_iter()
                    .rev(),
            );
        }
    }

    /// 1-based line of the first ERROR or MISSING node, if any.
    pub fn first_error_line(root: Node) -> Option<usize>
    {
        let mut found: Option<usize> = None;

        Self::visit(root, |n| {
            if found.is_none() && (n.is_error() || n.is_missing())
            {
                found = Some(n.start_position().row + 1);
            }
        });

        found
    }

    /// Collect the trailing name of every call expression under `node`.
    /// `f(x)` yields `f`; `obj.method(x)` yields `method`.
    pub fn call_names(
        node: Node,
        bytes: &[u8],
    ) -> BTreeSet<String>
    {
        let mut names = BTreeSet::new();

        Self::visit(node, |n| {
            if n.kind() != "call"
            {
                return;
            }

            let Some(callee) = n.child_by_field_name("function")
            else
            {
                return;
            };

            // Direct calls name an identifier, method calls an attribute
            let name_node = match callee.kind()
            {
                "identifier" => Some(callee),
                "attribute" => callee.child_by_field_name("attribute"),
                _ => None,
            };

            if let Some(text) = name_node.and_then(|t| {
                t.utf8_text(bytes)
                    .ok()
            })
            {
                names.insert(text.to_string());
            }
        });

        names
    }

    /// Extract text of a child field if present
    pub fn field_text<'a>(
        node: Node,
        field: &str,
        bytes: &'a [u8],
    ) -> Option<&'a str>
    {
        // Locate the child by field name
        let child = node.child_by_field_name(field)?;

        // Convert to utf8 text
        child
            .utf8_text(bytes)
            .ok()
    }
}

/// Python docstring helpers
pub struct PyDocUtils;

impl PyDocUtils
{
    /// Extract a PEP 257 docstring from a function or class node.
    /// Only the very first statement of the body counts.
    pub fn docstring_for(
        node: Node,
        bytes: &[u8],
    ) -> Option<String>
    {
        let body = node.child_by_field_name("body")?;

        // First named child must be expression_statement
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement"
        {
            return None;
        }

        // Its first named child must be a string literal
        let lit = first
            .named_child(0)
            .filter(|n| n.kind() == "string")?;

        // Convert to text and unquote + dedent
        let raw = lit
            .utf8_text(bytes)
            .ok()?;

        Some(Self::unquote_and_dedent(raw))
    }

    /// Remove string prefixes, strip quotes, and dedent
    pub fn unquote_and_dedent(s: &str) -> String
    {
        // Consume at most two legal prefix letters (r, u, f, b combos)
        let prefix = s
            .chars()
            .take(2)
            .take_while(|c| matches!(c.to_ascii_uppercase(), 'R' | 'U' | 'F' | 'B'))
            .count();
        let s = &s[prefix..];

        // Handle triple-quoted first
        for q in [r#"""""#, r#"'''"#]
        {
            if s.starts_with(q) && s.ends_with(q) && s.len() >= 2 * q.len()
            {
                let inner = &s[q.len()..s.len() - q.len()];
                return Self::dedent(inner);
            }
        }

        // Then handle single-quoted
        if s.len() >= 2
            && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
        {
            let inner = &s[1..s.len() - 1];

            return inner
                .replace("\\n", "\n")
                .replace("\\t", "\t")
                .replace("\\\"", "\"")
                .replace("\\'", "'");
        }

        // Fallback unchanged when syntax is unexpected
        s.to_string()
    }

    /// Dedent continuation lines and trim blank edges.
    /// The first line keeps its own (usually zero) indent.
    pub fn dedent(s: &str) -> String
    {
        let lines: Vec<&str> = s
            .lines()
            .collect();

        // Common indent of non-empty lines after the first
        let indent = lines
            .iter()
            .skip(1)
            .filter(|l| {
                !l.trim()
                    .is_empty()
            })
            .map(|l| {
                l.chars()
                    .take_while(|c| *c == ' ')
                    .count()
            })
            .min()
            .unwrap_or(0);

        let dedented: Vec<&str> = lines
            .iter()
            .enumerate()
            .map(|(i, l)| {
                if i == 0
                {
                    l.trim_start()
                }
                else if l.len() >= indent
                {
                    &l[indent..]
                }
                else
                {
                    l.trim_start()
                }
            })
            .collect();

        dedented
            .join("\n")
            .trim_matches('\n')
            .trim_end()
            .to_string()
    }
}
