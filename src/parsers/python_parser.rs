//! Filepath: src/parsers/python_parser.rs
//! ------------------------------------------------------------------
//! Python structural analyzer built on Tree-sitter 0.25.x.
//! Goals:
//!   - Shallow, top-level decomposition into addressable blocks.
//!   - One aggregated import block; one block per top-level def.
//!   - Decorators belong to the definition they decorate.
//!   - Module facts (imports, public names, main guard) for the
//!     project scanner, taken from the same parse.
//!
//! Notes:
//!   - Any ERROR or MISSING node fails the parse. Tree-sitter is
//!     error-tolerant, so `has_error` on the root is the signal.
//!   - Block content is the literal line slice of the source, so
//!     the import block may span non-import lines between imports.
//! ------------------------------------------------------------------

use std::collections::BTreeSet;

use tracing::{debug, instrument};
use tree_sitter::{Language, Node, Parser, Tree};

use crate::core::blocks::{Block, BlockKind, IMPORT_BLOCK_NAME};
use crate::infra::lines::SourceLines;
use crate::infra::utils::{PyDocUtils, TsNodeUtils};

#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("failed to load Python grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("parser produced no syntax tree")]
    NoTree,

    #[error("syntax error near line {line}")]
    Syntax { line: usize },

    #[error("node range {start}-{end} does not map onto source lines")]
    LineRange { start: usize, end: usize },
}

/// Facts about a module used by the project scanner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleFacts {
    /// Raw import names anywhere in the file (`a.b`, `.sibling`).
    pub imports: BTreeSet<String>,
    /// Top-level function/class names without a leading underscore.
    pub exports: BTreeSet<String>,
    /// Top-level `if __name__ == ...` guard present.
    pub has_main_guard: bool,
}

/// Closed set of top-level constructs the analyzer cares about.
enum TopLevel<'t> {
    Import,
    FunctionDef(Node<'t>),
    ClassDef(Node<'t>),
    Other,
}

impl<'t> TopLevel<'t> {
    fn classify(node: Node<'t>) -> Self {
        match node.kind() {
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                TopLevel::Import
            }
            "function_definition" => TopLevel::FunctionDef(node),
            "class_definition" => TopLevel::ClassDef(node),
            "decorated_definition" => match node.child_by_field_name("definition") {
                Some(def) if def.kind() == "function_definition" => TopLevel::FunctionDef(def),
                Some(def) if def.kind() == "class_definition" => TopLevel::ClassDef(def),
                _ => TopLevel::Other,
            },
            _ => TopLevel::Other,
        }
    }
}

/// Analyzer for Python sources.
pub struct PythonAnalyzer {
    /// Python language handle for Tree-sitter.
    language: Language,
}

impl Default for PythonAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self { language: tree_sitter_python::LANGUAGE.into() }
    }

    /// Parse `source`, failing on any syntax error.
    fn parse_tree(&self, source: &str) -> Result<Tree, AnalyzeError> {
        let mut parser = Parser::new();
        parser.set_language(&self.language)?;

        let tree = parser.parse(source, None).ok_or(AnalyzeError::NoTree)?;

        let root = tree.root_node();
        if root.has_error() {
            let line = TsNodeUtils::first_error_line(root).unwrap_or(1);
            return Err(AnalyzeError::Syntax { line });
        }

        Ok(tree)
    }

    /// Ok if `source` parses without syntax errors.
    pub fn check_syntax(&self, source: &str) -> Result<(), AnalyzeError> {
        self.parse_tree(source).map(|_| ())
    }

    pub fn is_well_formed(&self, source: &str) -> bool {
        self.check_syntax(source).is_ok()
    }

    /// Decompose `source` into ordered blocks: the aggregated import block
    /// first (when any top-level import exists), then one block per
    /// top-level function/class in source order.
    #[instrument(level = "debug", skip_all, fields(bytes = source.len()))]
    pub fn parse(&self, source: &str) -> Result<Vec<Block>, AnalyzeError> {
        let tree = self.parse_tree(source)?;
        let root = tree.root_node();
        let bytes = source.as_bytes();
        let lines = SourceLines::split(source);

        let mut import_span: Option<(usize, usize)> = None;
        let mut defs: Vec<Block> = Vec::new();

        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            let (start, end) = TsNodeUtils::line_range_1based(node);

            let (kind, def) = match TopLevel::classify(node) {
                TopLevel::Import => {
                    import_span = Some(match import_span {
                        Some((s, e)) => (s.min(start), e.max(end)),
                        None => (start, end),
                    });
                    continue;
                }
                TopLevel::FunctionDef(def) => (BlockKind::Function, def),
                TopLevel::ClassDef(def) => (BlockKind::Class, def),
                TopLevel::Other => continue,
            };

            let Some(name) = TsNodeUtils::field_text(def, "name", bytes) else { continue };

            defs.push(Block {
                kind,
                name: name.to_string(),
                start_line: start,
                end_line: end,
                content: lines
                    .slice(start, end)
                    .ok_or(AnalyzeError::LineRange { start, end })?,
                docstring: PyDocUtils::docstring_for(def, bytes),
                // Walk the outer node so decorator calls count too
                dependencies: TsNodeUtils::call_names(node, bytes),
            });
        }

        let mut out = Vec::with_capacity(defs.len() + 1);
        if let Some((start, end)) = import_span {
            out.push(Block {
                kind: BlockKind::Import,
                name: IMPORT_BLOCK_NAME.to_string(),
                start_line: start,
                end_line: end,
                content: lines
                    .slice(start, end)
                    .ok_or(AnalyzeError::LineRange { start, end })?,
                docstring: None,
                dependencies: BTreeSet::new(),
            });
        }
        out.extend(defs);

        debug!(blocks = out.len(), "analyzed source");
        Ok(out)
    }

    /// Collect imports, public top-level names, and the main-guard flag.
    pub fn module_facts(&self, source: &str) -> Result<ModuleFacts, AnalyzeError> {
        let tree = self.parse_tree(source)?;
        let root = tree.root_node();
        let bytes = source.as_bytes();

        let mut facts = ModuleFacts::default();

        // Imports are collected from the whole tree, not just top level
        TsNodeUtils::visit(root, |n| collect_imports(n, bytes, &mut facts.imports));

        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            match TopLevel::classify(node) {
                TopLevel::FunctionDef(def) | TopLevel::ClassDef(def) => {
                    if let Some(name) = TsNodeUtils::field_text(def, "name", bytes)
                        && !name.starts_with('_')
                    {
                        facts.exports.insert(name.to_string());
                    }
                }
                TopLevel::Other if node.kind() == "if_statement" => {
                    facts.has_main_guard |= is_main_guard(node, bytes);
                }
                TopLevel::Import | TopLevel::Other => {}
            }
        }

        Ok(facts)
    }
}

/// Record the module names an import statement refers to.
fn collect_imports(node: Node, bytes: &[u8], out: &mut BTreeSet<String>) {
    match node.kind() {
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                let target = match child.kind() {
                    "dotted_name" => Some(child),
                    "aliased_import" => child.child_by_field_name("name"),
                    _ => None,
                };
                if let Some(text) = target.and_then(|t| t.utf8_text(bytes).ok()) {
                    out.insert(text.to_string());
                }
            }
        }
        "import_from_statement" => {
            let Some(module) = node.child_by_field_name("module_name") else { return };
            let Ok(text) = module.utf8_text(bytes) else { return };

            // `from . import x` names no module
            let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
            if !compact.trim_start_matches('.').is_empty() {
                out.insert(compact);
            }
        }
        "future_import_statement" => {
            out.insert("__future__".to_string());
        }
        _ => {}
    }
}

/// True for `if __name__ == "__main__":` style guards.
fn is_main_guard(node: Node, bytes: &[u8]) -> bool {
    let Some(cond) = node.child_by_field_name("condition") else { return false };
    if cond.kind() != "comparison_operator" {
        return false;
    }

    cond.named_child(0)
        .filter(|lhs| lhs.kind() == "identifier")
        .and_then(|lhs| lhs.utf8_text(bytes).ok())
        == Some("__name__")
}
