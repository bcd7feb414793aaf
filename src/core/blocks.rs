//! Block model, block-level relevance ranking, and edit-context assembly.
//!
//! A block is one addressable unit of a source file: the aggregated import
//! group, or one top-level function/class. Blocks carry their exact source
//! text so they can be shown to a rewriter and spliced back by line range.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use itertools::Itertools;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{AppContext, BlocksArgs};
use crate::infra::io::read_source;
use crate::parsers::PythonAnalyzer;

/// Name given to the aggregated import block.
pub const IMPORT_BLOCK_NAME: &str = "imports";

/// Default number of blocks in an assembled context.
pub const DEFAULT_CONTEXT_CAP: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockKind {
    Import,
    Function,
    Class,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Import => "import",
            BlockKind::Function => "function",
            BlockKind::Class => "class",
        }
    }
}

/// One addressable unit of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub kind: BlockKind,
    pub name: String,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    pub content: String,
    pub docstring: Option<String>,
    /// Trailing names of calls made inside the block. Advisory only.
    pub dependencies: BTreeSet<String>,
}

impl Block {
    /// Copy of this block carrying new content but the same identity and range.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self { content: content.into(), ..self.clone() }
    }

    pub fn line_span(&self) -> usize {
        self.end_line + 1 - self.start_line
    }
}

/// Score one block against a lowercase query and its distinct tokens.
fn block_score(block: &Block, query: &str, tokens: &[&str]) -> u32 {
    let name = block.name.to_lowercase();
    let doc = block.docstring.as_deref().map(str::to_lowercase);
    let content = block.content.to_lowercase();

    let mut score = 0;
    if !name.is_empty() && query.contains(&name) {
        score += 10;
    }
    for token in tokens {
        if name.contains(token) {
            score += 5;
        }
        if content.contains(token) {
            score += 1;
        }
    }
    // Docstring counts once, however many tokens it mentions
    if doc.is_some_and(|d| tokens.iter().any(|t| d.contains(t))) {
        score += 2;
    }
    score
}

/// Rank blocks against a free-text query.
///
/// Repeated query words count once. Zero-score blocks are dropped; equal
/// scores keep source order.
pub fn rank_blocks<'b>(blocks: &'b [Block], query: &str) -> Vec<(&'b Block, u32)> {
    let query = query.to_lowercase();
    let tokens: Vec<&str> = query.split_whitespace().unique().collect();

    let mut scored: Vec<(&Block, u32)> = blocks
        .iter()
        .map(|b| (b, block_score(b, &query, &tokens)))
        .filter(|(_, s)| *s > 0)
        .collect();

    // sort_by is stable
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
}

/// Assemble the minimal edit context for `target`: the import block, the
/// target itself, then blocks named by the target's call dependencies
/// (in lexicographic order) until `cap` blocks are collected.
pub fn assemble_context<'b>(blocks: &'b [Block], target: &'b Block, cap: usize) -> Vec<&'b Block> {
    let mut out: Vec<&Block> = Vec::with_capacity(cap);

    if let Some(imports) = blocks.iter().find(|b| b.kind == BlockKind::Import)
        && imports != target
    {
        out.push(imports);
    }
    out.push(target);

    for dep in &target.dependencies {
        if out.len() >= cap {
            break;
        }
        if let Some(found) = blocks.iter().find(|b| &b.name == dep)
            && !out.contains(&found)
        {
            out.push(found);
        }
    }

    out
}

/// Concatenate block contents with a blank line between them.
pub fn context_text(blocks: &[&Block]) -> String {
    blocks
        .iter()
        .map(|b| b.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Tabled)]
struct BlockRow {
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Lines")]
    lines: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Calls")]
    calls: String,
}

impl BlockRow {
    fn new(block: &Block, score: Option<u32>) -> Self {
        Self {
            kind: block.kind.as_str(),
            name: block.name.clone(),
            lines: format!("{}-{}", block.start_line, block.end_line),
            score: score.map(|s| s.to_string()).unwrap_or_default(),
            calls: block.dependencies.iter().cloned().collect::<Vec<_>>().join(", "),
        }
    }
}

/// `vibe blocks`: list the blocks of a file, ranked when a query is given.
pub fn run(args: BlocksArgs, ctx: &AppContext) -> Result<()> {
    let path = crate::infra::io::expand_path(&args.file)?;
    let source = read_source(&path)?;
    let analyzer = PythonAnalyzer::new();
    let blocks = analyzer
        .parse(source.as_ref())
        .with_context(|| format!("Failed to analyze {}", path.display()))?;

    let rows: Vec<BlockRow> = match args.query.as_deref() {
        Some(q) => rank_blocks(&blocks, q)
            .into_iter()
            .map(|(b, s)| BlockRow::new(b, Some(s)))
            .collect(),
        None => blocks.iter().map(|b| BlockRow::new(b, None)).collect(),
    };

    if args.json {
        let json = serde_json::to_string_pretty(&blocks).context("serialize blocks")?;
        println!("{json}");
        return Ok(());
    }

    if rows.is_empty() {
        if !ctx.quiet {
            println!("No matching blocks in {}", path.display());
        }
        return Ok(());
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
