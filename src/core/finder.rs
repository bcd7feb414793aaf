//! Project-level file relevance ranking.
//!
//! Scores indexed files against a free-text query using export names, the
//! file name, directory segments and import identifiers. Used to locate a
//! target file when an instruction does not name one.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use itertools::Itertools;
use regex::Regex;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{AppContext, FindArgs};
use crate::core::project::{FileInfo, ProjectGraph};
use crate::core::store::incremental_index;
use crate::infra::config::Config;

/// Lower-to-upper and acronym-to-word boundaries in camelCase identifiers.
static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])|([A-Z]+)([A-Z][a-z])").expect("static regex"));

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "file", "fix", "for",
    "from", "function", "how", "i", "in", "into", "is", "it", "make", "me", "my", "of", "on", "or",
    "please", "so", "that", "the", "this", "to", "update", "use", "where", "which", "with",
];

/// One ranked file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMatch {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub score: u32,
    pub reason: String,
}

/// Split a query into lowercase keywords.
///
/// camelCase and snake_case boundaries split tokens; stop words and
/// single characters are dropped. Order of first appearance is kept.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let spaced = CAMEL_BOUNDARY.replace_all(query, "${1}${3} ${2}${4}");

    spaced
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1 && !STOP_WORDS.contains(&w.as_str()))
        .unique()
        .collect()
}

/// Score one file; returns the score and a comma-joined reason string.
pub fn score_file(info: &FileInfo, query: &str, keywords: &[String]) -> (u32, String) {
    let query = query.trim().to_lowercase();
    let stem = info.stem().to_lowercase();
    let exports: Vec<(String, &str)> = info.exports.iter().map(|e| (e.to_lowercase(), e.as_str())).collect();
    let dirs: Vec<String> = info.dir_segments().map(str::to_lowercase).collect();
    let imports: Vec<String> = info.imports.iter().map(|i| i.to_lowercase()).collect();

    let mut score = 0;
    let mut reasons: Vec<String> = Vec::new();
    let mut matched: BTreeSet<&str> = BTreeSet::new();

    if let Some((_, original)) = exports.iter().find(|(lower, _)| *lower == query) {
        score += 15;
        reasons.push(format!("exports {original}"));
    }

    for kw in keywords {
        if let Some((_, original)) = exports.iter().find(|(lower, _)| lower.contains(kw.as_str())) {
            score += 7;
            reasons.push(format!("export {original} matches '{kw}'"));
            matched.insert(kw);
        }
    }

    if !query.is_empty() && stem == query {
        score += 10;
        reasons.push("file name matches query".to_string());
    } else if !query.is_empty() && stem.contains(&query) {
        score += 5;
        reasons.push("file name contains query".to_string());
    }

    for kw in keywords {
        if stem.contains(kw.as_str()) {
            score += 3;
            reasons.push(format!("file name contains '{kw}'"));
            matched.insert(kw);
        }
        if dirs.iter().any(|d| d.contains(kw.as_str())) {
            score += 4;
            reasons.push(format!("path contains '{kw}'"));
            matched.insert(kw);
        }
        if let Some(import) = imports.iter().find(|i| i.contains(kw.as_str())) {
            score += 2;
            reasons.push(format!("imports {import}"));
            matched.insert(kw);
        }
    }

    if matched.len() >= 2 {
        let bonus = (matched.len() as u32 - 1) * 3;
        score += bonus;
        reasons.push(format!("{} keywords matched", matched.len()));
    }

    (score, reasons.join(", "))
}

/// Read-only queries over an indexed project graph.
pub struct FileFinder<'g> {
    graph: &'g ProjectGraph,
}

impl<'g> FileFinder<'g> {
    pub fn new(graph: &'g ProjectGraph) -> Self {
        Self { graph }
    }

    /// Top `top_k` files with a positive score, best first.
    pub fn find_relevant_files(&self, query: &str, top_k: usize) -> Vec<FileMatch> {
        let keywords = extract_keywords(query);

        let mut matches: Vec<FileMatch> = self
            .graph
            .files
            .values()
            .filter_map(|info| {
                let (score, reason) = score_file(info, query, &keywords);
                (score > 0).then(|| FileMatch {
                    relative_path: info.relative_path.clone(),
                    absolute_path: info.absolute_path.clone(),
                    score,
                    reason,
                })
            })
            .collect();

        // Stable: ties stay in path order
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(top_k);
        matches
    }

    /// First file (in path order) exporting `name`, case-insensitively.
    pub fn find_by_export(&self, name: &str) -> Option<&'g FileInfo> {
        let wanted = name.to_lowercase();
        self.graph
            .files
            .values()
            .find(|f| f.exports.iter().any(|e| e.to_lowercase() == wanted))
    }

    /// Files whose raw imports include `module` exactly.
    pub fn find_files_importing(&self, module: &str) -> Vec<&'g str> {
        self.graph
            .files
            .values()
            .filter(|f| f.imports.contains(module))
            .map(|f| f.relative_path.as_str())
            .collect()
    }

    /// Dependencies and dependents of `path`, deduplicated and sorted.
    pub fn suggest_context_files(&self, path: &str) -> Vec<&'g str> {
        self.graph
            .dependencies_of(path)
            .into_iter()
            .chain(self.graph.dependents_of(path))
            .sorted()
            .dedup()
            .collect()
    }
}

#[derive(Tabled)]
struct MatchRow {
    #[tabled(rename = "Score")]
    score: u32,
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Why")]
    reason: String,
}

/// `vibe find`: index the project and print ranked files.
pub fn run(args: FindArgs, config: &Config, ctx: &AppContext) -> Result<()> {
    let root = crate::infra::io::expand_path(&args.path)?;
    let outcome = incremental_index(&root, config).context("Failed to index project")?;
    let finder = FileFinder::new(&outcome.graph);
    let top_k = args.top_k.unwrap_or(config.finder.top_k);

    let matches = finder.find_relevant_files(&args.query, top_k);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&matches).context("serialize matches")?);
        return Ok(());
    }

    if matches.is_empty() {
        if !ctx.quiet {
            println!("No files match '{}'", args.query);
        }
        return Ok(());
    }

    let rows = matches
        .into_iter()
        .map(|m| MatchRow { score: m.score, file: m.relative_path, reason: m.reason });
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::project::FileKind;

    fn file(path: &str, exports: &[&str], imports: &[&str]) -> FileInfo {
        FileInfo {
            absolute_path: PathBuf::from("/proj").join(path),
            relative_path: path.to_string(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            exports: exports.iter().map(|s| s.to_string()).collect(),
            kind: FileKind::Module,
            line_count: 10,
            modified_at: 0.0,
        }
    }

    #[test]
    fn keywords_split_camel_and_snake_case() {
        assert_eq!(extract_keywords("parseJSONConfig"), vec!["parse", "json", "config"]);
        assert_eq!(extract_keywords("fix the load_user_profile bug"), vec!["load", "user", "profile", "bug"]);
        assert_eq!(extract_keywords("a b c"), Vec::<String>::new());
    }

    #[test]
    fn exact_export_match_scores_highest() {
        let kws = extract_keywords("calculate_tax");
        let (score, reason) = score_file(&file("billing/tax.py", &["calculate_tax"], &[]), "calculate_tax", &kws);
        // 15 exact + 7 per keyword (2) + stem "tax" +3 + bonus 3
        assert_eq!(score, 15 + 14 + 3 + 3);
        assert!(reason.contains("exports calculate_tax"));
    }

    #[test]
    fn stem_and_path_signals() {
        let kws = extract_keywords("auth");
        let (score, _) = score_file(&file("auth.py", &[], &[]), "auth", &kws);
        assert_eq!(score, 10 + 3);

        let (score, _) = score_file(&file("auth/session.py", &[], &[]), "auth", &kws);
        assert_eq!(score, 4);

        let (score, _) = score_file(&file("oauth_client.py", &[], &["requests"]), "auth", &kws);
        assert_eq!(score, 5 + 3);

        let (score, reason) = score_file(&file("views.py", &[], &["auth.tokens"]), "auth", &kws);
        assert_eq!(score, 2);
        assert_eq!(reason, "imports auth.tokens");
    }

    #[test]
    fn finder_ranks_and_truncates() {
        let mut g = ProjectGraph::default();
        g.add_file(file("auth.py", &["login"], &[]));
        g.add_file(file("util.py", &[], &[]));
        g.add_file(file("views.py", &[], &["auth"]));
        let finder = FileFinder::new(&g);

        let found = finder.find_relevant_files("auth", 5);
        let paths: Vec<&str> = found.iter().map(|m| m.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["auth.py", "views.py"]);

        assert_eq!(finder.find_relevant_files("auth", 1).len(), 1);
    }

    #[test]
    fn export_and_import_lookups() {
        let mut g = ProjectGraph::default();
        g.add_file(file("a.py", &["Widget"], &["b"]));
        g.add_file(file("b.py", &[], &[]));
        g.add_file(file("c.py", &[], &["b"]));
        g.add_dependency("a.py", "b.py");
        g.add_dependency("c.py", "b.py");
        g.add_dependency("b.py", "a.py");
        let finder = FileFinder::new(&g);

        assert_eq!(finder.find_by_export("widget").map(|f| f.relative_path.as_str()), Some("a.py"));
        assert!(finder.find_by_export("Gadget").is_none());
        assert_eq!(finder.find_files_importing("b"), vec!["a.py", "c.py"]);
        assert_eq!(finder.suggest_context_files("b.py"), vec!["a.py", "c.py"]);
    }
}
