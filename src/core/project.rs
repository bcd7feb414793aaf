//! Project scanner and mirrored dependency graph.
//!
//! Files are keyed by their project-relative path (always `/`-separated).
//! Every edge insertion updates the forward and reverse maps together, so
//! `b ∈ dependencies[a]` holds exactly when `a ∈ reverse_dependencies[b]`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::infra::config::Config;
use crate::infra::io::{file_mtime, read_source};
use crate::infra::lines::line_count;
use crate::infra::walk::FileWalker;
use crate::parsers::PythonAnalyzer;

/// Single-segment module names that never produce project edges.
pub const STDLIB_MODULES: &[&str] = &[
    "os",
    "sys",
    "json",
    "ast",
    "pathlib",
    "typing",
    "dataclasses",
    "enum",
    "math",
    "datetime",
    "collections",
    "re",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Module,
    Script,
    Test,
    Config,
    Init,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Module => "module",
            FileKind::Script => "script",
            FileKind::Test => "test",
            FileKind::Config => "config",
            FileKind::Init => "init",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "module" => Some(FileKind::Module),
            "script" => Some(FileKind::Script),
            "test" => Some(FileKind::Test),
            "config" => Some(FileKind::Config),
            "init" => Some(FileKind::Init),
            _ => None,
        }
    }

    /// Classify by file name first, then by the presence of a main guard.
    pub fn classify(file_name: &str, has_main_guard: bool) -> Self {
        if file_name == "__init__.py" {
            FileKind::Init
        } else if file_name.starts_with("test_") || file_name.ends_with("_test.py") {
            FileKind::Test
        } else if matches!(file_name, "config.py" | "settings.py" | "configuration.py") {
            FileKind::Config
        } else if has_main_guard {
            FileKind::Script
        } else {
            FileKind::Module
        }
    }
}

/// Per-file facts recorded in the project graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub absolute_path: PathBuf,
    pub relative_path: String,
    pub imports: BTreeSet<String>,
    pub exports: BTreeSet<String>,
    pub kind: FileKind,
    pub line_count: usize,
    /// Seconds since the Unix epoch
    pub modified_at: f64,
}

impl FileInfo {
    /// File name without the `.py` extension.
    pub fn stem(&self) -> &str {
        let name = self.relative_path.rsplit('/').next().unwrap_or(&self.relative_path);
        name.strip_suffix(".py").unwrap_or(name)
    }

    /// Directory segments of the relative path, excluding the file name.
    pub fn dir_segments(&self) -> impl Iterator<Item = &str> {
        let mut parts: Vec<&str> = self.relative_path.split('/').collect();
        parts.pop();
        parts.into_iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectGraph {
    pub files: BTreeMap<String, FileInfo>,
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
    pub reverse_dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl ProjectGraph {
    pub fn add_file(&mut self, info: FileInfo) {
        self.files.insert(info.relative_path.clone(), info);
    }

    /// Record `source -> target` in both directions.
    pub fn add_dependency(&mut self, source: &str, target: &str) {
        self.dependencies
            .entry(source.to_string())
            .or_default()
            .insert(target.to_string());
        self.reverse_dependencies
            .entry(target.to_string())
            .or_default()
            .insert(source.to_string());
    }

    /// Drop a file and every edge touching it.
    pub fn remove_file(&mut self, path: &str) {
        self.files.remove(path);

        if let Some(targets) = self.dependencies.remove(path) {
            for t in targets {
                prune(&mut self.reverse_dependencies, &t, path);
            }
        }
        if let Some(sources) = self.reverse_dependencies.remove(path) {
            for s in sources {
                prune(&mut self.dependencies, &s, path);
            }
        }
    }

    pub fn clear_edges(&mut self) {
        self.dependencies.clear();
        self.reverse_dependencies.clear();
    }

    /// Files `path` imports from.
    pub fn dependencies_of(&self, path: &str) -> Vec<&str> {
        self.dependencies
            .get(path)
            .map(|s| s.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Files importing `path`.
    pub fn dependents_of(&self, path: &str) -> Vec<&str> {
        self.reverse_dependencies
            .get(path)
            .map(|s| s.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(BTreeSet::len).sum()
    }

    /// Check the mirrored-edge invariant in both directions.
    pub fn is_mirrored(&self) -> bool {
        let forward = self
            .dependencies
            .iter()
            .all(|(a, bs)| bs.iter().all(|b| self.reverse_dependencies.get(b).is_some_and(|r| r.contains(a))));
        let backward = self
            .reverse_dependencies
            .iter()
            .all(|(b, as_)| as_.iter().all(|a| self.dependencies.get(a).is_some_and(|d| d.contains(b))));
        forward && backward
    }
}

/// Remove `value` from `map[key]`, dropping the entry once empty.
fn prune(map: &mut BTreeMap<String, BTreeSet<String>>, key: &str, value: &str) {
    if let Some(set) = map.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            map.remove(key);
        }
    }
}

/// Walks a project, analyzes each Python file, and resolves import edges.
pub struct ProjectScanner {
    root: PathBuf,
    walker: FileWalker,
}

impl ProjectScanner {
    pub fn new(root: &Path, config: &Config) -> Result<Self> {
        let root = dunce::canonicalize(root)
            .with_context(|| format!("Failed to resolve project root {}", root.display()))?;

        let walker = FileWalker::new(&config.ignore_patterns)?
            .with_excluded_dirs(&config.exclude_dirs)
            .with_default_types(&["py"])?
            .with_gitignore(config.respect_gitignore);

        Ok(Self { root, walker })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute paths of every Python file currently on disk.
    pub fn source_files(&self) -> Vec<PathBuf> {
        self.walker
            .walk_files(&self.root)
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == "py"))
            .collect()
    }

    /// Project-relative, `/`-separated key for an absolute path.
    pub fn relative_key(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Analyze one file into a `FileInfo`.
    pub fn analyze_file(&self, analyzer: &PythonAnalyzer, path: &Path) -> Result<FileInfo> {
        let content = read_source(path)?;
        let text = content.as_ref();
        let facts = analyzer
            .module_facts(text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

        Ok(FileInfo {
            absolute_path: path.to_path_buf(),
            relative_path: self.relative_key(path),
            imports: facts.imports,
            exports: facts.exports,
            kind: FileKind::classify(file_name, facts.has_main_guard),
            line_count: line_count(text),
            modified_at: file_mtime(path)?,
        })
    }

    /// Analyze many files in parallel. Failures are logged and skipped.
    pub fn analyze_many(&self, paths: &[PathBuf]) -> Vec<FileInfo> {
        paths
            .par_iter()
            .map_init(PythonAnalyzer::new, |analyzer, path| {
                match self.analyze_file(analyzer, path) {
                    Ok(info) => Some(info),
                    Err(err) => {
                        warn!(path = %path.display(), error = %format!("{err:#}"), "skipping file");
                        None
                    }
                }
            })
            .flatten()
            .collect()
    }

    /// Full scan: analyze every file and build all edges.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn scan(&self) -> ProjectGraph {
        let files = self.source_files();
        let mut graph = ProjectGraph::default();

        for info in self.analyze_many(&files) {
            graph.add_file(info);
        }
        build_edges(&mut graph);

        debug!(files = graph.files.len(), edges = graph.edge_count(), "scan complete");
        graph
    }
}

/// Map an import name seen in `source` to a project file, if any.
///
/// Absolute single-segment names on the standard-library allow-list are
/// ignored. Leading dots resolve relative to the importing file's package.
pub fn resolve_import(
    source: &str,
    import: &str,
    files: &BTreeMap<String, FileInfo>,
) -> Option<String> {
    if import.is_empty() || STDLIB_MODULES.contains(&import) {
        return None;
    }

    let base = if import.starts_with('.') {
        let levels = import.chars().take_while(|&c| c == '.').count();
        let suffix = &import[levels..];

        // Directory segments of the importing file
        let mut dir: Vec<&str> = source.split('/').collect();
        dir.pop();
        for _ in 0..levels.saturating_sub(1) {
            dir.pop()?;
        }
        if !suffix.is_empty() {
            dir.extend(suffix.split('.'));
        }
        dir.join("/")
    } else {
        import.replace('.', "/")
    };

    if base.is_empty() {
        return None;
    }

    [format!("{base}.py"), format!("{base}/__init__.py")]
        .into_iter()
        .find(|c| files.contains_key(c))
}

/// Discard and rebuild every edge from the current file set.
pub fn build_edges(graph: &mut ProjectGraph) {
    graph.clear_edges();

    let mut edges: Vec<(String, String)> = Vec::new();
    for (path, info) in &graph.files {
        for import in &info.imports {
            if let Some(target) = resolve_import(path, import, &graph.files)
                && &target != path
            {
                edges.push((path.clone(), target));
            }
        }
    }

    for (source, target) in edges {
        graph.add_dependency(&source, &target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(path: &str, imports: &[&str]) -> FileInfo {
        FileInfo {
            absolute_path: PathBuf::from("/proj").join(path),
            relative_path: path.to_string(),
            imports: imports.iter().map(|s| s.to_string()).collect(),
            exports: BTreeSet::new(),
            kind: FileKind::Module,
            line_count: 1,
            modified_at: 0.0,
        }
    }

    fn graph_of(files: Vec<FileInfo>) -> ProjectGraph {
        let mut g = ProjectGraph::default();
        for f in files {
            g.add_file(f);
        }
        build_edges(&mut g);
        g
    }

    #[test]
    fn classification_rules() {
        assert_eq!(FileKind::classify("__init__.py", true), FileKind::Init);
        assert_eq!(FileKind::classify("test_api.py", false), FileKind::Test);
        assert_eq!(FileKind::classify("api_test.py", true), FileKind::Test);
        assert_eq!(FileKind::classify("settings.py", false), FileKind::Config);
        assert_eq!(FileKind::classify("cli.py", true), FileKind::Script);
        assert_eq!(FileKind::classify("cli.py", false), FileKind::Module);
    }

    #[test]
    fn resolves_module_and_package_candidates() {
        let g = graph_of(vec![
            info("app/main.py", &["app.util", "pkg", "os", "requests"]),
            info("app/util.py", &[]),
            info("pkg/__init__.py", &[]),
        ]);

        assert_eq!(g.dependencies_of("app/main.py"), vec!["app/util.py", "pkg/__init__.py"]);
        assert_eq!(g.dependents_of("app/util.py"), vec!["app/main.py"]);
        assert_eq!(g.edge_count(), 2);
        assert!(g.is_mirrored());
    }

    #[test]
    fn stdlib_names_never_resolve_even_if_shadowed() {
        let g = graph_of(vec![info("main.py", &["json"]), info("json.py", &[])]);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn relative_imports_resolve_from_package_dir() {
        let g = graph_of(vec![
            info("pkg/sub/a.py", &[".b", "..c", "..deep.mod"]),
            info("pkg/sub/b.py", &[]),
            info("pkg/c.py", &[]),
            info("pkg/deep/mod.py", &[]),
        ]);

        assert_eq!(
            g.dependencies_of("pkg/sub/a.py"),
            vec!["pkg/c.py", "pkg/deep/mod.py", "pkg/sub/b.py"]
        );
    }

    #[test]
    fn relative_import_above_root_is_unresolved() {
        let files: BTreeMap<String, FileInfo> =
            [("a.py".to_string(), info("a.py", &[]))].into_iter().collect();
        assert_eq!(resolve_import("a.py", "...x", &files), None);
    }

    #[test]
    fn remove_file_purges_both_directions() {
        let mut g = graph_of(vec![
            info("a.py", &["b"]),
            info("b.py", &["c"]),
            info("c.py", &[]),
        ]);
        assert_eq!(g.edge_count(), 2);

        g.remove_file("b.py");
        assert!(!g.files.contains_key("b.py"));
        assert_eq!(g.edge_count(), 0);
        assert!(g.dependencies.is_empty());
        assert!(g.reverse_dependencies.is_empty());
        assert!(g.is_mirrored());
    }

    #[test]
    fn stem_and_segments() {
        let f = info("src/auth/login_flow.py", &[]);
        assert_eq!(f.stem(), "login_flow");
        assert_eq!(f.dir_segments().collect::<Vec<_>>(), vec!["src", "auth"]);
    }
}
