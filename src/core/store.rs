//! SQLite persistence for the project graph and the incremental indexer.
//!
//! Two tables keyed for idempotent re-save: `files` (one row per analyzed
//! file) and `dependencies` (one row per resolved edge). A save replaces
//! both tables inside a single transaction.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, instrument};

use crate::cli::{AppContext, IndexArgs};
use crate::core::project::{FileInfo, FileKind, ProjectGraph, ProjectScanner, build_edges};
use crate::infra::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown file classification '{0}' in store")]
    Classification(String),

    #[error("scan failed: {0}")]
    Scan(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS files (
        relative_path TEXT PRIMARY KEY,
        absolute_path TEXT NOT NULL,
        imports_json TEXT NOT NULL,
        exports_json TEXT NOT NULL,
        classification TEXT NOT NULL,
        line_count INTEGER NOT NULL,
        modified_at REAL NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS dependencies (
        source_relative_path TEXT NOT NULL,
        target_relative_path TEXT NOT NULL,
        PRIMARY KEY (source_relative_path, target_relative_path)
    );",
    "CREATE INDEX IF NOT EXISTS idx_dependencies_target
        ON dependencies(target_relative_path);",
];

/// Persistent store for one project's graph.
pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        Ok(Self { conn })
    }

    pub fn file_count(&self) -> StoreResult<usize> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    /// Replace the stored graph with `graph`.
    pub fn save(&mut self, graph: &ProjectGraph) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM dependencies", [])?;
        tx.execute("DELETE FROM files", [])?;

        {
            let mut insert_file = tx.prepare(
                "INSERT OR REPLACE INTO files(relative_path, absolute_path, imports_json, exports_json, \
                 classification, line_count, modified_at) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for info in graph.files.values() {
                let absolute = info.absolute_path.to_string_lossy().into_owned();
                insert_file.execute(params![
                    info.relative_path,
                    absolute,
                    serde_json::to_string(&info.imports)?,
                    serde_json::to_string(&info.exports)?,
                    info.kind.as_str(),
                    info.line_count as i64,
                    info.modified_at,
                ])?;
            }

            let mut insert_edge = tx.prepare(
                "INSERT OR IGNORE INTO dependencies(source_relative_path, target_relative_path) \
                 VALUES(?1, ?2)",
            )?;
            for (source, targets) in &graph.dependencies {
                for target in targets {
                    insert_edge.execute(params![source, target])?;
                }
            }
        }

        tx.commit()?;
        debug!(files = graph.files.len(), edges = graph.edge_count(), "graph saved");
        Ok(())
    }

    /// Load the stored graph, rebuilding both edge maps from the edge table.
    pub fn load(&self) -> StoreResult<ProjectGraph> {
        let mut graph = ProjectGraph::default();

        let mut stmt = self.conn.prepare(
            "SELECT relative_path, absolute_path, imports_json, exports_json, classification, \
             line_count, modified_at FROM files",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, i64>(5)?,
                r.get::<_, f64>(6)?,
            ))
        })?;

        for row in rows {
            let (relative_path, absolute_path, imports, exports, class, lines, mtime) = row?;
            let kind = FileKind::parse(&class).ok_or(StoreError::Classification(class))?;
            graph.add_file(FileInfo {
                absolute_path: PathBuf::from(absolute_path),
                relative_path,
                imports: serde_json::from_str::<BTreeSet<String>>(&imports)?,
                exports: serde_json::from_str::<BTreeSet<String>>(&exports)?,
                kind,
                line_count: lines.max(0) as usize,
                modified_at: mtime,
            });
        }

        let mut edges = self
            .conn
            .prepare("SELECT source_relative_path, target_relative_path FROM dependencies")?;
        let rows = edges.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        for row in rows {
            let (source, target) = row?;
            graph.add_dependency(&source, &target);
        }

        Ok(graph)
    }

    pub fn get_stored_mtime(&self, relative_path: &str) -> StoreResult<Option<f64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT modified_at FROM files WHERE relative_path = ?1",
                params![relative_path],
                |r| r.get(0),
            )
            .optional()?)
    }

    /// True if the file is unknown or strictly newer than its stored record.
    pub fn needs_update(&self, info: &FileInfo) -> StoreResult<bool> {
        self.is_stale(&info.relative_path, info.modified_at)
    }

    /// `needs_update` for a path whose mtime is known but not yet analyzed.
    pub fn is_stale(&self, relative_path: &str, modified_at: f64) -> StoreResult<bool> {
        Ok(match self.get_stored_mtime(relative_path)? {
            None => true,
            Some(stored) => modified_at > stored,
        })
    }

    pub fn stored_paths(&self) -> StoreResult<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT relative_path FROM files")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }

    /// Delete file rows and every edge touching them.
    pub fn remove_files(&mut self, paths: &[String]) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        for path in paths {
            tx.execute("DELETE FROM files WHERE relative_path = ?1", params![path])?;
            tx.execute(
                "DELETE FROM dependencies WHERE source_relative_path = ?1 OR target_relative_path = ?1",
                params![path],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Release the connection, surfacing any close error.
    pub fn close(self) -> StoreResult<()> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

/// What an `incremental_index` run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// The store was empty and every file was analyzed.
    pub full_scan: bool,
    /// Files (re-)analyzed because they were new or newer on disk.
    pub reanalyzed: usize,
    /// Stored files missing on disk or no longer parseable.
    pub removed: usize,
    /// The graph was re-persisted.
    pub rewritten: bool,
}

#[derive(Debug)]
pub struct IndexOutcome {
    pub graph: ProjectGraph,
    pub stats: IndexStats,
}

/// Refresh the persisted graph for `root`, re-analyzing only what changed.
pub fn incremental_index(root: &Path, config: &Config) -> StoreResult<IndexOutcome> {
    let scanner = ProjectScanner::new(root, config).map_err(|e| StoreError::Scan(format!("{e:#}")))?;
    let mut store = GraphStore::open(&config.store_path(scanner.root()))?;

    let outcome = index_with(&scanner, &mut store);
    store.close()?;
    outcome
}

/// Incremental indexing against an already-open store.
#[instrument(skip_all, fields(root = %scanner.root().display()))]
pub fn index_with(scanner: &ProjectScanner, store: &mut GraphStore) -> StoreResult<IndexOutcome> {
    if store.file_count()? == 0 {
        let graph = scanner.scan();
        store.save(&graph)?;
        info!(files = graph.files.len(), edges = graph.edge_count(), "full scan persisted");
        let stats = IndexStats { full_scan: true, reanalyzed: graph.files.len(), removed: 0, rewritten: true };
        return Ok(IndexOutcome { graph, stats });
    }

    let mut graph = store.load()?;
    let on_disk = scanner.source_files();
    let current: HashSet<String> = on_disk.iter().map(|p| scanner.relative_key(p)).collect();

    // Deletions
    let mut removed: Vec<String> = store.stored_paths()?.difference(&current).cloned().collect();

    // New or modified files, judged by mtime before any parsing
    let mut stale: Vec<PathBuf> = Vec::new();
    for path in &on_disk {
        let key = scanner.relative_key(path);
        let mtime = crate::infra::io::file_mtime(path).map_err(|e| StoreError::Scan(format!("{e:#}")))?;
        if store.is_stale(&key, mtime)? {
            stale.push(path.clone());
        }
    }

    let refreshed = scanner.analyze_many(&stale);
    let refreshed_keys: HashSet<&str> = refreshed.iter().map(|f| f.relative_path.as_str()).collect();

    // A stored file that no longer parses leaves the graph
    for path in &stale {
        let key = scanner.relative_key(path);
        if !refreshed_keys.contains(key.as_str()) && graph.files.contains_key(&key) {
            removed.push(key);
        }
    }
    removed.sort();
    removed.dedup();

    if removed.is_empty() && refreshed.is_empty() {
        debug!(files = graph.files.len(), "index up to date");
        return Ok(IndexOutcome { graph, stats: IndexStats::default() });
    }

    store.remove_files(&removed)?;
    for key in &removed {
        graph.remove_file(key);
    }

    let reanalyzed = refreshed.len();
    for info in refreshed {
        graph.add_file(info);
    }

    // One file's imports can change resolution for others: rebuild all edges
    build_edges(&mut graph);
    store.save(&graph)?;

    info!(reanalyzed, removed = removed.len(), edges = graph.edge_count(), "index refreshed");
    Ok(IndexOutcome {
        graph,
        stats: IndexStats { full_scan: false, reanalyzed, removed: removed.len(), rewritten: true },
    })
}

/// `vibe index`: refresh the project index and report what changed.
pub fn run(args: IndexArgs, config: &Config, ctx: &AppContext) -> anyhow::Result<()> {
    let root = crate::infra::io::expand_path(&args.path)?;

    let spinner = if ctx.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };
    spinner.set_message(format!("Indexing {}", root.display()));

    let outcome = incremental_index(&root, config).context("Failed to index project")?;
    spinner.finish_and_clear();

    if ctx.quiet {
        return Ok(());
    }

    let IndexOutcome { graph, stats } = outcome;
    if stats.full_scan {
        println!("Indexed {} files, {} dependencies", graph.files.len(), graph.edge_count());
    } else if stats.rewritten {
        println!(
            "Re-analyzed {} files, removed {}; {} files, {} dependencies",
            stats.reanalyzed,
            stats.removed,
            graph.files.len(),
            graph.edge_count()
        );
    } else {
        println!("Index up to date ({} files)", graph.files.len());
    }
    Ok(())
}
