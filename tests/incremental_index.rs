//! Incremental indexing against the on-disk store.

mod util;

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use assert_fs::prelude::*;
use vibecode::core::{IndexStats, incremental_index};
use vibecode::infra::Config;

/// Rewrite `path` and push its mtime forward so the change is visible
/// regardless of filesystem timestamp granularity.
fn touch_with(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content)?;
    File::options()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now() + Duration::from_secs(10))?;
    Ok(())
}

#[test]
fn first_run_is_a_full_scan() -> Result<()> {
    let tmp = util::make_python_project();
    let outcome = incremental_index(tmp.path(), &Config::default())?;

    assert!(outcome.stats.full_scan);
    assert!(outcome.stats.rewritten);
    assert_eq!(outcome.stats.reanalyzed, 4);

    let graph = outcome.graph;
    assert_eq!(
        graph.files.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["app/__init__.py", "app/auth.py", "app/models.py", "main.py"]
    );
    assert_eq!(graph.dependencies_of("main.py"), vec!["app/auth.py"]);
    assert_eq!(graph.dependencies_of("app/auth.py"), vec!["app/models.py"]);
    assert_eq!(graph.dependents_of("app/models.py"), vec!["app/auth.py"]);
    assert!(graph.is_mirrored());
    tmp.child(".vibe/project.db")
        .assert(predicates::path::exists());
    Ok(())
}

#[test]
fn unchanged_project_is_not_rewritten() -> Result<()> {
    let tmp = util::make_python_project();
    let config = Config::default();

    let first = incremental_index(tmp.path(), &config)?;
    let second = incremental_index(tmp.path(), &config)?;

    assert_eq!(second.stats, IndexStats::default());
    assert_eq!(second.graph, first.graph);
    Ok(())
}

#[test]
fn modified_file_is_reanalyzed_and_edges_rebuilt() -> Result<()> {
    let tmp = util::make_python_project();
    let config = Config::default();
    incremental_index(tmp.path(), &config)?;

    touch_with(&tmp.path().join("app/auth.py"), "def login(name):\n    return name\n")?;
    let outcome = incremental_index(tmp.path(), &config)?;

    assert!(!outcome.stats.full_scan);
    assert_eq!(outcome.stats.reanalyzed, 1);
    assert_eq!(outcome.stats.removed, 0);
    assert!(outcome.graph.dependencies_of("app/auth.py").is_empty());
    assert!(outcome.graph.dependents_of("app/models.py").is_empty());
    assert_eq!(outcome.graph.dependencies_of("main.py"), vec!["app/auth.py"]);
    assert!(outcome.graph.is_mirrored());

    // And the next run sees nothing new
    let again = incremental_index(tmp.path(), &config)?;
    assert_eq!(again.stats, IndexStats::default());
    assert_eq!(again.graph, outcome.graph);
    Ok(())
}

#[test]
fn deleted_file_leaves_graph_and_edges() -> Result<()> {
    let tmp = util::make_python_project();
    let config = Config::default();
    incremental_index(tmp.path(), &config)?;

    fs::remove_file(tmp.path().join("app/models.py"))?;
    let outcome = incremental_index(tmp.path(), &config)?;

    assert_eq!(outcome.stats.removed, 1);
    assert!(!outcome.graph.files.contains_key("app/models.py"));
    assert!(outcome.graph.dependencies_of("app/auth.py").is_empty());
    assert!(outcome.graph.is_mirrored());
    Ok(())
}

#[test]
fn new_file_gains_edges() -> Result<()> {
    let tmp = util::make_python_project();
    let config = Config::default();
    incremental_index(tmp.path(), &config)?;

    tmp.child("app/views.py")
        .write_str("from app.models import User\n\n\ndef show(name):\n    return User(name)\n")?;
    let outcome = incremental_index(tmp.path(), &config)?;

    assert_eq!(outcome.stats.reanalyzed, 1);
    assert_eq!(outcome.graph.files.len(), 5);
    assert_eq!(
        outcome.graph.dependents_of("app/models.py"),
        vec!["app/auth.py", "app/views.py"]
    );
    Ok(())
}

#[test]
fn file_that_stops_parsing_is_dropped() -> Result<()> {
    let tmp = util::make_python_project();
    let config = Config::default();
    incremental_index(tmp.path(), &config)?;

    touch_with(&tmp.path().join("app/models.py"), "class User(:\n")?;
    let outcome = incremental_index(tmp.path(), &config)?;

    assert_eq!(outcome.stats.removed, 1);
    assert!(!outcome.graph.files.contains_key("app/models.py"));
    assert!(outcome.graph.dependents_of("app/models.py").is_empty());

    let again = incremental_index(tmp.path(), &config)?;
    assert_eq!(again.stats, IndexStats::default());
    Ok(())
}
