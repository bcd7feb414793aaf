//! Project scanning: classification, exports, import resolution.

mod util;

use anyhow::Result;
use assert_fs::prelude::*;
use vibecode::core::{FileFinder, FileKind, ProjectScanner};
use vibecode::infra::Config;

#[test]
fn scan_classifies_and_resolves() -> Result<()> {
    let tmp = util::make_python_project();
    let scanner = ProjectScanner::new(tmp.path(), &Config::default())?;
    let graph = scanner.scan();

    assert_eq!(graph.files["app/__init__.py"].kind, FileKind::Init);
    assert_eq!(graph.files["main.py"].kind, FileKind::Script);
    assert_eq!(graph.files["app/auth.py"].kind, FileKind::Module);

    let auth = &graph.files["app/auth.py"];
    assert!(auth.imports.contains("os"));
    assert!(auth.imports.contains(".models"));
    assert!(auth.exports.contains("login"));
    assert_eq!(auth.line_count, 7);

    assert_eq!(graph.edge_count(), 2);
    assert!(graph.is_mirrored());
    Ok(())
}

#[test]
fn excluded_and_non_python_files_are_skipped() -> Result<()> {
    let tmp = util::make_python_project();
    tmp.child("venv/lib/site.py").write_str("x = 1\n")?;
    tmp.child("__pycache__/auth.cpython-312.py").write_str("x = 1\n")?;
    tmp.child("README.md").write_str("# readme\n")?;
    tmp.child("stubs/auth.pyi").write_str("def login(name: str) -> None: ...\n")?;

    let scanner = ProjectScanner::new(tmp.path(), &Config::default())?;
    let files: Vec<String> = scanner
        .source_files()
        .iter()
        .map(|p| scanner.relative_key(p))
        .collect();

    assert_eq!(files, vec!["app/__init__.py", "app/auth.py", "app/models.py", "main.py"]);
    Ok(())
}

#[test]
fn package_imports_resolve_to_init() -> Result<()> {
    let tmp = util::make_python_project();
    tmp.child("cli.py").write_str("import app\nfrom . import main\n")?;

    let graph = ProjectScanner::new(tmp.path(), &Config::default())?.scan();

    assert_eq!(graph.dependencies_of("cli.py"), vec!["app/__init__.py"]);
    assert!(graph.is_mirrored());
    Ok(())
}

#[test]
fn unparseable_files_are_left_out_of_a_scan() -> Result<()> {
    let tmp = util::make_python_project();
    tmp.child("broken.py").write_str("def oops(:\n")?;

    let graph = ProjectScanner::new(tmp.path(), &Config::default())?.scan();

    assert!(!graph.files.contains_key("broken.py"));
    assert_eq!(graph.files.len(), 4);
    Ok(())
}

#[test]
fn context_suggestions_follow_both_directions() -> Result<()> {
    let tmp = util::make_python_project();
    let graph = ProjectScanner::new(tmp.path(), &Config::default())?.scan();
    let finder = FileFinder::new(&graph);

    assert_eq!(finder.suggest_context_files("app/auth.py"), vec!["app/models.py", "main.py"]);
    assert_eq!(finder.find_files_importing("app.auth"), vec!["main.py"]);
    assert_eq!(
        finder.find_by_export("user").map(|f| f.relative_path.as_str()),
        Some("app/models.py")
    );
    Ok(())
}
