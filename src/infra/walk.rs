//! Filepath: src/infra/walk.rs
//! Project file walker for the scanner.
//! - Prunes excluded directory names anywhere below the root
//! - Extra ignore globs (early prune + late filter)
//! - Optional file type filtering (e.g., "py")
//! - Optional .gitignore support (off unless configured)
//! - Deterministic ordering for stable tests/CI
//!
//! Backed by ripgrep's `ignore` crate and `globset`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::{
    DirEntry, WalkBuilder,
    types::{Types, TypesBuilder},
};

/// Walker with excluded directory names, extra ignore globs and filters.
/// Extra globs are applied in two places:
///   1) Early: prune directories during traversal (filter_entry).
///   2) Late: filter out files that still slipped through.
pub struct FileWalker
{
    /// Compiled set of additional ignore patterns
    ignore_patterns: GlobSet,

    /// Directory names pruned at any depth below the root
    excluded_dirs: HashSet<String>,

    /// Optional file type matcher ("py", etc.)
    file_types: Option<Types>,

    /// Honor .gitignore / .git/info/exclude / global gitignore
    respect_gitignore: bool,
}

impl FileWalker
{
    /// Build a walker with additional ignore patterns (e.g., "build/**",
    /// "**/migrations/**"). Patterns match on paths relative to the root.
    pub fn new(additional_ignores: &[String]) -> Result<Self>
    {
        let mut builder = GlobSetBuilder::new();

        for pattern in additional_ignores
        {
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self {
            ignore_patterns: builder.build()?,
            excluded_dirs: HashSet::new(),
            file_types: None,
            respect_gitignore: false,
        })
    }

    /// Prune any directory whose name is in `names`.
    pub fn with_excluded_dirs(
        mut self,
        names: &[String],
    ) -> Self
    {
        self.excluded_dirs = names
            .iter()
            .cloned()
            .collect();
        self
    }

    /// Restrict walking to a set of **default** file types by name.
    /// Example: `with_default_types(&["py"])`
    pub fn with_default_types(
        mut self,
        names: &[&str],
    ) -> Result<Self>
    {
        let mut tb = TypesBuilder::new();

        // Load default file types
        tb.add_defaults();

        for n in names
        {
            tb.select(n);
        }

        self.file_types = Some(tb.build()?);

        Ok(self)
    }

    /// Honor gitignore rules (default false).
    pub fn with_gitignore(
        mut self,
        respect: bool,
    ) -> Self
    {
        self.respect_gitignore = respect;
        self
    }

    /// Internal: construct a configured WalkBuilder for `root`.
    fn build_walk(
        &self,
        root: &Path,
    ) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(root);

        // Dotfiles are scanned; excluded names handle .git/.venv/.vibe
        b.hidden(false);

        b.git_ignore(self.respect_gitignore);
        b.git_global(self.respect_gitignore);
        b.git_exclude(self.respect_gitignore);
        b.ignore(self.respect_gitignore);
        b.parents(self.respect_gitignore);
        b.require_git(false);

        // Early directory pruning (fast short-circuit).
        let extra = self
            .ignore_patterns
            .clone();
        let excluded = self
            .excluded_dirs
            .clone();
        let root_owned = root.to_path_buf();
        b.filter_entry(move |ent: &DirEntry| {
            // Never prune the root itself
            if ent.depth() == 0
            {
                return true;
            }

            // Be conservative on unknown types.
            let is_dir = ent
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);
            if !is_dir
            {
                return true;
            }

            let named_excluded = ent
                .file_name()
                .to_str()
                .is_some_and(|n| excluded.contains(n));
            let rel = ent
                .path()
                .strip_prefix(&root_owned)
                .unwrap_or(ent.path());

            !(named_excluded || extra.is_match(rel))
        });

        // Optional file type filtering (runs after ignore checks).
        if let Some(t) = &self.file_types
        {
            b.types(t.clone());
        }

        b
    }

    /// Traverse files under `root`, respecting exclusions and extra globs.
    /// Returns a **sorted** list of file paths for determinism.
    pub fn walk_files<P: AsRef<Path>>(
        &self,
        root: P,
    ) -> Vec<PathBuf>
    {
        let root_path = root.as_ref();
        let walker = self
            .build_walk(root_path)
            .build();

        let mut out: Vec<PathBuf> = walker
            // Drop entries with IO errors
            .filter_map(|res| res.ok())
            // Keep only regular files
            .filter(|entry| {
                entry
                    .file_type()
                    .is_some_and(|ft| ft.is_file())
            })
            // Convert to owned path
            .map(|entry| entry.into_path())
            // Late file-level extra ignore filtering using RELATIVE path
            .filter(|abs| {
                let rel = abs
                    .strip_prefix(root_path)
                    .unwrap_or(abs);
                !self
                    .ignore_patterns
                    .is_match(rel)
            })
            .collect();

        // Deterministic order (stable CLI & tests)
        out.sort();

        out
    }
}

#[cfg(test)]
mod tests
{
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    /// Create a file with parent dirs as needed
    fn write_file(
        root: &Path,
        rel: &str,
        contents: &str,
    ) -> Result<()>
    {
        let path = root.join(rel);
        if let Some(parent) = path.parent()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn relative(
        root: &Path,
        files: Vec<PathBuf>,
    ) -> Vec<PathBuf>
    {
        files
            .into_iter()
            .filter_map(|p| {
                p.strip_prefix(root)
                    .ok()
                    .map(Path::to_path_buf)
            })
            .collect()
    }

    #[test]
    fn excluded_dir_names_are_pruned_at_any_depth() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();

        write_file(root, "app/main.py", "x = 1")?;
        write_file(root, "app/__pycache__/main.cpython.pyc", "bin")?;
        write_file(root, "venv/lib/site.py", "y = 2")?;
        write_file(root, "pkg/venv/inner.py", "z = 3")?;

        let walker = FileWalker::new(&[])?
            .with_excluded_dirs(&["venv".to_string(), "__pycache__".to_string()]);
        let files = relative(root, walker.walk_files(root));

        assert_eq!(files, vec![PathBuf::from("app/main.py")]);
        Ok(())
    }

    #[test]
    fn python_type_filter_and_globs() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();

        write_file(root, "a.py", "a = 1")?;
        write_file(root, "README.md", "# readme")?;
        write_file(root, "build/gen.py", "g = 1")?;

        let walker = FileWalker::new(&["build/**".to_string()])?.with_default_types(&["py"])?;
        let files = relative(root, walker.walk_files(root));

        assert_eq!(files, vec![PathBuf::from("a.py")]);
        Ok(())
    }

    #[test]
    fn gitignore_is_opt_in() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();

        write_file(root, ".gitignore", "skipped.py\n")?;
        write_file(root, "skipped.py", "s = 1")?;
        write_file(root, "kept.py", "k = 1")?;

        let plain = FileWalker::new(&[])?.with_default_types(&["py"])?;
        assert_eq!(plain.walk_files(root).len(), 2);

        let honoring = FileWalker::new(&[])?
            .with_default_types(&["py"])?
            .with_gitignore(true);
        let files = relative(root, honoring.walk_files(root));
        assert_eq!(files, vec![PathBuf::from("kept.py")]);
        Ok(())
    }
}
