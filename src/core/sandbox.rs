//! Staging sandbox: candidates are written and validated here before they
//! ever touch the real file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::infra::io::write_atomic;

/// Staging area collaborator.
pub trait Sandbox {
    /// Stage `content` for the real file `path`; returns the staged location.
    fn write(&mut self, path: &Path, content: &str) -> Result<PathBuf>;

    /// Staged content for `path`.
    fn read(&self, path: &Path) -> Result<String>;

    /// Copy the staged content for `path` over the real file.
    fn apply_to_real_file(&mut self, path: &Path) -> Result<()>;

    /// Release every session resource. Called exactly once per session.
    fn close(&mut self) -> Result<()>;
}

/// Sandbox backed by a private temporary directory.
///
/// Each real file is staged under its own numbered subdirectory with its
/// original file name, so relative imports of siblings still resolve
/// through `PYTHONPATH` pointing at the real directory.
pub struct StagingSandbox {
    dir: Option<TempDir>,
    staged: HashMap<PathBuf, PathBuf>,
}

impl StagingSandbox {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("vibe-stage-")
            .tempdir()
            .context("create staging directory")?;
        debug!(dir = %dir.path().display(), "sandbox opened");
        Ok(Self { dir: Some(dir), staged: HashMap::new() })
    }

    fn root(&self) -> Result<&Path> {
        self.dir
            .as_ref()
            .map(TempDir::path)
            .ok_or_else(|| anyhow!("sandbox is closed"))
    }
}

impl Sandbox for StagingSandbox {
    fn write(&mut self, path: &Path, content: &str) -> Result<PathBuf> {
        let staged = match self.staged.get(path) {
            Some(p) => p.clone(),
            None => {
                let slot = self.root()?.join(self.staged.len().to_string());
                fs::create_dir_all(&slot).context("create staging slot")?;
                let name = path
                    .file_name()
                    .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
                slot.join(name)
            }
        };

        fs::write(&staged, content)
            .with_context(|| format!("stage {}", path.display()))?;
        self.staged.insert(path.to_path_buf(), staged.clone());
        Ok(staged)
    }

    fn read(&self, path: &Path) -> Result<String> {
        let staged = self
            .staged
            .get(path)
            .ok_or_else(|| anyhow!("{} has not been staged", path.display()))?;
        fs::read_to_string(staged).with_context(|| format!("read staged {}", path.display()))
    }

    fn apply_to_real_file(&mut self, path: &Path) -> Result<()> {
        let content = self.read(path)?;
        write_atomic(path, content.as_bytes())
            .with_context(|| format!("apply staged content to {}", path.display()))
    }

    fn close(&mut self) -> Result<()> {
        self.staged.clear();
        match self.dir.take() {
            Some(dir) => dir.close().context("remove staging directory"),
            None => Ok(()),
        }
    }
}

/// Scoped sandbox session: `close` runs exactly once, explicitly through
/// `finish` or from `Drop` on early returns and panics.
pub struct SandboxSession<S: Sandbox> {
    inner: S,
    closed: bool,
}

impl<S: Sandbox> SandboxSession<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, closed: false }
    }

    pub fn sandbox(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Close now and report the result.
    pub fn finish(mut self) -> Result<()> {
        self.closed = true;
        self.inner.close()
    }
}

impl<S: Sandbox> Drop for SandboxSession<S> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(err) = self.inner.close() {
                warn!(error = %format!("{err:#}"), "sandbox close failed");
            }
        }
    }
}
