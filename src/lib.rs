//! **vibecode** - natural-language edits for Python files, validated before they land
//!
//! Small files are rewritten whole; larger ones are edited one top-level block at a time
//! and spliced back by line range. Every candidate is compiled and executed in a staging
//! sandbox, and failures feed a bounded repair loop.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Core pipeline - block analysis, merging, the repair loop and project indexing
pub mod core {
    /// Top-level block model, relevance ranking and context assembly
    pub mod blocks;
    pub use blocks::{Block, BlockKind, run as blocks_run};

    /// Line-range splicing of rewritten blocks into the original text
    pub mod merge;
    pub use merge::{MergeError, merge_many, merge_one};

    /// Rewrite collaborator and the chat-completions client
    pub mod rewrite;
    pub use rewrite::{ChatRewriter, RewriteRequest, RewriteScope, Rewriter};

    /// Staging sandbox and its scoped session guard
    pub mod sandbox;
    pub use sandbox::{Sandbox, SandboxSession, StagingSandbox};

    /// Compile/execute collaborator with timeouts
    pub mod runner;
    pub use runner::{Executor, PythonRunner, RunOutcome};

    /// Edit router and bounded repair state machine
    pub mod repair;
    pub use repair::{CancelToken, EditError, EditMode, EditResult, RepairController, RepairSettings};

    /// Single-shot and interactive edit sessions
    pub mod session;
    pub use session::{edit_file, interactive_run};

    /// Project scanning and the file dependency graph
    pub mod project;
    pub use project::{FileInfo, FileKind, ProjectGraph, ProjectScanner};

    /// SQLite graph store and incremental indexing
    pub mod store;
    pub use store::{GraphStore, IndexStats, incremental_index, run as index_run};

    /// Keyword relevance ranking over indexed files
    pub mod finder;
    pub use finder::{FileFinder, FileMatch, run as find_run};
}

/// Language processing - tree-sitter analysis of Python sources
pub mod parsers {
    /// Python block extraction and module facts
    pub mod python_parser;
    pub use python_parser::{AnalyzeError, ModuleFacts, PythonAnalyzer};
}

/// Infrastructure - Configuration, I/O, and utilities
pub mod infra {
    /// Layered configuration (file + VIBE_* environment)
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Memory-mapped reads, mtimes and atomic writes
    pub mod io;
    pub use io::{FileContent, read_source, write_atomic};

    /// Newline-preserving 1-based line tables
    pub mod lines;
    pub use lines::{SourceLines, line_count};

    /// Gitignore-aware directory walking
    pub mod walk;
    pub use walk::FileWalker;

    /// Tree-sitter and docstring helpers
    pub mod utils;
}

pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, load_config};
