use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
    pub verbose: bool,  // global --verbose
    pub yes: bool,      // global --yes
}

#[derive(Parser)]
#[command(name = "vibe")]
#[command(about = "Edit Python files from natural-language instructions, validating every change before it lands")]
#[command(version, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// What to change, e.g. "add type hints to parse_args"
    pub instruction: Option<String>,

    /// Python file to edit
    pub filepath: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Validate edits but never write them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Apply validated edits without asking
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build or refresh the project dependency index
    Index(IndexArgs),

    /// Rank project files against a query
    Find(FindArgs),

    /// List the top-level blocks of a Python file
    Blocks(BlocksArgs),

    /// Initialize a vibe.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Debug, Args)]
pub struct FindArgs {
    /// Free-text query
    pub query: String,

    /// Project root
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Number of files to show (defaults to finder.top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct BlocksArgs {
    /// Python file to analyze
    pub file: PathBuf,

    /// Rank blocks against this query
    #[arg(short, long)]
    pub query: Option<String>,

    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; required unless --stdout is set
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
