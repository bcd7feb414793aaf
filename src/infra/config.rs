use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};

/// File name written by `vibe init`.
pub const CONFIG_FILE_NAME: &str = "vibe.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Directory names pruned anywhere in a project scan
    pub exclude_dirs: Vec<String>,

    /// Extra glob patterns pruned during walking
    pub ignore_patterns: Vec<String>,

    /// Honor .gitignore files while scanning
    pub respect_gitignore: bool,

    /// Per-project data directory holding the graph store
    pub data_dir: PathBuf,

    /// Edit routing and repair loop settings
    pub edit: EditConfig,

    /// Compile/execute settings
    pub runner: RunnerConfig,

    /// Chat-completions rewriter settings
    pub rewrite: RewriteConfig,

    /// File finder settings
    pub finder: FinderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditConfig
{
    pub max_iterations: usize,
    /// Files at or below this many lines are edited whole
    pub whole_file_line_limit: usize,
    pub context_block_cap: usize,
    pub exec_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig
{
    pub interpreter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig
{
    /// OpenAI-compatible API base URL
    pub api_base: String,
    pub model: String,
    /// Model used for error-driven refinement (defaults to `model`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refine_model: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig
{
    pub top_k: usize,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self {
            exclude_dirs: [
                "venv",
                "env",
                ".venv",
                "__pycache__",
                ".git",
                "node_modules",
                ".pytest_cache",
                ".vibe",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ignore_patterns: Vec::new(),
            respect_gitignore: false,
            data_dir: PathBuf::from(".vibe"),
            edit: EditConfig::default(),
            runner: RunnerConfig::default(),
            rewrite: RewriteConfig::default(),
            finder: FinderConfig::default(),
        }
    }
}

impl Default for EditConfig
{
    fn default() -> Self
    {
        Self {
            max_iterations: 5,
            whole_file_line_limit: 200,
            context_block_cap: 5,
            exec_timeout_secs: 120,
        }
    }
}

impl Default for RunnerConfig
{
    fn default() -> Self
    {
        Self { interpreter: "python3".to_string() }
    }
}

impl Default for RewriteConfig
{
    fn default() -> Self
    {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            refine_model: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            request_timeout_secs: 120,
        }
    }
}

impl Default for FinderConfig
{
    fn default() -> Self
    {
        Self { top_k: 5 }
    }
}

impl Config
{
    /// Location of the graph store for a project rooted at `root`.
    pub fn store_path(
        &self,
        root: &Path,
    ) -> PathBuf
    {
        root.join(&self.data_dir)
            .join("project.db")
    }
}

pub fn load_config() -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["vibe.toml", "vibe.yaml", "vibe.json", ".vibe.toml"];

    for path in &config_paths
    {
        if Path::new(path).exists()
        {
            builder = builder.add_source(config::File::with_name(path));
            break;
        }
    }

    // VIBE_EDIT__MAX_ITERATIONS=3 style overrides
    builder = builder.add_source(
        config::Environment::with_prefix("VIBE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join(CONFIG_FILE_NAME);

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
