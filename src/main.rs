use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vibecode::cli::{AppContext, Cli, Commands};
use vibecode::core::CancelToken;

/// stderr logging; `VIBE_LOG` wins over `--verbose`
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "vibecode=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("VIBE_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
        verbose: cli.verbose,
        yes: cli.yes,
    };

    let config = vibecode::load_config()?;

    // First Ctrl-C aborts the running edit; a second one exits
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            std::process::exit(130);
        }
        handler_token.cancel();
    })
    .context("install Ctrl-C handler")?;

    match cli.command {
        Some(Commands::Index(args)) => vibecode::core::index_run(args, &config, &ctx),
        Some(Commands::Find(args)) => vibecode::core::find_run(args, &config, &ctx),
        Some(Commands::Blocks(args)) => vibecode::core::blocks_run(args, &ctx),
        Some(Commands::Init(args)) => vibecode::infra::config::init(args, &ctx),
        Some(Commands::Completions(args)) => vibecode::completion::run(args, &ctx),
        None => match (cli.instruction, cli.filepath) {
            (Some(instruction), Some(path)) => {
                vibecode::core::edit_file(&instruction, &path, &config, &ctx, &cancel).map(|_| ())
            }
            (None, None) => vibecode::core::interactive_run(&config, &ctx, &cancel),
            _ => anyhow::bail!("Usage: vibe <INSTRUCTION> <FILEPATH>, or vibe with no arguments for interactive mode"),
        },
    }
}
