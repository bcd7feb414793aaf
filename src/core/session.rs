//! Edit sessions: single-shot and interactive.
//!
//! Wires the production collaborators into the repair controller, renders
//! the outcome as a unified diff, and applies approved results through the
//! staging sandbox.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;
use similar::TextDiff;
use tracing::{debug, warn};

use crate::cli::AppContext;
use crate::core::finder::FileFinder;
use crate::core::repair::{
    Attempt, CancelToken, EditError, EditMode, EditResult, FallbackReason, RepairController, RepairSettings,
};
use crate::core::rewrite::ChatRewriter;
use crate::core::runner::PythonRunner;
use crate::core::sandbox::{Sandbox, SandboxSession, StagingSandbox};
use crate::core::store::incremental_index;
use crate::infra::config::Config;
use crate::infra::io::{expand_path, read_source};

/// Words that end the interactive loop.
pub const QUIT_TOKENS: &[&str] = &["quit", "exit", "q"];

pub fn is_quit(input: &str) -> bool {
    let input = input.trim();
    QUIT_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(input))
}

/// Unified diff between `old` and `new`, colored unless `color` is false.
pub fn render_diff(label: &str, old: &str, new: &str, color: bool) -> String {
    let diff = TextDiff::from_lines(old, new);
    let text = diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string();

    if !color {
        return text;
    }

    text.lines()
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") {
                line.bold().to_string()
            } else if line.starts_with('+') {
                line.green().to_string()
            } else if line.starts_with('-') {
                line.red().to_string()
            } else if line.starts_with("@@") {
                line.cyan().to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print `prompt` and read one line; `None` on end of input.
fn prompt_line(prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush().context("flush stdout")?;

    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line).context("read stdin")?;
    Ok((read > 0).then(|| line.trim().to_string()))
}

/// Yes/no question. `default` is used for an empty answer or end of input.
fn confirm(question: &str, default: bool) -> Result<bool> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    let answer = prompt_line(&format!("{question} {hint} "))?;
    Ok(match answer.as_deref().map(str::to_lowercase).as_deref() {
        Some("y") | Some("yes") => true,
        Some("n") | Some("no") => false,
        _ => default,
    })
}

fn describe_attempt(attempt: &Attempt, color: bool) -> String {
    let status = if attempt.succeeded {
        if color { "ok".green().to_string() } else { "ok".to_string() }
    } else if color {
        attempt.outcome.label().red().to_string()
    } else {
        attempt.outcome.label().to_string()
    };
    match attempt.target_range {
        Some((start, end)) => format!("  attempt {}: {status} (lines {start}-{end})", attempt.attempt_number),
        None => format!("  attempt {}: {status}", attempt.attempt_number),
    }
}

fn describe_mode(result: &EditResult) -> String {
    let mode = match &result.mode {
        EditMode::WholeFile => "whole file".to_string(),
        EditMode::Chunked { target, start_line, end_line } => {
            format!("block `{target}` (lines {start_line}-{end_line})")
        }
    };
    match result.fallback {
        Some(FallbackReason::NoRelevantBlock) => format!("{mode}; no block matched the instruction"),
        Some(FallbackReason::SpeculativeMergeRejected) => format!("{mode}; block edit could not be merged"),
        None => mode,
    }
}

/// Run one edit of `path` and, when approved, write the result back.
///
/// Returns whether the edit validated. Aborts and exhaustion are reported
/// but are not errors.
pub fn edit_file(instruction: &str, path: &Path, config: &Config, ctx: &AppContext, cancel: &CancelToken) -> Result<bool> {
    let path = expand_path(path)?;
    if !path.is_file() {
        bail!("File not found: {}", path.display());
    }
    let original = read_source(&path)?.as_ref().to_string();
    let color = !ctx.no_color;
    let label = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    let mut rewriter = ChatRewriter::from_config(&config.rewrite)?;
    let mut runner = PythonRunner::new(&config.runner).with_cancel(cancel.clone());
    if let Some(dir) = path.parent() {
        runner = runner.with_search_dir(dir);
    }

    let mut session = SandboxSession::new(StagingSandbox::new()?);

    let outcome = {
        let quiet = ctx.quiet;
        let mut controller = RepairController::new(
            &mut rewriter,
            session.sandbox(),
            &mut runner,
            RepairSettings::from(&config.edit),
        )
        .with_cancel(cancel.clone())
        .on_attempt(move |attempt| {
            if !quiet {
                println!("{}", describe_attempt(attempt, color));
            }
        });
        controller.run(&path, &original, instruction)
    };

    let result = match outcome {
        Ok(result) => result,
        Err(EditError::Aborted) => {
            eprintln!("Aborted; {} is unchanged", path.display());
            session.finish()?;
            return Ok(false);
        }
        Err(err) => return Err(err).with_context(|| format!("Failed to edit {}", path.display())),
    };

    if !ctx.quiet {
        println!("Edited {}", describe_mode(&result));
    }

    if result.final_content == result.original_content {
        if !ctx.quiet {
            println!("No changes");
        }
        session.finish()?;
        return Ok(result.succeeded);
    }

    println!("{}", render_diff(&label, &result.original_content, &result.final_content, color));

    if !result.succeeded {
        println!(
            "Validation failed after {} attempts; manual review required. {} is unchanged.",
            result.iterations.len(),
            path.display()
        );
        session.finish()?;
        return Ok(false);
    }

    if ctx.dry_run {
        println!("Dry run: changes not applied");
    } else if ctx.yes || confirm("Apply these changes?", false)? {
        session.sandbox().apply_to_real_file(&path)?;
        println!("Applied changes to {}", path.display());
    } else {
        println!("Changes discarded");
    }

    session.finish()?;
    Ok(true)
}

/// Pick a target file for `instruction` from the project index.
fn suggest_target(instruction: &str, config: &Config, ctx: &AppContext) -> Result<Option<PathBuf>> {
    let root = std::env::current_dir().context("resolve current directory")?;
    let outcome = incremental_index(&root, config).context("Failed to index project")?;
    let finder = FileFinder::new(&outcome.graph);

    let Some(best) = finder.find_relevant_files(instruction, 1).into_iter().next() else {
        println!("No file in {} matches that instruction", root.display());
        return Ok(None);
    };

    debug!(path = %best.relative_path, score = best.score, "suggested target");
    let accepted = ctx.yes || confirm(&format!("Edit {} ({})?", best.relative_path, best.reason), true)?;
    Ok(accepted.then_some(best.absolute_path))
}

/// Interactive loop over instruction and file path pairs.
pub fn interactive_run(config: &Config, ctx: &AppContext, cancel: &CancelToken) -> Result<()> {
    if !ctx.quiet {
        println!("Enter an instruction and a file path. Type 'quit' to exit; leave the path empty to search.");
    }

    loop {
        let Some(instruction) = prompt_line("instruction> ")? else { break };
        if is_quit(&instruction) {
            break;
        }
        if instruction.is_empty() {
            continue;
        }

        let Some(raw_path) = prompt_line("file> ")? else { break };
        if is_quit(&raw_path) {
            break;
        }

        cancel.reset();
        let target = if raw_path.is_empty() {
            match suggest_target(&instruction, config, ctx) {
                Ok(Some(path)) => path,
                Ok(None) => continue,
                Err(err) => {
                    eprintln!("Error: {err:#}");
                    continue;
                }
            }
        } else {
            PathBuf::from(raw_path)
        };

        if let Err(err) = edit_file(&instruction, &target, config, ctx, cancel) {
            warn!(error = %format!("{err:#}"), "edit failed");
            eprintln!("Error: {err:#}");
        }
    }
    Ok(())
}
