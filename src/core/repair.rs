//! Edit router and bounded repair controller.
//!
//! One edit operation is a synchronous state machine:
//!
//! ```text
//! Start -> Planning -> Validating -> Success
//!                          |  ^
//!                          v  |
//!                       Refining  -> ... -> Exhausted
//! ```
//!
//! Small files are rewritten whole. Larger files are edited one top-level
//! block at a time: the best-ranked block and its context go to the
//! rewriter, and only the returned target definition is spliced back over
//! the target's original line range. Every refined chunk is merged into the
//! pristine original text, which is the current layout because nothing
//! outside the target range ever changes.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::blocks::{Block, assemble_context, context_text, rank_blocks};
use crate::core::merge::{MergeError, merge_one, validate};
use crate::core::rewrite::{RewriteRequest, RewriteScope, Rewriter, strip_code_fences};
use crate::core::runner::{Executor, RunOutcome};
use crate::core::sandbox::Sandbox;
use crate::infra::config::EditConfig;
use crate::infra::lines::line_count;
use crate::parsers::{AnalyzeError, PythonAnalyzer};

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("cannot analyze target file: {0}")]
    Parse(#[from] AnalyzeError),

    #[error("rewrite failed: {0:#}")]
    Rewrite(anyhow::Error),

    #[error("sandbox failed: {0:#}")]
    Sandbox(anyhow::Error),

    #[error("validation could not run: {0:#}")]
    Executor(anyhow::Error),

    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("edit aborted by user")]
    Aborted,
}

/// Shared flag set from the interrupt handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation before the next operation.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairState {
    Start,
    Planning,
    Validating,
    Refining,
    Success,
    Exhausted,
}

/// How one candidate fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Passed,
    /// The rewriter produced no code at all.
    Empty,
    CompileFailed(RunOutcome),
    ExecutionFailed(RunOutcome),
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, ValidationOutcome::Passed)
    }

    /// Text handed to the next refinement request.
    pub fn error_report(&self) -> Option<String> {
        match self {
            ValidationOutcome::Passed => None,
            ValidationOutcome::Empty => Some("The previous response contained no code.".to_string()),
            ValidationOutcome::CompileFailed(run) | ValidationOutcome::ExecutionFailed(run) => {
                Some(run.error_report())
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ValidationOutcome::Passed => "passed",
            ValidationOutcome::Empty => "empty response",
            ValidationOutcome::CompileFailed(_) => "compile failed",
            ValidationOutcome::ExecutionFailed(_) => "execution failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based
    pub attempt_number: usize,
    /// Full file text that was staged and validated.
    pub candidate_content: String,
    /// Live line range of the edited block, in chunked mode.
    pub target_range: Option<(usize, usize)>,
    pub outcome: ValidationOutcome,
    pub succeeded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditMode {
    WholeFile,
    Chunked { target: String, start_line: usize, end_line: usize },
}

/// Why chunked editing degraded to whole-file editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    NoRelevantBlock,
    SpeculativeMergeRejected,
}

#[derive(Debug, Clone)]
pub struct EditResult {
    pub original_content: String,
    /// Successful candidate, or the last candidate tried when exhausted.
    pub final_content: String,
    pub iterations: Vec<Attempt>,
    pub succeeded: bool,
    pub mode: EditMode,
    pub fallback: Option<FallbackReason>,
}

#[derive(Debug, Clone)]
pub struct RepairSettings {
    pub max_iterations: usize,
    pub whole_file_line_limit: usize,
    pub context_block_cap: usize,
    pub exec_timeout: Duration,
}

impl From<&EditConfig> for RepairSettings {
    fn from(cfg: &EditConfig) -> Self {
        Self {
            max_iterations: cfg.max_iterations,
            whole_file_line_limit: cfg.whole_file_line_limit,
            context_block_cap: cfg.context_block_cap,
            exec_timeout: Duration::from_secs(cfg.exec_timeout_secs),
        }
    }
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self::from(&EditConfig::default())
    }
}

/// Routing decision for one operation.
enum Route {
    WholeFile,
    Chunk(Block),
}

/// Keep only the target definition from a rewritten fragment.
///
/// If the fragment parses and contains a block of the target's kind and
/// name, that block's text is returned; otherwise the fragment is used
/// unchanged and left for validation to judge.
pub fn isolate_target(analyzer: &PythonAnalyzer, fragment: &str, target: &Block) -> String {
    analyzer
        .parse(fragment)
        .ok()
        .and_then(|blocks| {
            blocks
                .into_iter()
                .find(|b| b.kind == target.kind && b.name == target.name)
        })
        .map(|b| b.content)
        .unwrap_or_else(|| fragment.trim_end().to_string())
}

/// Drives one edit operation across the rewrite, sandbox, and executor
/// collaborators.
pub struct RepairController<'a> {
    rewriter: &'a mut dyn Rewriter,
    sandbox: &'a mut dyn Sandbox,
    executor: &'a mut dyn Executor,
    settings: RepairSettings,
    analyzer: PythonAnalyzer,
    cancel: CancelToken,
    observer: Option<Box<dyn FnMut(&Attempt) + 'a>>,
}

impl<'a> RepairController<'a> {
    pub fn new(
        rewriter: &'a mut dyn Rewriter,
        sandbox: &'a mut dyn Sandbox,
        executor: &'a mut dyn Executor,
        settings: RepairSettings,
    ) -> Self {
        Self {
            rewriter,
            sandbox,
            executor,
            settings,
            analyzer: PythonAnalyzer::new(),
            cancel: CancelToken::new(),
            observer: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called with each attempt as soon as it is validated.
    pub fn on_attempt(mut self, observer: impl FnMut(&Attempt) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn check_cancel(&self) -> Result<(), EditError> {
        if self.cancel.is_cancelled() { Err(EditError::Aborted) } else { Ok(()) }
    }

    /// Whole-file mode at or below the line limit, chunked above it.
    pub fn uses_whole_file(&self, original: &str) -> bool {
        line_count(original) <= self.settings.whole_file_line_limit
    }

    fn rewrite(&mut self, request: &RewriteRequest<'_>) -> Result<String, EditError> {
        let raw = self.rewriter.rewrite(request).map_err(EditError::Rewrite)?;
        Ok(strip_code_fences(&raw))
    }

    /// Rewrite the target's context and splice the returned definition back.
    ///
    /// An empty definition yields an empty candidate rather than a merge
    /// that deletes the target's lines.
    fn rewrite_chunk(
        &mut self,
        original: &str,
        target: &Block,
        request: &RewriteRequest<'_>,
    ) -> Result<(String, String), EditError> {
        let fragment = self.rewrite(request)?;
        let chunk = isolate_target(&self.analyzer, &fragment, target);
        if chunk.trim().is_empty() {
            return Ok((chunk, String::new()));
        }
        let merged = merge_one(original, &target.with_content(chunk.as_str()))?;
        Ok((chunk, merged))
    }

    /// Stage, compile, and (if it compiles) execute a candidate.
    fn validate_candidate(&mut self, path: &Path, candidate: &str) -> Result<ValidationOutcome, EditError> {
        if candidate.trim().is_empty() {
            return Ok(ValidationOutcome::Empty);
        }

        let staged = self.sandbox.write(path, candidate).map_err(EditError::Sandbox)?;

        let compiled = self.executor.compile(&staged).map_err(EditError::Executor)?;
        if !compiled.success {
            return Ok(ValidationOutcome::CompileFailed(compiled));
        }

        self.check_cancel()?;
        let run = self
            .executor
            .execute(&staged, self.settings.exec_timeout)
            .map_err(EditError::Executor)?;
        self.check_cancel()?;

        Ok(if run.success { ValidationOutcome::Passed } else { ValidationOutcome::ExecutionFailed(run) })
    }

    /// Choose the target block for chunked mode, if any block is relevant.
    fn plan_chunk(&self, original: &str, instruction: &str) -> Result<Option<Block>, EditError> {
        let blocks = self.analyzer.parse(original)?;
        Ok(rank_blocks(&blocks, instruction)
            .first()
            .map(|(block, _)| (*block).clone()))
    }

    /// Run one edit operation on `path`, whose current text is `original`.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn run(&mut self, path: &Path, original: &str, instruction: &str) -> Result<EditResult, EditError> {
        let max = self.settings.max_iterations;

        let mut state = RepairState::Start;
        let mut route = Route::WholeFile;
        let mut fallback: Option<FallbackReason> = None;
        let mut attempts: Vec<Attempt> = Vec::new();

        // Current full-file candidate and, in chunked mode, the current chunk
        let mut candidate = String::new();
        let mut chunk = String::new();

        loop {
            self.check_cancel()?;
            debug!(?state, attempts = attempts.len(), "repair state");

            state = match state {
                RepairState::Start => {
                    if !self.uses_whole_file(original) {
                        match self.plan_chunk(original, instruction)? {
                            Some(target) => route = Route::Chunk(target),
                            None => {
                                info!("no block matches the instruction; editing whole file");
                                fallback = Some(FallbackReason::NoRelevantBlock);
                            }
                        }
                    }
                    if max == 0 { RepairState::Exhausted } else { RepairState::Planning }
                }

                RepairState::Planning => match &route {
                    Route::WholeFile => {
                        candidate = self.rewrite(&RewriteRequest::Initial {
                            text: original,
                            instruction,
                            scope: RewriteScope::WholeFile,
                        })?;
                        RepairState::Validating
                    }
                    Route::Chunk(target) => {
                        let target = target.clone();
                        let blocks = self.analyzer.parse(original)?;
                        let context = assemble_context(&blocks, &target, self.settings.context_block_cap);
                        let text = context_text(&context);

                        let (new_chunk, merged) = self.rewrite_chunk(
                            original,
                            &target,
                            &RewriteRequest::Initial {
                                text: &text,
                                instruction,
                                scope: RewriteScope::Chunk { kind: target.kind, name: &target.name },
                            },
                        )?;

                        // Speculative merge: decide viability before spending budget.
                        // An empty candidate never validates.
                        if validate(original, &merged) {
                            chunk = new_chunk;
                            candidate = merged;
                            RepairState::Validating
                        } else {
                            warn!(target = %target.name, "speculative merge rejected; editing whole file");
                            fallback = Some(FallbackReason::SpeculativeMergeRejected);
                            route = Route::WholeFile;
                            RepairState::Planning
                        }
                    }
                },

                RepairState::Validating => {
                    let outcome = self.validate_candidate(path, &candidate)?;
                    let succeeded = outcome.passed();
                    let target_range = match &route {
                        Route::Chunk(target) => {
                            let len = line_count(&chunk).max(1);
                            Some((target.start_line, target.start_line + len - 1))
                        }
                        Route::WholeFile => None,
                    };

                    let attempt = Attempt {
                        attempt_number: attempts.len() + 1,
                        candidate_content: candidate.clone(),
                        target_range,
                        outcome,
                        succeeded,
                    };
                    debug!(attempt = attempt.attempt_number, outcome = attempt.outcome.label(), "validated");
                    if let Some(observer) = self.observer.as_mut() {
                        observer(&attempt);
                    }
                    attempts.push(attempt);

                    if succeeded {
                        RepairState::Success
                    } else if attempts.len() >= max {
                        RepairState::Exhausted
                    } else {
                        RepairState::Refining
                    }
                }

                RepairState::Refining => {
                    let error = attempts
                        .last()
                        .and_then(|a| a.outcome.error_report())
                        .unwrap_or_default();

                    match &route {
                        Route::WholeFile => {
                            candidate = self.rewrite(&RewriteRequest::Refine {
                                instruction,
                                previous_attempt: &candidate,
                                previous_error: &error,
                                scope: RewriteScope::WholeFile,
                            })?;
                        }
                        Route::Chunk(target) => {
                            let target = target.clone();
                            let (new_chunk, merged) = self.rewrite_chunk(
                                original,
                                &target,
                                &RewriteRequest::Refine {
                                    instruction,
                                    previous_attempt: &chunk,
                                    previous_error: &error,
                                    scope: RewriteScope::Chunk { kind: target.kind, name: &target.name },
                                },
                            )?;
                            chunk = new_chunk;
                            candidate = merged;
                        }
                    }
                    RepairState::Validating
                }

                RepairState::Success | RepairState::Exhausted => break,
            };
        }

        let succeeded = state == RepairState::Success;
        let mode = match &route {
            Route::WholeFile => EditMode::WholeFile,
            Route::Chunk(target) => EditMode::Chunked {
                target: target.name.clone(),
                start_line: target.start_line,
                end_line: target.end_line,
            },
        };
        let final_content = attempts
            .last()
            .map(|a| a.candidate_content.clone())
            .unwrap_or_else(|| original.to_string());

        info!(succeeded, attempts = attempts.len(), "edit finished");
        Ok(EditResult {
            original_content: original.to_string(),
            final_content,
            iterations: attempts,
            succeeded,
            mode,
            fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::blocks::BlockKind;

    fn target() -> Block {
        Block {
            kind: BlockKind::Function,
            name: "area".into(),
            start_line: 3,
            end_line: 4,
            content: "def area(r):\n    return r * r".into(),
            docstring: None,
            dependencies: Default::default(),
        }
    }

    #[test]
    fn isolate_keeps_only_the_target_definition() {
        let analyzer = PythonAnalyzer::new();
        let fragment = "import math\n\ndef area(r):\n    return math.pi * r * r\n\ndef other():\n    pass\n";
        assert_eq!(isolate_target(&analyzer, fragment, &target()), "def area(r):\n    return math.pi * r * r");
    }

    #[test]
    fn isolate_falls_back_to_raw_fragment() {
        let analyzer = PythonAnalyzer::new();
        assert_eq!(isolate_target(&analyzer, "def area(r:\n", &target()), "def area(r:");
        assert_eq!(isolate_target(&analyzer, "x = 1\n", &target()), "x = 1");
    }

    #[test]
    fn error_reports_only_for_failures() {
        assert!(ValidationOutcome::Passed.error_report().is_none());
        let failed = ValidationOutcome::ExecutionFailed(RunOutcome {
            success: false,
            stdout: String::new(),
            stderr: "boom".into(),
            exit_code: 2,
        });
        assert_eq!(failed.error_report().as_deref(), Some("Exit Code: 2\nError Output:\nboom"));
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!clone.is_cancelled());
    }
}
