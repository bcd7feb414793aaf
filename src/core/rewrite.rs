//! Rewrite collaborator: the request/response seam to the code-writing model.
//!
//! The repair loop only sees the `Rewriter` trait. `ChatRewriter` is the
//! production implementation against an OpenAI-compatible
//! `/chat/completions` endpoint.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::blocks::BlockKind;
use crate::infra::config::RewriteConfig;

/// What the rewriter is asked to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteScope<'a> {
    /// The complete file.
    WholeFile,
    /// Only the named top-level definition.
    Chunk { kind: BlockKind, name: &'a str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteRequest<'a> {
    /// First attempt: rewrite `text` per `instruction`.
    Initial {
        text: &'a str,
        instruction: &'a str,
        scope: RewriteScope<'a>,
    },
    /// Follow-up: fix `previous_attempt`, which failed with `previous_error`.
    Refine {
        instruction: &'a str,
        previous_attempt: &'a str,
        previous_error: &'a str,
        scope: RewriteScope<'a>,
    },
}

impl RewriteRequest<'_> {
    pub fn scope(&self) -> RewriteScope<'_> {
        match self {
            RewriteRequest::Initial { scope, .. } | RewriteRequest::Refine { scope, .. } => *scope,
        }
    }

    pub fn is_refinement(&self) -> bool {
        matches!(self, RewriteRequest::Refine { .. })
    }
}

/// Turns a prompt plus code into new code.
pub trait Rewriter {
    fn rewrite(&mut self, request: &RewriteRequest<'_>) -> Result<String>;
}

/// Remove a surrounding triple-backtick fence, if present.
///
/// The text between the first newline after the opening fence and the
/// closing fence is kept; anything without a full fence is returned as is.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() < 6 || !trimmed.starts_with("```") || !trimmed.ends_with("```") {
        return text.to_string();
    }

    let Some(newline) = trimmed.find('\n') else {
        return text.to_string();
    };
    let body_end = trimmed.len() - 3;
    if newline + 1 > body_end {
        return String::new();
    }

    trimmed[newline + 1..body_end].trim_end().to_string()
}

const PLAN_SYSTEM_PROMPT: &str = "You are an expert Python code editor. Modify code according to the \
user's instructions. Preserve the existing formatting style and indentation. Return only code, with \
no explanation and no markdown fences.";

const REFINE_SYSTEM_PROMPT: &str = "You are an expert Python debugger. You receive code you wrote \
earlier together with the error it produced when compiled or run. Fix the code so it runs without \
errors while still satisfying the original instruction. Return only code, with no explanation and \
no markdown fences.";

fn scope_directive(scope: RewriteScope<'_>) -> String {
    match scope {
        RewriteScope::WholeFile => "Return the COMPLETE modified file.".to_string(),
        RewriteScope::Chunk { kind, name } => format!(
            "The code below is an excerpt. Return ONLY the complete top-level {} `{}` after the \
             change. Do not return imports or any other definitions.",
            kind.as_str(),
            name
        ),
    }
}

/// Render the user message for a request.
pub fn render_prompt(request: &RewriteRequest<'_>) -> String {
    match request {
        RewriteRequest::Initial { text, instruction, scope } => format!(
            "Instruction: {instruction}\n\n{}\n\nCode:\n{text}",
            scope_directive(*scope)
        ),
        RewriteRequest::Refine { instruction, previous_attempt, previous_error, scope } => format!(
            "You previously edited this code based on: \"{instruction}\"\n\n\
             Your previous edit:\n{previous_attempt}\n\n\
             When we ran it, it failed:\n{previous_error}\n\n\
             Fix the code so it runs without errors. {}",
            scope_directive(*scope)
        ),
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// Blocking chat-completions client.
pub struct ChatRewriter {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    refine_model: String,
    temperature: f64,
}

impl ChatRewriter {
    /// Build from config; the API key is read from `api_key_env`.
    pub fn from_config(cfg: &RewriteConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .with_context(|| format!("{} is not set", cfg.api_key_env))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", cfg.api_base.trim_end_matches('/')),
            api_key,
            model: cfg.model.clone(),
            refine_model: cfg.refine_model.clone().unwrap_or_else(|| cfg.model.clone()),
            temperature: cfg.temperature,
        })
    }
}

impl Rewriter for ChatRewriter {
    #[instrument(skip_all, fields(refine = request.is_refinement()))]
    fn rewrite(&mut self, request: &RewriteRequest<'_>) -> Result<String> {
        let (model, system) = if request.is_refinement() {
            (self.refine_model.as_str(), REFINE_SYSTEM_PROMPT)
        } else {
            (self.model.as_str(), PLAN_SYSTEM_PROMPT)
        };
        let user = render_prompt(request);

        let body = ChatRequest {
            model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: &user },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("rewrite request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            bail!("rewrite request returned {status}: {text}");
        }

        let parsed: ChatResponse = response.json().context("decode rewrite response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("rewrite response had no content"))?;

        debug!(model, chars = content.len(), "rewrite received");
        Ok(content)
    }
}
