//! Runs one parsed command line to completion.
//!
//! Every local check (backend flags, parameter ranges, API key, template
//! variables) happens before the executor is built, so a failing check never
//! opens a connection.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command, ContextArgs};
use crate::config::{API_KEY_ENV, Config, FileConfig, resolve_api_key};
use crate::context::ContextCollector;
use crate::dispatch::{Executor, ExecutorConfig};
use crate::error::AskError;
use crate::params::{Backend, ModelParameters};
use crate::request::{self, Request};
use crate::templates::{self, CODE_REVIEW, EXPLAIN_CODE};

/// Process-level inputs that are not command-line arguments.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Cancelled by the signal guard, or directly by tests.
    pub cancel: CancellationToken,
    pub handle_signals: bool,
    /// Value of `OPENROUTER_API_KEY`, read once at startup.
    pub env_api_key: Option<String>,
}

impl RunOptions {
    pub fn from_env() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handle_signals: true,
            env_api_key: std::env::var(API_KEY_ENV).ok(),
        }
    }
}

/// The prompt a subcommand asks for, before any context is attached.
#[derive(Debug)]
struct PromptPlan<'a> {
    prompt: String,
    patterns: &'a [String],
}

pub async fn run<W: Write>(cli: Cli, opts: RunOptions, out: &mut W) -> Result<(), AskError> {
    let plan = match &cli.command {
        Command::Templates => return list_templates(out),
        Command::Parameters => return show_parameters(out),
        Command::Review { file, context } => template_prompt(CODE_REVIEW, file, context)?,
        Command::Explain { file, context } => template_prompt(EXPLAIN_CODE, file, context)?,
        Command::Query {
            query,
            template,
            code_file,
            vars,
            context,
        } => query_prompt(query, template.as_deref(), code_file.as_deref(), vars, context)?,
    };
    ask(&cli, plan, opts, out).await
}

async fn ask<W: Write>(
    cli: &Cli,
    plan: PromptPlan<'_>,
    opts: RunOptions,
    out: &mut W,
) -> Result<(), AskError> {
    let backend = Backend::from_flags(cli.claude, cli.grok, cli.gemini)?;
    let parameters = ModelParameters::resolve(backend, &cli.params.overrides())?;

    let file_config = match &cli.settings.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = Config::resolve(file_config, cli.settings.overrides())?;
    let api_key = resolve_api_key(cli.api_key.clone(), |_| opts.env_api_key.clone())?;

    let context = if plan.patterns.is_empty() {
        None
    } else {
        Some(ContextCollector::new(config.limits).collect(plan.patterns))
    };
    if let Some(block) = &context {
        tracing::info!(
            files = block.len(),
            warnings = block.warnings().len(),
            "context ready"
        );
    }

    let request = Request::new(backend, parameters, plan.prompt, context)?;

    let mut executor_config = ExecutorConfig::new(&config, api_key);
    executor_config.handle_signals = opts.handle_signals;
    let mut executor = Executor::new(executor_config)?;

    tracing::info!("asking {backend}");
    let handle = executor.dispatch(&request, opts.cancel)?;
    let completion = handle.wait().await?;
    tracing::info!(
        model = %completion.model,
        latency_ms = completion.latency_ms,
        "answer received"
    );

    completion.write_to(out, cli.output_mode())?;
    Ok(())
}

fn template_prompt<'a>(
    name: &str,
    file: &Path,
    context: &'a ContextArgs,
) -> Result<PromptPlan<'a>, AskError> {
    let code = read_code_file(file)?;
    let vars = HashMap::from([("code".to_string(), code)]);
    Ok(PromptPlan {
        prompt: templates::get(name)?.render(&vars)?,
        patterns: &context.patterns,
    })
}

fn query_prompt<'a>(
    query: &str,
    template: Option<&str>,
    code_file: Option<&Path>,
    extra: &[(String, String)],
    context: &'a ContextArgs,
) -> Result<PromptPlan<'a>, AskError> {
    let code = code_file.map(read_code_file).transpose()?;

    let prompt = match template {
        Some(name) => {
            let mut vars: HashMap<String, String> = extra.iter().cloned().collect();
            vars.insert("query".to_string(), query.to_string());
            if let Some(code) = code {
                vars.insert("code".to_string(), code);
            }
            templates::get(name)?.render(&vars)?
        }
        None => request::with_code(query, code.as_deref()),
    };

    Ok(PromptPlan {
        prompt,
        patterns: &context.patterns,
    })
}

fn read_code_file(path: &Path) -> Result<String, AskError> {
    std::fs::read_to_string(path).map_err(|e| {
        AskError::Configuration(format!("cannot read code file {}: {e}", path.display()))
    })
}

fn list_templates<W: Write>(out: &mut W) -> Result<(), AskError> {
    writeln!(out, "Available templates:")?;
    for template in &templates::BUILTIN {
        writeln!(out, "\n{} (variables: {})", template.name, template.variables().join(", "))?;
        writeln!(out, "{}", template.body)?;
    }
    Ok(())
}

fn show_parameters<W: Write>(out: &mut W) -> Result<(), AskError> {
    for backend in Backend::ALL {
        writeln!(out, "{backend} ({}) defaults:", backend.model_id())?;
        for (name, value, range) in backend.defaults().rows() {
            let value = value.unwrap_or_else(|| "unset".to_string());
            let range = match range {
                Some(r) => format!("{:.1} - {:.1}", r.start(), r.end()),
                None => ">= 0".to_string(),
            };
            writeln!(out, "  {name:<20} {value:>6}   range {range}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}
