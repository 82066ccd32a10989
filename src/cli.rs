use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::ConfigOverrides;
use crate::params::ModelParameters;
use crate::response::OutputMode;

#[derive(Debug, Parser)]
#[command(name = "codeask")]
#[command(author, version, about = "Ask Claude, Grok or Gemini about your code via OpenRouter")]
#[command(long_about = "Ask Claude, Grok or Gemini about your code via OpenRouter.\n\n\
Context can be provided in multiple ways:\n  \
  single file:        -c file.py\n  \
  glob:               -c \"*.py\"\n  \
  directory:          -c src/            (top level only)\n  \
  recursive glob:     -c \"src/**/*.py\"\n\n\
Press Ctrl+C (or send SIGINT, SIGTERM or SIGHUP) to cancel a request.")]
pub struct Cli {
    /// OpenRouter API key (falls back to the OPENROUTER_API_KEY environment variable)
    #[arg(long, global = true, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Use Claude (the default backend)
    #[arg(long, global = true)]
    pub claude: bool,

    /// Use Grok instead of Claude
    #[arg(long, global = true)]
    pub grok: bool,

    /// Use Gemini instead of Claude
    #[arg(long, global = true)]
    pub gemini: bool,

    /// Print the raw JSON response instead of the generated text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(flatten)]
    pub params: ParamArgs,

    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        }
    }
}

/// Sampling parameter overrides. Unset values fall back to the backend's defaults.
#[derive(Debug, Clone, Default, Args)]
pub struct ParamArgs {
    /// Temperature (0-1)
    #[arg(long, global = true)]
    pub temperature: Option<f64>,

    /// Top P (0-1)
    #[arg(long, global = true)]
    pub top_p: Option<f64>,

    /// Top K
    #[arg(long, global = true)]
    pub top_k: Option<u32>,

    /// Frequency penalty (0-2)
    #[arg(long, global = true)]
    pub frequency_penalty: Option<f64>,

    /// Presence penalty (0-2)
    #[arg(long, global = true)]
    pub presence_penalty: Option<f64>,

    /// Repetition penalty (0-2)
    #[arg(long, global = true)]
    pub repetition_penalty: Option<f64>,

    /// Min P (0-1)
    #[arg(long, global = true)]
    pub min_p: Option<f64>,

    /// Top A (0-1)
    #[arg(long, global = true)]
    pub top_a: Option<f64>,
}

impl ParamArgs {
    pub fn overrides(&self) -> ModelParameters {
        ModelParameters {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            repetition_penalty: self.repetition_penalty,
            min_p: self.min_p,
            top_a: self.top_a,
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct SettingsArgs {
    /// TOML config file with endpoint and limit settings
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Chat-completions endpoint URL
    #[arg(long, global = true, value_name = "URL")]
    pub api_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip context files larger than this many bytes
    #[arg(long, global = true, value_name = "BYTES")]
    pub max_file_bytes: Option<u64>,

    /// Truncate the combined context to this many bytes
    #[arg(long, global = true, value_name = "BYTES")]
    pub max_context_bytes: Option<usize>,
}

impl SettingsArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_url: self.api_url.clone(),
            timeout_secs: self.timeout,
            max_file_bytes: self.max_file_bytes,
            max_context_bytes: self.max_context_bytes,
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct ContextArgs {
    /// Context files, directories or glob patterns (repeatable)
    #[arg(short = 'c', long = "context", value_name = "PATTERN")]
    pub patterns: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Review code from a file for quality, bugs, and improvements
    Review {
        file: PathBuf,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Explain how the code works with detailed examples
    Explain {
        file: PathBuf,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// Send a custom query to the model
    Query {
        query: String,
        /// Name of the template to use
        #[arg(short, long)]
        template: Option<String>,
        /// File containing code to include in the query
        #[arg(short = 'f', long, value_name = "FILE")]
        code_file: Option<PathBuf>,
        /// Extra template variable (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
        #[command(flatten)]
        context: ContextArgs,
    },
    /// List available templates
    Templates,
    /// Show model ids, default parameters and valid ranges
    Parameters,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {s:?}")),
    }
}
