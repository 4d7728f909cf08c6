//! converse - send a coding prompt to Claude on Amazon Bedrock.
//!
//! The prompt is built from the command-line words plus optional file and
//! piped input, sent once, and the generated code is printed to stdout.

mod bedrock;
mod config;
mod dispatch;
mod error;
mod prompt;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use config::{Config, ModelVersion};
use dispatch::Mode;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "converse")]
#[command(author, about = "Send a coding prompt to Claude on Amazon Bedrock")]
#[command(
    long_about = "Send a coding prompt to Claude on Amazon Bedrock and print the generated code.\n\n\
                  Piped stdin and --file contents are appended to the prompt.\n\n\
                  Authentication uses a Bedrock API key only, read from AWS_BEARER_TOKEN_BEDROCK \
                  or bedrock.api_key in the config file. AWS access keys, profiles and SSO \
                  (SigV4 signing) are not supported."
)]
struct Cli {
    /// Prompt words
    #[arg(value_name = "PROMPT")]
    prompt: Vec<String>,

    /// Optional file path to read
    #[arg(short = 'f', long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Claude Sonnet version
    #[arg(short = 'v', long, value_enum, default_value_t = ModelVersion::default())]
    version: ModelVersion,

    /// Stream tokens as they're generated
    #[arg(short = 's', long)]
    stream: bool,

    /// Use an alternate config file
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Log to stderr so stdout only carries model output.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("converse=warn,reqwest=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let attachment = prompt::read_attachment(cli.file.as_deref())?;
    let Some(prompt) = prompt::compose_prompt(&cli.prompt, attachment.as_deref()) else {
        eprintln!("Usage: converse [--file FILE] [--stream] [--version VERSION] PROMPT\n");
        eprintln!("{}", Cli::command().render_help());
        std::process::exit(1);
    };

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    let model_id = config.models.model_id(cli.version);
    let client = bedrock::BedrockClient::new(&config.bedrock)?;
    debug!(
        "Using model {} at {}",
        model_id,
        config.bedrock.endpoint()
    );

    let envelope = bedrock::RequestEnvelope::build(&config.request, &prompt);
    let mode = Mode::from_flag(cli.stream);
    let mut stdout = std::io::stdout().lock();

    match dispatch::dispatch(&client, &envelope, model_id, mode, &mut stdout).await {
        Err(e) if e.is_broken_pipe() => {
            debug!("Output closed by reader");
            Ok(())
        }
        result => result.with_context(|| match mode {
            Mode::Synchronous => "Error calling Claude Sonnet",
            Mode::Streaming => "Error streaming from Claude Sonnet",
        }),
    }
}
