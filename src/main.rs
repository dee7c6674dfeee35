//! Command-line entry point: optimize one recipe file against a local
//! Ollama instance and print the result as JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;

use recipe_optimizer::config::{self, ConfigError, PipelineConfig};
use recipe_optimizer::pipeline::llm::{LlmError, OllamaClient};
use recipe_optimizer::pipeline::storage::{AuditSink, ChannelAuditSink, InMemoryIndexer, TracingAuditSink};
use recipe_optimizer::{PipelineError, RawDocument, RecipePipeline};

#[derive(Parser, Debug)]
#[command(name = "recipe-optimizer")]
#[command(about = "Rewrite a recipe toward a dietary goal using a local LLM")]
#[command(version)]
struct Args {
    /// Plain-text recipe file
    recipe: PathBuf,

    /// Free-text optimization goal, e.g. "lower sugar"
    #[arg(short, long, default_value = "none")]
    goal: String,

    /// Override MAX_ITER
    #[arg(long)]
    max_iter: Option<u32>,

    /// Override MODEL_NAME
    #[arg(long)]
    model: Option<String>,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Cannot render result: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    recipe_optimizer::init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "recipe optimization failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(max_iter) = args.max_iter {
        config.max_iter = max_iter;
    }
    if let Some(model) = args.model {
        config.model_name = model;
    }
    tracing::info!(
        version = config::APP_VERSION,
        model = %config.model_name,
        max_iter = config.max_iter,
        "{} starting",
        config::APP_NAME
    );

    let text = tokio::fs::read_to_string(&args.recipe)
        .await
        .map_err(|source| CliError::Read {
            path: args.recipe.clone(),
            source,
        })?;

    let client = Arc::new(OllamaClient::from_config(&config)?);
    let (audit, mut records) = ChannelAuditSink::channel();
    let drain = tokio::spawn(async move {
        let mut count = 0usize;
        while let Some(record) = records.recv().await {
            TracingAuditSink.record(record);
            count += 1;
        }
        count
    });

    let pipeline = RecipePipeline::new(client, Arc::new(audit), Arc::new(InMemoryIndexer::new()), config);
    let result = pipeline.run_document(RawDocument::new(text, args.goal)).await;

    // Closing the sender ends the drain task.
    drop(pipeline);
    match drain.await {
        Ok(count) => tracing::debug!(records = count, "audit trail drained"),
        Err(e) => tracing::warn!(error = %e, "audit drain task failed"),
    }

    let result = result?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
