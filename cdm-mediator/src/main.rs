//! CDM Mediator - routes newline-delimited JSON messages through the
//! semantic mediation core and writes one result per line.

mod batch;
mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use cdm_core::{InteropManager, MessageStandard};
use clap::Parser;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use crate::batch::BatchProcessor;
use crate::config::MediatorConfig;
use crate::error::{MediatorError, MediatorResult};

/// Semantic mediation between tactical and telemetry message standards.
#[derive(Parser, Debug)]
#[command(name = "cdm-mediator", version, about)]
struct Cli {
    /// Standard the input messages are written in.
    #[arg(short, long, default_value = "MIL-STD-6016")]
    standard: MessageStandard,

    /// Semantic configuration document to import (.yaml/.yml or JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// NDJSON input file; stdin when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Export the semantic configuration to this path.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Run the golden-sample regression first.
    #[arg(long)]
    regression: bool,

    /// Max messages converted at once.
    #[arg(long, default_value_t = 16)]
    concurrency: usize,

    /// Increase log verbosity (-v, -vv, -vvv). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> MediatorConfig {
        let mut config = MediatorConfig::with_standard(self.standard)
            .with_regression(self.regression)
            .with_concurrency(self.concurrency);
        if let Some(path) = self.config {
            config = config.with_config(path);
        }
        if let Some(path) = self.input {
            config = config.with_input(path);
        }
        if let Some(path) = self.export {
            config = config.with_export(path);
        }
        config
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> MediatorResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli.into_config()).await
}

async fn run(config: MediatorConfig) -> MediatorResult<()> {
    let mut manager = InteropManager::new();

    if let Some(path) = &config.config_path {
        manager.import_semantic_config(path)?;
    }
    if let Some(path) = &config.export_path {
        manager.export_semantic_config(path)?;
    }
    if config.run_regression {
        let result = manager.run_golden_set_regression();
        for error in &result.errors {
            tracing::error!("{}", error);
        }
        if !result.is_valid() {
            return Err(MediatorError::Regression(result.errors.len()));
        }
        tracing::info!(samples = manager.validator().golden_samples().len(), "regression passed");
    }

    let stats = manager.statistics();
    tracing::info!(
        standard = %config.source_standard,
        concepts = stats.concepts,
        semantic_fields = stats.semantic_fields,
        message_mappings = stats.message_mappings,
        routing_rules = stats.routing_rules,
        "mediator ready"
    );

    // export/regression-only runs do not wait on stdin
    let batch_requested = config.input_path.is_some()
        || (config.export_path.is_none() && !config.run_regression);
    if !batch_requested {
        return Ok(());
    }

    let processor = BatchProcessor::new(Arc::new(RwLock::new(manager)), &config);
    let mut stdout = tokio::io::stdout();
    match &config.input_path {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            processor.run(file, &mut stdout).await?;
        }
        None => {
            processor.run(tokio::io::stdin(), &mut stdout).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from([
            "cdm-mediator",
            "--standard",
            "MAVLink",
            "--config",
            "semantic.yaml",
            "--regression",
            "-vv",
        ]);
        assert_eq!(cli.standard, MessageStandard::MavLink);
        assert_eq!(cli.verbose, 2);
        let config = cli.into_config();
        assert_eq!(config.config_path, Some(PathBuf::from("semantic.yaml")));
        assert!(config.run_regression);
        assert!(config.input_path.is_none());
    }

    #[test]
    fn unknown_standard_is_rejected() {
        assert!(Cli::try_parse_from(["cdm-mediator", "--standard", "STANAG"]).is_err());
    }

    #[tokio::test]
    async fn export_and_regression_without_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("semantic.yaml");
        let config = MediatorConfig::default()
            .with_export(path.clone())
            .with_regression(true);
        run(config).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn file_input_is_processed() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("batch.ndjson");
        std::fs::write(&input, "{\"message_type\": \"J2.0\", \"latitude\": 1.0}\n").unwrap();
        let config = MediatorConfig::default().with_input(input);
        run(config).await.unwrap();
    }
}
