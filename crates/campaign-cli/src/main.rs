//! Campaign Pipeline CLI
//!
//! The `campaign` command drives quality-gated email campaign runs.
//!
//! ## Commands
//!
//! - `run`: Run one campaign request against HTTP collaborators
//! - `validate`: Check a stage payload against its contract offline
//! - `config`: Print the effective pipeline configuration
//! - `inspect`: Verify and summarise a persisted run outcome

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn, Level};

use campaign_adapters::{build_collaborators, EndpointConfig};
use campaign_core::obs::RunSpan;
use campaign_core::{
    read_outcome_artifact, validate, write_outcome_artifact, CampaignRequest, CampaignService,
    PipelineConfig, PublicationStatus, RunId, RunOutcome, Stage,
};

#[derive(Parser)]
#[command(name = "campaign")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Quality-gated marketing email campaign pipeline", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Pipeline configuration file (TOML)
    #[arg(long, global = true, env = "CAMPAIGN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one campaign request to completion
    Run {
        /// Campaign request file (JSON)
        #[arg(short, long)]
        request: PathBuf,

        /// Collaborator endpoints file (TOML); CAMPAIGN_* variables when omitted
        #[arg(short, long)]
        endpoints: Option<PathBuf>,

        /// Directory to write `<run_id>/outcome.json` into
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Validate a stage payload against its contract
    Validate {
        /// Stage whose contract applies (content, design, quality, delivery)
        #[arg(short, long)]
        stage: Stage,

        /// Payload file (JSON)
        #[arg(short, long)]
        payload: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Verify a persisted outcome and print its summary
    Inspect {
        /// Run ID to inspect
        #[arg(long)]
        run: RunId,

        /// Directory the outcome was written into
        #[arg(long, default_value = ".campaign/runs")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    campaign_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            request,
            endpoints,
            out,
        } => cmd_run(config, &request, endpoints.as_deref(), out.as_deref()).await,
        Commands::Validate { stage, payload } => cmd_validate(stage, &payload),
        Commands::Config => cmd_config(&config),
        Commands::Inspect { run, dir } => cmd_inspect(run, &dir),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load pipeline config {:?}", path)),
        None => Ok(PipelineConfig::default()),
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_slice(&bytes).with_context(|| format!("{:?} is not valid JSON", path))
}

fn read_request(path: &Path) -> Result<CampaignRequest> {
    let value = read_json(path)?;
    serde_json::from_value(value)
        .with_context(|| format!("{:?} is not a campaign request", path))
}

/// Run a single campaign; Ctrl-C cancels it.
async fn cmd_run(
    config: PipelineConfig,
    request_path: &Path,
    endpoints: Option<&Path>,
    out: Option<&Path>,
) -> Result<()> {
    let request = read_request(request_path)?;
    let endpoints = match endpoints {
        Some(path) => EndpointConfig::load(path)
            .with_context(|| format!("Failed to load endpoints {:?}", path))?,
        None => EndpointConfig::from_env().context("Failed to read CAMPAIGN_* endpoints")?,
    };
    let collaborators =
        build_collaborators(&endpoints).context("Failed to set up HTTP collaborators")?;

    let service = CampaignService::new(config, collaborators);
    let run_id = service.submit_campaign(request);
    info!(run_id = %run_id, "run submitted");

    let outcome = tokio::select! {
        result = service.wait_for_result(run_id) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!(run_id = %run_id, "interrupted, cancelling run");
            service.cancel(run_id)?;
            service.wait_for_result(run_id).await?
        }
    };

    if let Some(dir) = out {
        let path = write_outcome_artifact(&outcome, dir)
            .with_context(|| format!("Failed to write outcome under {:?}", dir))?;
        println!("Outcome written to {:?}", path);
    }

    println!("{}", serde_json::to_string_pretty(outcome.as_ref())?);
    print_summary(&outcome);

    if let Some(report) = outcome.failure() {
        anyhow::bail!("Run {} failed: {}", run_id, report.summary());
    }
    Ok(())
}

fn print_summary(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed {
            package,
            publication,
        } => {
            println!(
                "✓ Run {} completed: score {:.1}, {} records, {} artifacts",
                package.run_id,
                package.final_score.overall,
                package.records.len(),
                package.manifest.len()
            );
            match publication {
                PublicationStatus::Published { urls } => {
                    for url in urls {
                        println!("  published: {}", url);
                    }
                }
                PublicationStatus::Failed { error } => println!("  publication failed: {}", error),
                PublicationStatus::NotConfigured => {}
            }
        }
        RunOutcome::Failed { report } => {
            println!("✗ Run {}: {}", report.run_id, report.summary());
            for issue in report.issues.iter().skip(1) {
                println!("  - {}", issue);
            }
        }
    }
}

/// Lines printed by `validate` for one payload.
fn validation_lines(stage: Stage, payload: &Value) -> (bool, Vec<String>) {
    let result = validate(stage, payload);
    if result.valid {
        (true, vec![format!("✓ {} payload is valid", stage)])
    } else {
        let mut lines = vec![format!(
            "✗ {} payload has {} error(s):",
            stage,
            result.errors.len()
        )];
        lines.extend(result.errors.iter().map(|e| format!("  - {}", e)));
        (false, lines)
    }
}

fn cmd_validate(stage: Stage, payload_path: &Path) -> Result<()> {
    let payload = read_json(payload_path)?;
    let (valid, lines) = validation_lines(stage, &payload);
    for line in lines {
        println!("{}", line);
    }
    if !valid {
        anyhow::bail!("{:?} does not satisfy the {} contract", payload_path, stage);
    }
    Ok(())
}

fn cmd_config(config: &PipelineConfig) -> Result<()> {
    print!("{}", config.to_toml().context("Failed to render configuration")?);
    Ok(())
}

fn cmd_inspect(run_id: RunId, dir: &Path) -> Result<()> {
    let _span = RunSpan::enter(run_id);
    let outcome = read_outcome_artifact(run_id, dir)
        .with_context(|| format!("Failed to verify outcome of run {} in {:?}", run_id, dir))?;
    print_summary(&outcome);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_core::fakes::{sample_content, sample_request};

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "campaign",
            "--verbose",
            "run",
            "--request",
            "req.json",
            "--out",
            "runs",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                request,
                endpoints,
                out,
            } => {
                assert_eq!(request, PathBuf::from("req.json"));
                assert!(endpoints.is_none());
                assert_eq!(out, Some(PathBuf::from("runs")));
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_parse_validate_stage() {
        let cli = Cli::try_parse_from([
            "campaign", "validate", "--stage", "design", "--payload", "d.json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Validate {
                stage: Stage::Design,
                ..
            }
        ));

        assert!(Cli::try_parse_from([
            "campaign", "validate", "--stage", "layout", "--payload", "d.json",
        ])
        .is_err());
    }

    #[test]
    fn test_parse_inspect_requires_uuid() {
        assert!(Cli::try_parse_from(["campaign", "inspect", "--run", "not-a-uuid"]).is_err());

        let id = RunId::new();
        let cli = Cli::try_parse_from(["campaign", "inspect", "--run", &id.to_string()]).unwrap();
        match cli.command {
            Commands::Inspect { run, dir } => {
                assert_eq!(run, id);
                assert_eq!(dir, PathBuf::from(".campaign/runs"));
            }
            _ => panic!("Expected inspect command"),
        }
    }

    #[test]
    fn test_validation_lines_itemize_errors() {
        let mut payload = sample_content();
        payload.as_object_mut().unwrap().remove("subject");
        payload["cta"]["url"] = Value::String("not a url".to_string());

        let (valid, lines) = validation_lines(Stage::Content, &payload);
        assert!(!valid);
        assert!(lines[0].contains("2 error(s)"));
        assert!(lines.iter().any(|l| l.contains("subject")));
        assert!(lines.iter().any(|l| l.contains("cta.url")));

        let (valid, _) = validation_lines(Stage::Content, &sample_content());
        assert!(valid);
    }

    #[test]
    fn test_load_config_default_and_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config, PipelineConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        std::fs::write(&path, "[quality]\nthreshold = 80.0\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert!((config.quality.threshold - 80.0).abs() < 1e-9);

        std::fs::write(&path, "[quality]\nthreshold = 180.0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_read_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(&path, serde_json::to_vec(&sample_request()).unwrap()).unwrap();

        let request = read_request(&path).unwrap();
        assert_eq!(request, sample_request());

        std::fs::write(&path, b"{\"brief\": 5}").unwrap();
        assert!(read_request(&path).is_err());
    }
}
