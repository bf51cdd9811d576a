use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use toc_kernel_api::{
    load_gate_config, publish_draft, read_published_matrix, CommitResult, DraftPayload,
    VersionRecord, API_CONTRACT_VERSION,
};
use toc_kernel_core::{
    build_projection, parse_raw_records, projection_fingerprint, validate_gate, GateConfig,
    MissingBaselinePolicy, RawGraph, RawRecord,
};
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "tockit.v1";

#[derive(Debug, Parser)]
#[command(name = "tockit")]
#[command(about = "Theory-of-Change graph kernel CLI")]
struct Cli {
    /// Gate configuration file (YAML or JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Treat an omitted RLS baseline flag as a GA-08 failure.
    #[arg(long, global = true, default_value_t = false)]
    strict_rls: bool,

    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[arg(short, long, global = true, default_value_t = false, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run Gate A over a graph payload; exits non-zero when the gate fails.
    Validate(GraphArgs),
    /// Build the tree-with-ghosts projection of a graph payload.
    Project(GraphArgs),
    /// Re-normalize persisted projection rows of a published version.
    Matrix(MatrixArgs),
    /// Validate a draft and apply a prepared commit result when Gate A passes.
    Publish(PublishArgs),
}

#[derive(Debug, Args)]
struct GraphArgs {
    #[arg(long = "in")]
    input: PathBuf,
}

#[derive(Debug, Args)]
struct MatrixArgs {
    /// JSON `{id, status}` record, or `null` for a missing version.
    #[arg(long)]
    version: PathBuf,
    /// JSON array of persisted projection rows.
    #[arg(long)]
    rows: PathBuf,
}

#[derive(Debug, Args)]
struct PublishArgs {
    /// JSON `{found, nodes, edges, rlsBaselineOk}` draft payload.
    #[arg(long)]
    draft: PathBuf,
    /// JSON `{ok, data?, code?, message?}` returned by the commit step.
    #[arg(long)]
    commit: PathBuf,
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if quiet {
        EnvFilter::new("warn")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            object.insert(
                "api_contract_version".to_string(),
                Value::String(API_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "api_contract_version": API_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn exit_status(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn read_body(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {what} {}", path.display()))
}

fn read_graph(path: &Path) -> Result<RawGraph> {
    let body = read_body(path, "graph payload")?;
    RawGraph::from_json_str(&body).with_context(|| format!("failed to parse {}", path.display()))
}

fn gate_config(cli: &Cli) -> Result<GateConfig> {
    let mut config = match &cli.config {
        Some(path) => load_gate_config(path)?,
        None => GateConfig::default(),
    };
    if cli.strict_rls {
        config.missing_rls_baseline = MissingBaselinePolicy::FailClosed;
    }
    Ok(config)
}

async fn load_version(path: PathBuf) -> Result<Option<VersionRecord>> {
    let body = read_body(&path, "version record")?;
    serde_json::from_str(&body)
        .with_context(|| format!("failed to parse version record {}", path.display()))
}

async fn load_rows(path: PathBuf) -> Result<Vec<RawRecord>> {
    let body = read_body(&path, "projection rows")?;
    parse_raw_records(&body).with_context(|| format!("failed to parse {}", path.display()))
}

async fn load_draft(path: PathBuf) -> Result<DraftPayload> {
    let body = read_body(&path, "draft payload")?;
    serde_json::from_str(&body)
        .with_context(|| format!("failed to parse draft payload {}", path.display()))
}

async fn load_commit(path: PathBuf) -> Result<CommitResult> {
    let body = read_body(&path, "commit result")?;
    serde_json::from_str(&body)
        .with_context(|| format!("failed to parse commit result {}", path.display()))
}

fn run_validate(args: &GraphArgs, config: &GateConfig) -> Result<ExitCode> {
    let graph = read_graph(&args.input)?.normalize();
    let report = validate_gate(&graph, config);
    tracing::info!(pass = report.pass, violations = report.violations.len(), "gate a evaluated");
    let pass = report.pass;
    emit_json(serde_json::to_value(report)?)?;
    Ok(exit_status(pass))
}

fn run_project(args: &GraphArgs) -> Result<ExitCode> {
    let graph = read_graph(&args.input)?.normalize();
    let rows = build_projection(&graph);
    let fingerprint = projection_fingerprint(&rows);
    tracing::info!(rows = rows.len(), %fingerprint, "projection built");
    emit_json(serde_json::json!({ "rows": rows, "fingerprint": fingerprint }))?;
    Ok(ExitCode::SUCCESS)
}

async fn run_matrix(args: MatrixArgs) -> Result<ExitCode> {
    let MatrixArgs { version, rows } = args;
    let outcome = read_published_matrix(|| load_version(version), || load_rows(rows)).await?;
    let envelope = outcome.into_envelope();
    let ok = envelope.ok;
    emit_json(serde_json::to_value(envelope)?)?;
    Ok(exit_status(ok))
}

async fn run_publish(args: PublishArgs, config: &GateConfig) -> Result<ExitCode> {
    let PublishArgs { draft, commit } = args;
    let outcome = publish_draft(config, || load_draft(draft), || load_commit(commit)).await?;
    let envelope = outcome.into_envelope();
    let ok = envelope.ok;
    emit_json(serde_json::to_value(envelope)?)?;
    Ok(exit_status(ok))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let config = gate_config(&cli)?;

    match cli.command {
        Command::Validate(args) => run_validate(&args, &config),
        Command::Project(args) => run_project(&args),
        Command::Matrix(args) => run_matrix(args).await,
        Command::Publish(args) => run_publish(args, &config).await,
    }
}
