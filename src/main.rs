use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use diagram_engine::Engine;
use diagram_engine::ErrorCode;
use diagram_engine::assets::{AssetError, AssetResolver, AssetService, MemoryAssetService};
use diagram_engine::config::{ConfigError, EngineConfig};
use diagram_engine::export::ExportError;
use diagram_engine::import::{ImportOptions, ImportSource};
use diagram_engine::layout::LayoutAlgorithm;
use diagram_engine::ops::Operation;
use diagram_engine::scene;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("write {path}: {source}")]
    Write { path: String, source: std::io::Error },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("unknown layout algorithm `{0}`")]
    UnknownLayout(String),
    #[error("scene failed validation with {0} error(s)")]
    InvalidScene(usize),
    #[error("import failed: {}", .0.join("; "))]
    Import(Vec<String>),
    #[error("no asset catalogue; pass --assets or set DIAGRAM_ASSETS")]
    MissingAssets,
    #[error("{0} operation(s) failed")]
    OpsFailed(usize),
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "E_CLI_READ",
            Self::Write { .. } => "E_CLI_WRITE",
            Self::Json(_) => "E_CLI_JSON",
            Self::Config(e) => e.error_code(),
            Self::Asset(e) => e.error_code(),
            Self::Export(e) => e.error_code(),
            Self::UnknownLayout(_) => "E_CLI_UNKNOWN_LAYOUT",
            Self::InvalidScene(_) => "E_SCENE_INVALID",
            Self::Import(_) => "E_CLI_IMPORT",
            Self::MissingAssets => "E_CLI_MISSING_ASSETS",
            Self::OpsFailed(_) => "E_CLI_OPS_FAILED",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "diagram", about = "Validate, lay out and round-trip diagram scene documents")]
struct Cli {
    /// JSON array of assets backing icon lookups.
    #[arg(long, env = "DIAGRAM_ASSETS")]
    assets: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a scene document and print the validation report.
    Validate { file: PathBuf },
    /// Place nodes with a layout algorithm and print the resulting scene.
    Layout {
        file: PathBuf,
        /// grid, flowLr, flowTb, hierarchical or force
        #[arg(long)]
        algorithm: Option<String>,
        /// Discard existing coordinates and lay out every node.
        #[arg(long)]
        relayout: bool,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Import a scene and export it again.
    Roundtrip {
        file: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run a JSON array of operations against a scene.
    Apply {
        file: PathBuf,
        ops: PathBuf,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Free-text search over the asset catalogue.
    SearchAssets {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    let catalogue = match &cli.assets {
        Some(path) => Some(Arc::new(MemoryAssetService::from_json(&read(path).await?)?)),
        None => None,
    };
    let service: Arc<dyn AssetService> = match &catalogue {
        Some(service) => Arc::clone(service) as Arc<dyn AssetService>,
        None => Arc::new(MemoryAssetService::new([])),
    };
    let resolver = Arc::new(AssetResolver::new(service));

    let result = match cli.command {
        Command::Validate { file } => run_validate(&file).await,
        Command::Layout { file, algorithm, relayout, output } => {
            run_layout(Engine::new(resolver, config), &file, algorithm, relayout, output.as_deref()).await
        }
        Command::Roundtrip { file, output } => run_roundtrip(Engine::new(resolver, config), &file, output.as_deref()).await,
        Command::Apply { file, ops, output } => {
            run_apply(Engine::new(resolver, config), &file, &ops, output.as_deref()).await
        }
        Command::SearchAssets { query, limit } => {
            if catalogue.is_none() {
                return Err(CliError::MissingAssets);
            }
            let found = resolver.search(&query, limit).await?;
            print_json(&found)
        }
    };
    if let Err(e) = &result {
        tracing::error!(error = %e, code = e.error_code(), "diagram: command failed");
    }
    result
}

async fn run_validate(file: &Path) -> Result<(), CliError> {
    let value: Value = serde_json::from_str(&read(file).await?)?;
    let report = scene::validate(&value);
    print_json(&report)?;
    if report.valid { Ok(()) } else { Err(CliError::InvalidScene(report.errors.len())) }
}

async fn run_layout(
    mut engine: Engine,
    file: &Path,
    algorithm: Option<String>,
    relayout: bool,
    output: Option<&Path>,
) -> Result<(), CliError> {
    let mut layout = engine.config().layout.clone();
    if let Some(name) = algorithm {
        layout.algorithm = LayoutAlgorithm::from_name(&name).ok_or(CliError::UnknownLayout(name))?;
    }

    let mut value: Value = serde_json::from_str(&read(file).await?)?;
    if relayout {
        if let Some(nodes) = value.get_mut("nodes").and_then(Value::as_array_mut) {
            for node in nodes.iter_mut().filter_map(Value::as_object_mut) {
                node.remove("x");
                node.remove("y");
            }
        }
    }

    let options = ImportOptions { layout: Some(layout), ..ImportOptions::from_config(engine.config()) };
    import(&mut engine, ImportSource::Value(value), &options).await?;
    emit(&engine.export_json()?, output).await
}

async fn run_roundtrip(mut engine: Engine, file: &Path, output: Option<&Path>) -> Result<(), CliError> {
    let options = ImportOptions::from_config(engine.config());
    import(&mut engine, ImportSource::Text(read(file).await?), &options).await?;
    let exported = engine.export();
    eprintln!(
        "exported {} nodes, {} connectors, {} texts",
        exported.stats.nodes_exported, exported.stats.connectors_exported, exported.stats.texts_exported
    );
    emit(&exported.json, output).await
}

async fn run_apply(mut engine: Engine, file: &Path, ops: &Path, output: Option<&Path>) -> Result<(), CliError> {
    let options = ImportOptions::from_config(engine.config());
    import(&mut engine, ImportSource::Text(read(file).await?), &options).await?;

    let operations: Vec<Operation> = serde_json::from_str(&read(ops).await?)?;
    let results = engine.execute_batch(operations).await;
    print_json(&results)?;

    emit(&engine.export_json()?, output).await?;
    match results.iter().filter(|r| !r.success).count() {
        0 => Ok(()),
        failed => Err(CliError::OpsFailed(failed)),
    }
}

async fn import(engine: &mut Engine, source: ImportSource, options: &ImportOptions) -> Result<(), CliError> {
    let result = engine.import(source, options).await;
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    if !result.success {
        return Err(CliError::Import(result.errors));
    }
    eprintln!(
        "imported {} nodes, {} connectors, {} texts in {} ms",
        result.stats.nodes_imported, result.stats.connectors_imported, result.stats.texts_imported, result.stats.time_ms
    );
    Ok(())
}

async fn read(path: &Path) -> Result<String, CliError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CliError::Read { path: path.display().to_string(), source })
}

/// Write to `output` when given, stdout otherwise.
async fn emit(json: &str, output: Option<&Path>) -> Result<(), CliError> {
    match output {
        Some(path) => tokio::fs::write(path, json)
            .await
            .map_err(|source| CliError::Write { path: path.display().to_string(), source }),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
