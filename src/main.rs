use lexrag::cli::{Cli, Commands, ConfigAction};
use lexrag::config::{expand_path, Config, ConfigValidator};
use lexrag::embedding::FastEmbedProvider;
use lexrag::error::{LexragError, Result};
use lexrag::ingest::{Chunker, IngestOutcome, IngestPipeline, SystemExtractor};
use lexrag::service::{QueryService, ServiceContext};
use lexrag::storage::IndexFiles;
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Ingest { folder } => {
            cmd_ingest(cli.config, folder)?;
        }
        Commands::Ask {
            question,
            top_k,
            json,
        } => {
            cmd_ask(cli.config, &question, top_k, json)?;
        }
        Commands::Status { json } => {
            cmd_status(cli.config, json)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "lexrag=debug" } else { "lexrag=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_ingest(config_path: Option<PathBuf>, folder: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    let folder = expand_path(&folder.unwrap_or_else(|| config.corpus.documents_dir.clone()))?;
    let files = IndexFiles::new(
        expand_path(&config.corpus.index_path)?,
        expand_path(&config.corpus.metadata_path)?,
    );

    tracing::info!("Loading embedding model '{}'", config.embedding.model);
    let embedder = Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
    let chunker = Chunker::new(config.chunking.window_size, config.chunking.overlap)?;
    let pipeline = IngestPipeline::new(
        Arc::new(SystemExtractor::default()),
        embedder,
        chunker,
        config.embedding.batch_size,
    );

    let outcome = pipeline.ingest(&folder, &files)?;
    let report = outcome.report();

    println!("Ingestion of {}", folder.display());
    println!("  Files seen:    {}", report.files_seen);
    println!("  Indexed:       {}", report.files_indexed);
    println!("  Skipped:       {}", report.files_skipped);
    println!("  Failed:        {}", report.failures.len());
    for failure in &report.failures {
        println!("    {} - {}", failure.file_name, failure.reason);
    }
    println!("  Chunks:        {}", report.chunks);
    println!("  Duration:      {}ms", report.duration_ms);

    match outcome {
        IngestOutcome::Indexed(_) => {
            println!("✓ Index written to {}", files.index_path.display());
            println!("✓ Metadata written to {}", files.metadata_path.display());
        }
        IngestOutcome::NoContent(_) => {
            println!("⚠ No content extracted; index not written");
        }
    }

    Ok(())
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    question: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let context = Arc::new(ServiceContext::load(&config));

    let mut service = QueryService::from_config(context, &config)?;
    if let Some(top_k) = top_k {
        service = service.with_top_k(top_k.max(1));
    }

    let rt = tokio::runtime::Runtime::new().map_err(|e| LexragError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    let result = rt
        .block_on(service.answer_query(question))
        .map_err(|e| match e {
            lexrag::service::ServiceError::ResourcesUnavailable { missing } => {
                LexragError::NotReady { missing }
            }
        })?;

    if json {
        let output = serde_json::to_string_pretty(&result).map_err(|e| LexragError::Json {
            source: e,
            context: "Failed to serialize answer".to_string(),
        })?;
        println!("{}", output);
        return Ok(());
    }

    println!("{}", result.answer);
    if !result.citations.is_empty() {
        println!("\nCitations:");
        for (i, citation) in result.citations.iter().enumerate() {
            println!("  {}. [{}] \"{}\"", i + 1, citation.source, citation.text);
        }
    }
    if result.outcome.is_retryable() {
        println!("\n(The model call may succeed if retried.)");
    }

    Ok(())
}

fn cmd_status(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let context = ServiceContext::load(&config);
    let report = context.readiness();

    if json {
        let output = serde_json::to_string_pretty(&report).map_err(|e| LexragError::Json {
            source: e,
            context: "Failed to serialize readiness report".to_string(),
        })?;
        println!("{}", output);
    } else {
        let mark = |loaded: bool| if loaded { "loaded" } else { "NOT LOADED" };

        println!("Lexrag Status");
        println!("=============");
        println!("\nEmbedding model: {}", mark(report.embedder_loaded));
        println!(
            "Vector index:    {} ({} vectors)",
            mark(report.index_loaded),
            report.index_size
        );
        println!(
            "Metadata:        {} ({} records)",
            mark(report.metadata_loaded),
            report.metadata_count
        );
        for problem in &report.problems {
            println!("  ⚠ {}", problem);
        }
        println!(
            "\nReady: {}",
            if report.ready { "yes" } else { "no" }
        );
    }

    match context.resources() {
        Ok(_) => Ok(()),
        Err(missing) => Err(LexragError::NotReady { missing }),
    }
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LexragError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
            println!(
                "  Put your documents in {} and run 'lexrag ingest'",
                config.corpus.documents_dir.display()
            );
            println!(
                "  Set {} before running 'lexrag ask'",
                config.llm.api_key_env
            );
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'lexrag config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    Config::load(&path)
}
