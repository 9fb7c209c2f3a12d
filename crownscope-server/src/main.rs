// crownscope: tree crown area analysis for aerial imagery

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use crownscope_core::{AnalyzerConfig, Gsd};
use crownscope_eye::{decode_image, CrownAnalyzer, ModelManager};
use crownscope_server::http::{bind_listener, create_router, ApiState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crownscope")]
#[command(about = "Tree crown detection and area measurement for drone imagery", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP analysis service
    Serve(ServeArgs),

    /// Analyze a single image and print the result as JSON
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Configuration file path (JSON, TOML or YAML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long, short)]
    port: Option<u16>,

    /// ONNX segmentation model
    #[arg(long)]
    model: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Image to analyze
    image: PathBuf,

    /// Ground sample distance in meters per pixel
    #[arg(long)]
    gsd: Option<f64>,

    /// ONNX segmentation model
    #[arg(long)]
    model: Option<PathBuf>,

    /// Configuration file path (JSON, TOML or YAML)
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Analyze(args) => analyze(args).await,
    }
}

/// Defaults, then the config file, then environment variables.
fn load_config(path: Option<&Path>) -> anyhow::Result<AnalyzerConfig> {
    let mut config = match path {
        Some(path) => AnalyzerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(model) = args.model {
        config.model.path = model;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.validate()?;

    init_logging(&config.log_level);
    info!("Starting {}", crownscope_server::http::SERVICE_NAME);

    let models = Arc::new(ModelManager::new(config.model.clone()));
    if let Err(e) = models.load() {
        // Keep serving so /health can report the failure
        warn!("Continuing without a model: {}", e);
    }

    let state = ApiState::new(models, config.default_gsd()?, config.server.max_upload_bytes);
    let app = create_router(state);

    let listener = bind_listener(&config.server.host, config.server.port)
        .await
        .with_context(|| {
            format!("Failed to bind to {}:{}", config.server.host, config.server.port)
        })?;
    let addr = listener.local_addr()?;

    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(model) = args.model {
        config.model.path = model;
    }
    if let Some(gsd) = args.gsd {
        config.default_gsd = gsd;
    }
    config.validate()?;

    init_logging(&config.log_level);

    let gsd: Gsd = config.default_gsd()?;
    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("Failed to read {}", args.image.display()))?;

    let result = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let models = Arc::new(ModelManager::new(config.model));
        models.load()?;
        let analyzer = CrownAnalyzer::new(models);
        let image = decode_image(&bytes)?;
        Ok(analyzer.analyze_image(&image, gsd)?)
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
