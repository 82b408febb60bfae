mod config;
mod error;
mod handlers;
mod models;
mod services;
mod web; // Upload page + /analyze endpoint

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use config::Config;
use handlers::analysis::{DEFAULT_PROMPT, DEFAULT_TEMPERATURE};
use handlers::AnalysisHandler;
use models::UploadedImage;
use services::image_prep::check_declared_size;
use services::GroqVisionService;

#[derive(Debug, Parser)]
#[command(name = "nutrivision", version, about = "Calorie estimates for meal photos via Groq Vision")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze a single meal photo and print the estimate
    Analyze(AnalyzeArgs),
    /// Serve the upload page and /analyze endpoint
    #[cfg(feature = "web-server")]
    Serve(ServeArgs),
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    /// JPG or PNG meal photo
    image: PathBuf,
    /// Instruction sent along with the image
    #[arg(long)]
    prompt: Option<String>,
    /// Sampling temperature, 0.0 to 1.0
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE, value_parser = web::parse_temperature)]
    temperature: f64,
}

#[cfg(feature = "web-server")]
#[derive(Debug, Parser)]
struct ServeArgs {
    /// Overrides NUTRIVISION_BIND
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load environment variables
    dotenv().ok();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ {}", e);
            anyhow::bail!("{}", e);
        }
    };

    let groq = Arc::new(GroqVisionService::new(&config)?);
    log::info!("✅ Groq service initialized with model: {}", groq.model());

    let handler = Arc::new(AnalysisHandler::new(groq));

    match cli.command {
        Command::Analyze(args) => run_analyze(&handler, args).await,
        #[cfg(feature = "web-server")]
        Command::Serve(args) => {
            let bind_addr = args.bind.unwrap_or_else(|| config.bind_addr.clone());
            run_server(handler, &bind_addr).await
        }
    }
}

async fn run_analyze(handler: &AnalysisHandler, args: AnalyzeArgs) -> Result<()> {
    let declared_size = fs::metadata(&args.image)
        .with_context(|| format!("Failed to read {}", args.image.display()))?
        .len();
    check_declared_size(declared_size).map_err(|e| anyhow::anyhow!("❌ {}", e))?;

    let bytes = fs::read(&args.image)
        .with_context(|| format!("Failed to read {}", args.image.display()))?;
    let file_name = args
        .image
        .file_name()
        .map(|name| name.to_string_lossy().to_string());

    let mut upload = UploadedImage::new(bytes, file_name);
    upload.declared_size = declared_size;

    let prompt = args.prompt.as_deref().unwrap_or(DEFAULT_PROMPT);

    println!("🔍 Analyzing image with Groq Vision...");
    let outcome = handler
        .analyze(&upload, prompt, args.temperature)
        .await
        .map_err(|e| anyhow::anyhow!("❌ {}", e))?;

    if !outcome.is_success() {
        log::warn!("⚠️ Analysis did not produce an estimate");
    }

    println!("\n🧠 AI Analysis\n");
    println!("{}", outcome.into_text());

    Ok(())
}

#[cfg(feature = "web-server")]
async fn run_server(handler: Arc<AnalysisHandler>, bind_addr: &str) -> Result<()> {
    let app = web::server::create_router(handler);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;

    log::info!("🌐 NutriVision listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}
