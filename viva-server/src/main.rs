use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};
use viva_core::model::{GeminiTransport, GenerateOptions, ResilientModelClient, TextGenerator};
use viva_core::store::{MemoryStore, SessionStore};
use viva_core::VivaConfig;

use viva_server::http::HttpState;
use viva_server::subsystems::interview::InterviewOrchestrator;
use viva_server::{http, server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "viva.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match VivaConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Session store
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());

    if args.health {
        match store.resume("health-probe").await {
            Ok(_) => println!("✅ Session store reachable"),
            Err(e) => {
                println!("❌ Session store check failed: {}", e);
                std::process::exit(1);
            }
        }

        if std::env::var("GOOGLE_API_KEY").unwrap_or_default().is_empty() {
            println!("❌ GOOGLE_API_KEY is not set");
            std::process::exit(1);
        }

        println!("✅ Viva health check passed (model: {})", config.model.model);
        return Ok(());
    }

    // Model client
    let api_key = std::env::var("GOOGLE_API_KEY").unwrap_or_default();
    let transport = match GeminiTransport::new(
        api_key,
        Duration::from_secs(config.model.request_timeout_seconds),
    ) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to create model client: {}", e);
            std::process::exit(1);
        }
    };
    let model: Arc<dyn TextGenerator> =
        Arc::new(ResilientModelClient::from_config(transport, &config.model));

    let orchestrator = Arc::new(InterviewOrchestrator::new(
        store.clone(),
        model,
        config.interview.clone(),
        GenerateOptions::from_config(&config.model),
    ));

    // Shutdown signal
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Spawn HTTP REST API server if enabled
    if config.http.enabled {
        let http_state = Arc::new(HttpState {
            orchestrator: orchestrator.clone(),
            store: store.clone(),
        });
        let http_config = config.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = http::start_http_server(http_state, http_config, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, orchestrator, tx.subscribe()).await?;

    Ok(())
}
