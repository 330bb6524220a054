//! EchoPod CLI
//!
//! Entry point for running the EchoPod backend: `echopod serve` starts the
//! HTTP API, `echopod init-db` resets and seeds the database.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use echopod_server::{create_router, hash_password, AppState, Config};
use echopod_store::{seed, Store};

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 5000;

/// Default bind address.
const DEFAULT_HOST: &str = "127.0.0.1";

/// Password assigned to the seeded admin account. Change it after first
/// login.
const SEED_ADMIN_PASSWORD: &str = "password";

/// Sample subtitle file used to give the seeded courses sentences.
const SAMPLE_SRT_FILE: &str = "sample.srt";

/// EchoPod - listening practice backend
///
/// Serves the REST API for courses, learner progress, and the hearts
/// mechanic.
#[derive(Parser, Debug)]
#[command(name = "echopod")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: echopod.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,
    },
    /// Drop, recreate, and seed the database
    InitDb,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match args.command {
        Command::Serve { port, ref host } => {
            run_server(args.config.as_deref(), host, port).await
        }
        Command::InitDb => init_db(args.config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration from the specified path or the default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Reads the bundled sample subtitle file, if present in the working
/// directory.
fn load_sample_srt() -> Option<String> {
    std::fs::read_to_string(SAMPLE_SRT_FILE).ok()
}

/// Opens the store and seeds it if empty.
fn open_and_seed(config: &Config) -> anyhow::Result<Store> {
    let store = Store::open(&config.database)?;

    let admin_hash =
        hash_password(SEED_ADMIN_PASSWORD).map_err(|e| anyhow::anyhow!("{e}"))?;
    let summary = seed(&store, &admin_hash, load_sample_srt().as_deref(), Utc::now())?;
    if summary.users_created > 0 || summary.courses_created > 0 {
        tracing::info!(
            users = summary.users_created,
            courses = summary.courses_created,
            sentences = summary.sentences_created,
            "Seeded empty database"
        );
    }

    Ok(store)
}

/// Runs the HTTP API server until Ctrl+C.
async fn run_server(config_path: Option<&str>, host: &str, port: u16) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    print_config(&config);

    std::fs::create_dir_all(&config.upload_dir).map_err(|e| {
        anyhow::anyhow!(
            "Failed to create upload directory '{}': {e}",
            config.upload_dir
        )
    })?;

    let store = open_and_seed(&config)?;
    let state = Arc::new(AppState::new(config, store).map_err(|e| anyhow::anyhow!("{e}"))?);
    let router = create_router(state);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{host}:{port}': {e}"))?;

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port")
    })?;

    println!("EchoPod API listening on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(%addr, "Server started");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves when Ctrl+C is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    } else {
        tracing::info!("Received Ctrl+C, shutting down");
    }
}

/// Drops and recreates the schema, then seeds it.
fn init_db(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let store = Store::open(&config.database)?;
    store.reset()?;

    let admin_hash =
        hash_password(SEED_ADMIN_PASSWORD).map_err(|e| anyhow::anyhow!("{e}"))?;
    let summary = seed(&store, &admin_hash, load_sample_srt().as_deref(), Utc::now())?;

    println!("Initialized and seeded the database at '{}'", config.database);
    println!("  Users created: {}", summary.users_created);
    println!("  Courses created: {}", summary.courses_created);
    println!("  Sentences created: {}", summary.sentences_created);

    Ok(())
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Database: {}", config.database);
    println!("  Upload directory: {}", config.upload_dir);
    println!("  Token expiry: {}h", config.token_expiry_hours);
    println!("  CAPTCHA TTL: {}m", config.captcha_ttl_minutes);
    println!("  Max upload size: {} bytes", config.max_upload_bytes);
    println!("  Max hearts: {}", config.max_hearts);
}
