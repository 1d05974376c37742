use cirrus::auth::JwtAuthenticator;
use cirrus::error::{ErrorKind, Result};
use cirrus::{AppState, router};
use cirrus_cache::{Database, Repository};
use cirrus_config::Config;
use cirrus_storage::BackendHandle;
use cirrus_storage::backend::LocalBackend;
use clap::{Parser, Subcommand};
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "cirrus=info,tower_http=info";

#[derive(Parser)]
#[command(name = "cirrus", about = "Personal cloud file storage server", version)]
struct Cli {
    /// Configuration file (defaults to config.toml in the platform config directory)
    #[arg(short, long, env = "CIRRUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default)
    Serve,
    /// Print a signed bearer token for an owner, for local testing
    Token {
        email: String,
        /// Hours until the token expires
        #[arg(long, default_value_t = 2)]
        hours: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config).await,
        Command::Token { email, hours } => token(cli.config, &email, hours),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "Exiting");
            ExitCode::FAILURE
        },
    }
}

fn load_config(file: Option<PathBuf>) -> Result<Config> {
    cirrus_config::load(file.as_deref()).or_raise(|| ErrorKind::Config)
}

fn token(file: Option<PathBuf>, email: &str, hours: u64) -> Result<()> {
    let config = load_config(file)?;
    let token = JwtAuthenticator::new(&config.auth.secret).issue(email, Duration::from_secs(hours * 3600))?;
    println!("{token}");
    Ok(())
}

async fn serve(file: Option<PathBuf>) -> Result<()> {
    let config = load_config(file)?;

    let backend: BackendHandle =
        Arc::new(LocalBackend::new("local", &config.storage.root).or_raise(|| ErrorKind::Storage)?);
    let backend_name = backend.name().to_string();
    let db = Database::connect(&config.database.path).await.or_raise(|| ErrorKind::Database)?;
    let state = AppState {
        backend,
        cache: Repository::from(&db),
        auth: Arc::new(JwtAuthenticator::new(&config.auth.secret)),
        summarizer: None,
        public_base_url: config.storage.public_base_url.clone(),
    };
    let app = router(state, &config.server.cors_origins, config.storage.max_upload_bytes)?;

    let listener = tokio::net::TcpListener::bind(config.server.address)
        .await
        .or_raise(|| ErrorKind::Serve)?;
    tracing::info!(
        address = %config.server.address,
        backend = %backend_name,
        root = %config.storage.root.display(),
        database = %config.database.path.display(),
        "Listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .or_raise(|| ErrorKind::Serve)?;

    db.close().await;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
