//! Alfred mock server
//!
//! Usage:
//!   alfred-mock [--config alfred.yaml] [--port 8080] [--mocks-dir user-files/mocks]

use alfred_mock::logging;
use alfred_mock::{create_store, AppState, Config, MockEngine, MockServer};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "alfred-mock")]
#[command(author, version, about = "HTTP mock server with helpers, JavaScript hooks and a shared store")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "ALFRED_CONFIG")]
    config: Option<PathBuf>,

    /// Listen port, overrides the configuration file
    #[arg(short, long, env = "ALFRED_PORT")]
    port: Option<u16>,

    /// Directory of mock definitions
    #[arg(long, env = "ALFRED_MOCKS_DIR")]
    mocks_dir: Option<PathBuf>,

    /// Directory of script files
    #[arg(long, env = "ALFRED_FUNCTIONS_DIR")]
    functions_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = "ALFRED_LOG_LEVEL")]
    log_level: Option<String>,

    /// Load and compile the mocks, report problems and exit
    #[arg(long)]
    validate: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn effective_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(dir) = &self.mocks_dir {
            config.core.mocks_dir = dir.clone();
        }
        if let Some(dir) = &self.functions_dir {
            config.core.functions_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.effective_config()?;

    if args.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let log_level = Arc::new(logging::init(&config.logging)?);

    let store = create_store(&config.store)?;
    let engine = Arc::new(MockEngine::new(&config, store)?);

    match engine.reload().await {
        Ok(summary) => info!(
            "Loaded {} mocks from {}",
            summary.mocks,
            config.core.mocks_dir.display()
        ),
        Err(e) => {
            for message in e.messages() {
                error!("{}", message);
            }
            anyhow::bail!("{}", e);
        }
    }

    if args.validate {
        info!("Mock definitions are valid");
        return Ok(());
    }

    let state = Arc::new(AppState {
        engine,
        log_level,
        admin_enabled: config.admin.enabled,
    });
    let server = MockServer::bind(&config.listen.bind_address(), state).await?;
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            let _ = shutdown.send(());
        }
    });

    server.run().await
}
