use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voxorder::automation::AutomationSession;
use voxorder::config::{Config, LoggingConfig, duration_or};
use voxorder::server::{self, AppState};
use voxorder::session::spawn_sweeper;
use voxorder::{PipelineInput, Runtime};

#[derive(Parser)]
#[command(name = "voxorder", version)]
#[command(about = "Voice-driven food ordering with live menu resolution")]
struct Cli {
    /// Config file (defaults to $VOXORDER_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Override `server.bind`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one ordering turn and print the response as JSON
    Order {
        text: String,
        /// Continue an open clarification session
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        restaurant: Option<String>,
    },
    /// Scrape a restaurant's menu and print it as JSON
    Menu { restaurant: String },
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("voxorder={},tower_http=info", config.level)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    init_logging(&config.logging);

    let runtime = Runtime::build(&config).await?;
    let outcome = run(cli.command, &config, &runtime).await;
    runtime.shutdown().await;
    outcome
}

async fn run(command: Command, config: &Config, runtime: &Runtime) -> Result<()> {
    runtime
        .browser
        .initialize()
        .await
        .context("browser session failed to initialize")?;

    match command {
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| config.server.bind.clone());
            let sweeper = spawn_sweeper(
                runtime.pipeline.sessions().clone(),
                duration_or(&config.session.sweep_interval, Duration::from_secs(60)),
            );
            let state = AppState::new(runtime.pipeline.clone(), &config.speech);
            let served = tokio::select! {
                r = server::serve(state, &addr) => r,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    Ok(())
                }
            };
            sweeper.abort();
            served
        }
        Command::Order {
            text,
            session,
            restaurant,
        } => {
            let response = runtime
                .pipeline
                .process(PipelineInput {
                    text: Some(text),
                    audio: None,
                    session_id: session.map(Into::into),
                    restaurant,
                })
                .await?;
            if response.session_id.is_some() {
                warn!("Order needs clarification; the session only lives as long as this process");
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Command::Menu { restaurant } => {
            let catalog = runtime.browser.scrape_catalog(&restaurant).await?;
            println!("{}", serde_json::to_string_pretty(&catalog)?);
            Ok(())
        }
    }
}
