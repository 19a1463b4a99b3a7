mod config;

use clap::{Parser, Subcommand};
use conclave_core::AgentType;
use conclave_gateway::{AppState, AuthConfig, GatewayServer};
use conclave_orchestrator::{AsyncTaskService, ExecutionCoordinator, TaskDispatcher};
use config::ConclaveConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conclave", about = "Conclave: AI agent workflow orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conclave.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway and the async worker pool
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List registered workflow templates
    Workflows,
    /// Validate the config and optionally health-check every backend
    Check {
        #[arg(long)]
        ping: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = ConclaveConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await?,
        Commands::Workflows => {
            let registry = config.build_registry()?;
            println!("Registered workflows:");
            for wf in registry.list() {
                let agents: Vec<&str> = wf.agent_types.iter().map(AgentType::as_str).collect();
                println!("  {}: {}", wf.name, wf.description);
                println!("    agents: {}", agents.join(", "));
                if !wf.required_context.is_empty() {
                    println!("    context: {}", wf.required_context.join(", "));
                }
            }
            println!("\nTotal: {} workflow(s)", registry.len());
        }
        Commands::Check { ping } => {
            let router = config.build_router()?;
            let registry = config.build_registry()?;
            println!(
                "Config OK: {} backend(s), {} workflow(s)",
                router.backend_ids().len(),
                registry.len()
            );
            for route in router.routes() {
                println!(
                    "  {:<13} -> {} (fallback: {})",
                    route.agent_type.as_str(),
                    route.primary,
                    route.fallback.as_deref().unwrap_or("none")
                );
            }
            if ping {
                let mut down = 0;
                for b in router.health().await {
                    println!("  {} {}", if b.healthy { "up  " } else { "DOWN" }, b.id);
                    if !b.healthy {
                        down += 1;
                    }
                }
                if down > 0 {
                    anyhow::bail!("{down} backend(s) failed their health check");
                }
            }
        }
    }

    Ok(())
}

async fn serve(config: ConclaveConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let router = Arc::new(config.build_router()?);
    info!(backends = ?router.backend_ids(), "Backends registered");
    let registry = Arc::new(config.build_registry()?);
    info!(count = registry.len(), "Workflow templates registered");

    let dispatcher = Arc::new(TaskDispatcher::new(router));
    let coordinator = Arc::new(ExecutionCoordinator::new(
        dispatcher.clone(),
        config.workflow.coordinator.clone(),
    ));
    let service = Arc::new(AsyncTaskService::new(dispatcher, config.queue.clone()));
    service.start().await;

    let auth = AuthConfig::new(config.security.api_keys.clone());
    if auth.is_enabled() {
        info!(keys = auth.api_keys.len(), "API key auth enabled");
    } else {
        warn!("No API keys configured; gateway is open");
    }

    let app = GatewayServer::build_with_auth(
        AppState {
            registry,
            coordinator,
            service: service.clone(),
        },
        auth,
    );

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Conclave gateway listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Shutting down worker pool");
    service.shutdown().await;
    Ok(())
}
