use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use roadmapper::api::{self, AccessConfig};
use roadmapper::config::EngineConfig;
use roadmapper::db::Database;
use roadmapper::render::render_status;
use roadmapper::service::{Collaborators, RoadmapService};

const DEFAULT_PORT: u16 = 17010;

#[derive(Parser)]
#[command(name = "roadmapper")]
#[command(about = "Refine project ideas into trackable learning roadmaps")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Database file (defaults to the platform data directory)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Print a project's roadmap as a tree
    Status {
        /// Project id
        project: Uuid,

        /// Database file (defaults to the platform data directory)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "roadmapper=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(path: Option<PathBuf>) -> anyhow::Result<Database> {
    let db = match path {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate().context("Failed to migrate database")?;
    Ok(db)
}

fn build_service(db: Database) -> anyhow::Result<RoadmapService> {
    let config = EngineConfig::from_env().context("Invalid engine configuration")?;
    Ok(RoadmapService::new(db, Collaborators::from_env(), config))
}

async fn serve(port: u16, db: Option<PathBuf>) -> anyhow::Result<()> {
    tracing::info!("Starting Roadmapper server on port {}", port);

    let service = build_service(open_database(db)?)?;
    let access = AccessConfig::from_env().context("Invalid access configuration")?;
    let app = api::create_router_with_config(service, access);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Roadmapper server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve { port, db }) => serve(port, db).await?,
        Some(Commands::Status { project, db }) => {
            let service = build_service(open_database(db)?)?;
            let status = service.get_status(project)?;
            print!("{}", render_status(&status));
        }
        None => serve(DEFAULT_PORT, None).await?,
    }

    Ok(())
}
