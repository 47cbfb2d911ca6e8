use std::sync::Arc;

use anyhow::Context;
use bail_intake::config::{BlobBackend, Config};
use bail_intake::routes::create_routes;
use bail_intake::services::blob::{BlobStore, MemoryBlobStore};
use bail_intake::services::intake::IntakeUploader;
use bail_intake::services::mailer::Notifier;
use bail_intake::services::s3::S3BlobStore;
use bail_intake::state::AppState;
use bail_intake::telemetry;
use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

#[derive(Parser)]
#[command(name = "bail-intake", version, about = "Document intake service for lease cases")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Apply pending migrations, then serve the HTTP API (default)
    Serve,
    /// Apply pending migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;

    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    Migrator::up(&db, None).await.context("Failed to apply migrations")?;
    tracing::info!("Migrations applied");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => Ok(()),
        Command::Serve => serve(config, db).await,
    }
}

async fn serve(config: Config, db: DatabaseConnection) -> anyhow::Result<()> {
    let blobs: Arc<dyn BlobStore> = match config.blob.backend {
        BlobBackend::S3 => {
            let store = S3BlobStore::new(&config.blob).await?;
            store.ensure_bucket_exists().await?;
            tracing::info!(bucket = %store.bucket_name, "Using S3 blob storage");
            Arc::new(store)
        }
        BlobBackend::Memory => {
            tracing::warn!("Using in-memory blob storage, uploads are lost on restart");
            Arc::new(MemoryBlobStore::new(format!("http://{}/blobs", config.bind_addr)))
        }
    };

    let mut uploader = IntakeUploader::new(db, blobs, config.upload.clone(), config.storage_retry);
    if let Some(mail) = &config.mail {
        tracing::info!(to = %mail.notify_to, "Document notifications enabled");
        uploader = uploader.with_notifier(Notifier::from_config(mail)?);
    }

    let app = create_routes(AppState::new(uploader));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
