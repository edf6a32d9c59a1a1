use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use task_service::domain::{CommentStore, TaskStore};
use task_service::notifications::NotificationPublisher;
use task_service::{AppState, Config, create_app};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use core_lib::adapters::grpc_user_directory::GrpcUserDirectory;
use core_lib::adapters::rabbitmq_event_bus::RabbitMqEventBus;
use core_lib::{EventPublisher, UserDirectory};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), BoxError> {
    info!("Applying database migrations...");
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new("./migrations")).await?;
    migrator.run(pool).await?;
    info!("Migrations applied successfully.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize tracing (logging)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Task Service v{}...", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_env()?);

    // --- Database ---
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    run_migrations(&pool).await?;
    info!("Database connection pool established.");

    // --- Broker ---
    let bus = RabbitMqEventBus::connect(&config.amqp_uri, &config.exchange).await?;
    bus.declare_notification_topology().await?;
    let bus: Arc<dyn EventPublisher> = Arc::new(bus);

    // --- Notification publishing ---
    let (publisher, _publish_worker) = NotificationPublisher::spawn(bus);

    // --- User directory ---
    let directory: Arc<dyn UserDirectory> =
        Arc::new(GrpcUserDirectory::connect_lazy(config.user_directory_addr.clone())?);

    let state = AppState {
        tasks: TaskStore::new(pool.clone()),
        comments: CommentStore::new(pool),
        publisher,
        directory,
        config: config.clone(),
    };
    let app = create_app(state);

    info!("Task Service listening on {}", config.http_addr);
    let listener = TcpListener::bind(config.http_addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
