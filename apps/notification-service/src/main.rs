use dotenvy::dotenv;
use notification_service::store::NotificationStore;
use notification_service::ws::ConnectionHub;
use notification_service::{AppState, Config, consumer, create_app, grpc};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use core_lib::adapters::rabbitmq_event_bus::RabbitMqEventBus;

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

    info!(
        "Starting Notification Service v{}...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(Config::from_env()?);

    // --- Database ---
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    run_migrations(&pool).await?;
    let store = NotificationStore::new(pool);
    info!("Database connection pool established.");

    // --- Broker ---
    let bus = Arc::new(RabbitMqEventBus::connect(&config.amqp_uri, &config.exchange).await?);
    bus.declare_notification_topology().await?;

    // --- Connection manager ---
    let hub = Arc::new(ConnectionHub::new(config.ws_send_buffer));

    // --- Consumers ---
    {
        let bus = bus.clone();
        let store = store.clone();
        let prefetch = config.consumer_prefetch;
        tokio::spawn(async move {
            if let Err(e) = consumer::persistence::run(bus, store, prefetch).await {
                error!("Persistence consumer exited: {}", e);
            }
        });
    }
    {
        let bus = bus.clone();
        let hub = hub.clone();
        let prefetch = config.consumer_prefetch;
        tokio::spawn(async move {
            if let Err(e) = consumer::distribution::run(bus, hub, prefetch).await {
                error!("Distribution consumer exited: {}", e);
            }
        });
    }

    // --- gRPC query service ---
    {
        let service =
            grpc::NotificationQueryService::new(store.clone(), config.jwt_secret.clone());
        let grpc_addr = config.grpc_addr;
        tokio::spawn(async move {
            info!("gRPC query service listening on {}", grpc_addr);
            if let Err(e) = tonic::transport::Server::builder()
                .add_service(service.into_server())
                .serve(grpc_addr)
                .await
            {
                error!("gRPC server exited: {}", e);
            }
        });
    }

    // --- HTTP ---
    let state = AppState {
        store,
        hub,
        config: config.clone(),
    };
    let app = create_app(state);

    info!("Notification Service listening on {}", config.http_addr);
    let listener = TcpListener::bind(config.http_addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
