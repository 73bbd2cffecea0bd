use std::sync::Arc;
use std::time::Duration;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studioledger::{
    api,
    config::Settings,
    payments::{MercadoPagoClient, PaymentGateway},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studioledger=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting Studioledger server on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Initialize the payment gateway client if configured
    let gateway: Option<Arc<dyn PaymentGateway>> = if settings.gateway.enabled {
        match MercadoPagoClient::new(&settings.gateway) {
            Ok(client) => {
                tracing::info!("Payment gateway enabled at {}", settings.gateway.base_url);
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!("Payment gateway enabled but misconfigured: {}", e);
                None
            }
        }
    } else {
        tracing::info!("Payment gateway disabled");
        None
    };

    if settings.gateway.webhook_secret.is_none() {
        tracing::warn!("No webhook secret configured; gateway notifications are not signature-checked");
    }

    let service_context = Arc::new(ServiceContext::new(db_pool.clone(), gateway, &settings));

    // Background workers
    service_context.audit_service.spawn_retry_worker().await;
    service_context
        .grace_period_service
        .clone()
        .spawn_sweeper(Duration::from_secs(settings.scheduler.grace_sweep_interval_secs));

    let app = api::create_app(service_context, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}
