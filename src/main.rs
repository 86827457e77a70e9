use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use smart_bin_orchestrator::app_state::{AppState, ServiceInfo};
use smart_bin_orchestrator::config::AppConfig;
use smart_bin_orchestrator::db::{
    self, device_queries::PgDeviceRepository, job_queries::PgJobRepository,
    memory::{MemoryDeviceRepository, MemoryJobRepository}, DeviceRepository, JobRepository,
};
use smart_bin_orchestrator::routes;
use smart_bin_orchestrator::services::orchestrator::Orchestrator;
use smart_bin_orchestrator::services::storage::S3Presigner;
use smart_bin_orchestrator::services::trust::JwtTrustIssuer;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        env = %config.app_env,
        "Initializing orchestrator"
    );

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    let (jobs, devices): (Arc<dyn JobRepository>, Arc<dyn DeviceRepository>) =
        match &config.database_url {
            Some(url) => {
                tracing::info!("Connecting to PostgreSQL database");
                let pool = db::init_pool(url)
                    .await
                    .expect("Failed to connect to database");

                tracing::info!("Running database migrations");
                db::run_migrations(&pool)
                    .await
                    .expect("Failed to run database migrations");

                (
                    Arc::new(PgJobRepository::new(pool.clone())),
                    Arc::new(PgDeviceRepository::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, state is kept in memory");
                (
                    Arc::new(MemoryJobRepository::new()),
                    Arc::new(MemoryDeviceRepository::new()),
                )
            }
        };

    tracing::info!(bucket = %config.s3_bucket_images, endpoint = %config.s3_endpoint, "Initializing S3 presigner");
    let presigner = S3Presigner::new(
        &config.s3_bucket_images,
        &config.s3_region,
        &config.s3_endpoint,
        &config.s3_access_key,
        &config.s3_secret_key,
        config.s3_path_style,
    )
    .expect("Failed to initialize S3 presigner");

    let trust = JwtTrustIssuer::new(
        &config.service_name,
        &config.device_token_secret,
        config.device_token_ttl(),
    )
    .expect("Failed to initialize device trust issuer");

    let orchestrator = Orchestrator::new(
        config.orchestrator_settings(),
        jobs,
        devices,
        Arc::new(presigner),
        Arc::new(trust),
    );

    let state = AppState::new(
        orchestrator,
        ServiceInfo::new(config.service_name.clone(), config.service_version.clone()),
    );

    let app = routes::router(state, Some(prometheus_handle));

    tracing::info!("Starting orchestrator on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
