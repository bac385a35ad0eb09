use std::{sync::Arc, time::Duration};

use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

use doctrail::{
    auth::jwt::JwtService,
    config::{AppConfig, StoreBackend},
    db, default_handlers,
    email::{EmailSender, NoopMailer, WebhookMailer},
    routes::create_router,
    s3::build_client,
    state::AppState,
    storage::{FileStore, MemoryFileStore, S3FileStore},
    store::{DataStore, MemStore, PgStore},
    Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        store_backend = ?config.store_backend,
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = config.s3_bucket.as_deref().unwrap_or("(in-memory)"),
        email_gateway = config.email_gateway_url.is_some(),
        "loaded doctrail configuration"
    );

    let store: Arc<dyn DataStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::init_pool_with_size(
                config.require_database_url()?,
                config.database_max_pool_size,
            )?;
            let store = PgStore::new(pool);
            store.run_migrations()?;
            Arc::new(store)
        }
        StoreBackend::Memory => Arc::new(MemStore::new()),
    };

    let storage: Arc<dyn FileStore> = match &config.s3_bucket {
        Some(bucket) => {
            let client = build_client(&config).await?;
            Arc::new(S3FileStore::new(client, bucket.clone()))
        }
        None => {
            tracing::warn!("S3_BUCKET not set; keeping uploads in process memory");
            Arc::new(MemoryFileStore::new())
        }
    };

    let mailer: Arc<dyn EmailSender> = match &config.email_gateway_url {
        Some(url) => Arc::new(WebhookMailer::new(
            url.clone(),
            config.email_gateway_token.clone(),
            config.app_name.clone(),
        )),
        None => Arc::new(NoopMailer),
    };

    let jwt = JwtService::from_config(&config);
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let store_backend = config.store_backend;
    let state = AppState::new(store, storage, mailer, config, jwt);

    // The memory queue is process-local, so a standalone worker binary could
    // never see its jobs. Dispatch runs inside the server instead.
    if store_backend == StoreBackend::Memory {
        tracing::info!("memory backend active; dispatching notifications in process");
        let worker = Worker::new(
            Arc::new(state.clone()),
            default_handlers(),
            Duration::from_secs(2),
        );
        tokio::spawn(async move { worker.run().await });
    }

    let app = create_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "doctrail listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if signal::ctrl_c().await.is_ok() {
        tracing::info!("server received shutdown signal");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
