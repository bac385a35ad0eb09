use std::{sync::Arc, time::Duration};

use anyhow::bail;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use doctrail::{
    auth::jwt::JwtService,
    config::{AppConfig, StoreBackend},
    db, default_handlers,
    email::{EmailSender, NoopMailer, WebhookMailer},
    s3::build_client,
    state::AppState,
    storage::{FileStore, MemoryFileStore, S3FileStore},
    store::PgStore,
    Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    if config.store_backend == StoreBackend::Memory {
        bail!("the worker needs the postgres backend; the memory queue is process-local");
    }
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        email_gateway = config.email_gateway_url.is_some(),
        "loaded doctrail configuration"
    );

    let pool = db::init_pool_with_size(config.require_database_url()?, 1)?;
    let store = Arc::new(PgStore::new(pool));

    let storage: Arc<dyn FileStore> = match &config.s3_bucket {
        Some(bucket) => {
            let client = build_client(&config).await?;
            Arc::new(S3FileStore::new(client, bucket.clone()))
        }
        None => Arc::new(MemoryFileStore::new()),
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
    let state = Arc::new(AppState::new(store, storage, mailer, config, jwt));
    let worker = Worker::new(state, default_handlers(), Duration::from_secs(2));

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
