use std::sync::Arc;

use crate::{
    auth::jwt::JwtService, config::AppConfig, email::EmailSender, lifecycle::Lifecycle,
    storage::FileStore, store::DataStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub storage: Arc<dyn FileStore>,
    pub mailer: Arc<dyn EmailSender>,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DataStore>,
        storage: Arc<dyn FileStore>,
        mailer: Arc<dyn EmailSender>,
        config: AppConfig,
        jwt: JwtService,
    ) -> Self {
        Self {
            store,
            storage,
            mailer,
            config: Arc::new(config),
            jwt,
        }
    }

    /// A lifecycle engine bound to this state's store.
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.store.clone())
    }
}
