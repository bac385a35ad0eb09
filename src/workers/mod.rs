use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{models::Job, state::AppState, store::StoreResult};

pub mod notify;

#[derive(Debug)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        state: Arc<AppState>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: Duration,
    ) -> Self {
        let map = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers: map,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        info!("worker started");
        loop {
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Claims and executes at most one job. Returns whether a job was
    /// found, which lets callers drain the queue without sleeping.
    pub async fn process_next(&self) -> StoreResult<bool> {
        let job_types: Vec<&str> = self.handlers.keys().copied().collect();
        if job_types.is_empty() {
            return Ok(false);
        }

        let Some(job) = self.state.store.reserve_job(&job_types).await? else {
            return Ok(false);
        };

        match self.handlers.get(job.job_type.as_str()) {
            Some(handler) => {
                let result = handler.handle(self.state.clone(), job.clone()).await;
                match result {
                    JobExecution::Success => {
                        self.state.store.mark_job_succeeded(job.id).await?;
                        info!(job_id = %job.id, job_type = %job.job_type, "job completed");
                    }
                    JobExecution::Retry { delay, error } => {
                        warn!(job_id = %job.id, job_type = %job.job_type, %error, "job will retry");
                        let delay = ChronoDuration::from_std(delay)
                            .unwrap_or_else(|_| ChronoDuration::seconds(30));
                        self.state
                            .store
                            .retry_job_after(job.id, delay, &error)
                            .await?;
                    }
                    JobExecution::Failed { error } => {
                        error!(job_id = %job.id, job_type = %job.job_type, %error, "job failed");
                        self.state.store.mark_job_failed(job.id, &error).await?;
                    }
                }
            }
            None => {
                error!(job_type = %job.job_type, "no handler registered for job type");
                self.state
                    .store
                    .mark_job_failed(job.id, "no handler registered")
                    .await?;
            }
        }

        Ok(true)
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![Arc::new(notify::DispatchNotificationsJob::new())]
}
