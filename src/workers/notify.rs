use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    models::{Job, NewNotification},
    notify::NotificationBatch,
    state::AppState,
    store::JOB_DISPATCH_NOTIFICATIONS,
};

use super::{JobExecution, JobHandler};

const MAX_ATTEMPTS: i32 = 5;
const RETRY_BASE: Duration = Duration::from_secs(30);

/// Delivers a planned fan-out batch: inserts the in-app rows by their
/// pre-generated ids and sends emails best-effort. Replays skip rows that
/// already landed, so a retried job never double-notifies.
pub struct DispatchNotificationsJob;

impl DispatchNotificationsJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for DispatchNotificationsJob {
    fn job_type(&self) -> &'static str {
        JOB_DISPATCH_NOTIFICATIONS
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let batch: NotificationBatch = match serde_json::from_value(job.payload.clone()) {
            Ok(batch) => batch,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid dispatch payload: {err}"),
                }
            }
        };

        let mut delivered = 0usize;
        let mut replayed = 0usize;
        for planned in batch.notices {
            let recipient = planned.user_id;
            let inserted = match state
                .store
                .insert_notification(NewNotification::from(planned))
                .await
            {
                Ok(inserted) => inserted,
                Err(err) => {
                    if job.attempts >= MAX_ATTEMPTS {
                        return JobExecution::Failed {
                            error: format!("giving up after {} attempts: {err}", job.attempts),
                        };
                    }
                    return JobExecution::Retry {
                        delay: RETRY_BASE * job.attempts.max(1) as u32,
                        error: err.to_string(),
                    };
                }
            };

            let Some(notification) = inserted else {
                replayed += 1;
                continue;
            };
            delivered += 1;

            let user = match state.store.user(recipient).await {
                Ok(Some(user)) if user.active => user,
                Ok(_) => continue,
                Err(err) => {
                    warn!(
                        notification_id = %notification.id,
                        error = %err,
                        "recipient lookup failed; skipping email"
                    );
                    continue;
                }
            };

            let sent = state
                .mailer
                .send(&user.email, &notification.title, &notification.message)
                .await;
            if sent {
                if let Err(err) = state.store.mark_email_sent(notification.id).await {
                    warn!(
                        notification_id = %notification.id,
                        error = %err,
                        "email went out but the sent stamp failed"
                    );
                }
            }
        }

        info!(job_id = %job.id, delivered, replayed, "notification batch dispatched");
        JobExecution::Success
    }
}
