use chrono::Duration;
use crates::{
    application::usecases::reminder_poller::PollerConfig,
    domain::value_objects::retry_policy::RetryPolicy,
    infra::db::postgres::postgres_connection::PgPoolSettings,
};
use url::Url;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub worker_server: WorkerServer,
    /// `None` runs on the in-memory store.
    pub database: Option<Database>,
    pub mail: Mail,
    pub reminders: Reminders,
    pub internal: Internal,
    pub cors: Cors,
}

#[derive(Debug, Clone)]
pub struct WorkerServer {
    pub port: u16,
    pub timeout: u64,
    pub body_limit: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub pool: PgPoolSettings,
}

#[derive(Debug, Clone)]
pub struct Mail {
    /// `None` disables outbound mail; sends are logged and reported as successful.
    pub relay: Option<MailRelay>,
    pub from: String,
    pub send_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct MailRelay {
    pub url: Url,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Reminders {
    pub poll_interval_secs: u64,
    pub batch_size: i64,
    pub claim_ttl: Duration,
    pub default_lead_time: Duration,
    pub retry_policy: RetryPolicy,
    pub clear_last_error_on_success: bool,
}

impl Reminders {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: std::time::Duration::from_secs(self.poll_interval_secs),
            batch_size: self.batch_size,
            claim_ttl: self.claim_ttl,
            retry_policy: self.retry_policy,
            clear_last_error_on_success: self.clear_last_error_on_success,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Internal {
    pub poller_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Cors {
    /// Empty allows any origin.
    pub allowed_origins: Vec<String>,
}
