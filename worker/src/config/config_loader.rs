use super::config_model::{
    Cors, Database, DotEnvyConfig, Internal, Mail, MailRelay, Reminders, WorkerServer,
};
use anyhow::{Context, Result, bail};
use chrono::Duration;
use crates::{
    application::usecases::{
        reminder_poller::{DEFAULT_BATCH_SIZE, DEFAULT_CLAIM_TTL_SECS, DEFAULT_POLL_INTERVAL},
        schedule_reminder::DEFAULT_LEAD_TIME_MINUTES,
    },
    domain::value_objects::retry_policy::{Backoff, RetryPolicy},
    infra::db::postgres::postgres_connection::PgPoolSettings,
};
use std::str::FromStr;
use url::Url;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    load_from(|key| std::env::var(key).ok())
}

/// Builds the config from an arbitrary variable source. Blank values count as unset.
pub fn load_from<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env(lookup);

    let worker_server = WorkerServer {
        port: env
            .parse("SERVER_PORT_WORKER")?
            .context("SERVER_PORT_WORKER is required")?,
        body_limit: env.parse_or("SERVER_BODY_LIMIT", 1)?,
        timeout: env.parse_or("SERVER_TIMEOUT", 30)?,
    };

    let database = match env.string("DATABASE_URL") {
        Some(url) => {
            let defaults = PgPoolSettings::default();
            let pool = PgPoolSettings {
                max_size: env.parse_or("DATABASE_POOL_MAX_SIZE", defaults.max_size)?,
                connection_timeout: std::time::Duration::from_secs(env.parse_or(
                    "DATABASE_CONNECT_TIMEOUT_SECS",
                    defaults.connection_timeout.as_secs(),
                )?),
            };
            if pool.max_size == 0 {
                bail!("DATABASE_POOL_MAX_SIZE must be greater than zero");
            }
            Some(Database { url, pool })
        }
        None => None,
    };

    let relay = match env.string("MAIL_RELAY_URL") {
        Some(raw) => Some(MailRelay {
            url: Url::parse(&raw).context("MAIL_RELAY_URL is invalid")?,
            token: env.string("MAIL_RELAY_TOKEN"),
        }),
        None => None,
    };

    let mail = Mail {
        relay,
        from: env
            .string("MAIL_FROM")
            .unwrap_or_else(|| "reminders@localhost".to_string()),
        send_timeout_secs: env.parse_or("MAIL_SEND_TIMEOUT_SECS", 10)?,
    };
    if mail.send_timeout_secs == 0 {
        bail!("MAIL_SEND_TIMEOUT_SECS must be greater than zero");
    }

    let reminders = Reminders {
        poll_interval_secs: env
            .parse_or("REMINDER_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL.as_secs())?,
        batch_size: env.parse_or("REMINDER_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
        claim_ttl: env.seconds_or("REMINDER_CLAIM_TTL_SECS", DEFAULT_CLAIM_TTL_SECS)?,
        default_lead_time: env
            .minutes_or("REMINDER_DEFAULT_LEAD_MINUTES", DEFAULT_LEAD_TIME_MINUTES)?,
        retry_policy: retry_policy(&env)?,
        clear_last_error_on_success: env.bool_or("REMINDER_CLEAR_LAST_ERROR_ON_SUCCESS", false)?,
    };
    if reminders.poll_interval_secs == 0 {
        bail!("REMINDER_POLL_INTERVAL_SECS must be greater than zero");
    }
    if reminders.batch_size <= 0 {
        bail!("REMINDER_BATCH_SIZE must be greater than zero");
    }
    if reminders.claim_ttl <= Duration::zero() {
        bail!("REMINDER_CLAIM_TTL_SECS must be greater than zero");
    }
    // A claim is renewed before each send, so it only has to outlive one attempt.
    let send_timeout = std::time::Duration::from_secs(mail.send_timeout_secs);
    if reminders
        .claim_ttl
        .to_std()
        .map_or(true, |claim_ttl| claim_ttl <= send_timeout)
    {
        bail!("REMINDER_CLAIM_TTL_SECS must be greater than MAIL_SEND_TIMEOUT_SECS");
    }
    if reminders.default_lead_time < Duration::zero() {
        bail!("REMINDER_DEFAULT_LEAD_MINUTES must not be negative");
    }

    let internal = Internal {
        poller_token: env.string("INTERNAL_POLLER_TOKEN"),
    };

    let cors = Cors {
        allowed_origins: env
            .string("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
    };

    Ok(DotEnvyConfig {
        worker_server,
        database,
        mail,
        reminders,
        internal,
        cors,
    })
}

fn retry_policy<F>(env: &Env<F>) -> Result<RetryPolicy>
where
    F: Fn(&str) -> Option<String>,
{
    let max_attempts: Option<u32> = env.parse("REMINDER_MAX_ATTEMPTS")?;
    if max_attempts == Some(0) {
        bail!("REMINDER_MAX_ATTEMPTS must be greater than zero");
    }

    let backoff = match env
        .string("REMINDER_BACKOFF")
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        None | Some("none") => Backoff::None,
        Some("exponential") => {
            let base = env.seconds_or("REMINDER_BACKOFF_BASE_SECS", 30)?;
            let max = env.seconds_or("REMINDER_BACKOFF_MAX_SECS", 3600)?;
            if base <= Duration::zero() || max < base {
                bail!("REMINDER_BACKOFF_BASE_SECS must be positive and not exceed REMINDER_BACKOFF_MAX_SECS");
            }
            Backoff::Exponential { base, max }
        }
        Some(other) => bail!("REMINDER_BACKOFF must be `none` or `exponential`, got `{other}`"),
    };

    Ok(RetryPolicy {
        max_attempts,
        backoff,
    })
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.string(key)
            .map(|raw| raw.parse::<T>().with_context(|| format!("{key} is invalid")))
            .transpose()
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    fn seconds_or(&self, key: &str, default: i64) -> Result<Duration> {
        let seconds = self.parse_or(key, default)?;
        Duration::try_seconds(seconds).with_context(|| format!("{key} is out of range"))
    }

    fn minutes_or(&self, key: &str, default: i64) -> Result<Duration> {
        let minutes = self.parse_or(key, default)?;
        Duration::try_minutes(minutes).with_context(|| format!("{key} is out of range"))
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.string(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(_) => bail!("{key} is invalid"),
        }
    }
}
