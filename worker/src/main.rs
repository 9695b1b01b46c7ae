use anyhow::Result;
use crates::{
    application::usecases::{
        dispatch_reminder::ReminderDispatcher,
        reminder_poller::{PollerHandle, ReminderPoller},
        render_reminder::ContestMessageRenderer,
        schedule_reminder::ReminderSchedulingUseCase,
    },
    domain::repositories::{mail_transport::MailTransport, reminders::ReminderRepository},
    infra::{
        db::{
            postgres::postgres_connection,
            repositories::{
                reminders::ReminderPostgres, reminders_in_memory::InMemoryReminderRepository,
            },
        },
        mail::{
            http_relay::{HttpMailRelay, HttpMailRelayConfig},
            logging::LoggingMailTransport,
        },
    },
};
use reminder_worker::{axum_http, config};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(error) = run().await {
        error!("Worker exited with error: {:#}", error);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    crates::observability::init_observability("worker")?;

    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!("ENV has been loaded");

    let reminder_repository: Arc<dyn ReminderRepository + Send + Sync> =
        match &dotenvy_env.database {
            Some(database) => {
                let postgres_pool =
                    postgres_connection::establish_connection(&database.url, &database.pool)?;
                info!("Postgres connection has been established");
                Arc::new(ReminderPostgres::new(Arc::new(postgres_pool)))
            }
            None => {
                warn!("DATABASE_URL is not set; reminders are kept in memory and lost on restart");
                Arc::new(InMemoryReminderRepository::new())
            }
        };

    let mail = &dotenvy_env.mail;
    let send_timeout = Duration::from_secs(mail.send_timeout_secs);
    let mail_transport: Arc<dyn MailTransport + Send + Sync> = match &mail.relay {
        Some(relay) => Arc::new(HttpMailRelay::new(HttpMailRelayConfig {
            endpoint: relay.url.clone(),
            token: relay.token.clone(),
            from: mail.from.clone(),
            timeout: send_timeout,
        })?),
        None => {
            warn!("MAIL_RELAY_URL is not set; outbound mail is disabled and only logged");
            Arc::new(LoggingMailTransport)
        }
    };
    info!(transport = mail_transport.transport_name(), "Mail transport is ready");

    let dispatcher = Arc::new(ReminderDispatcher::new(
        mail_transport,
        Arc::new(ContestMessageRenderer),
        send_timeout,
    ));

    let scheduling_usecase = Arc::new(ReminderSchedulingUseCase::new(
        Arc::clone(&reminder_repository),
        Arc::clone(&dispatcher),
        dotenvy_env.reminders.default_lead_time,
    ));

    let poller = Arc::new(ReminderPoller::new(
        reminder_repository,
        dispatcher,
        dotenvy_env.reminders.poller_config(),
    ));
    let poller_handle = PollerHandle::start(Arc::clone(&poller))?;
    info!(worker_id = poller.worker_id(), "Reminder poller started");

    let served =
        axum_http::http_serve::start(Arc::clone(&dotenvy_env), scheduling_usecase, poller).await;

    poller_handle.stop().await;
    info!("Reminder poller stopped");

    served
}
