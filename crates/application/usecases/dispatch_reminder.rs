use chrono::{DateTime, Utc};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    application::usecases::render_reminder::{MessageRenderer, RenderedMessage},
    domain::{
        repositories::mail_transport::MailTransport, value_objects::outbound_mail::OutboundMail,
    },
};

/// Why a single delivery attempt failed. `Display` is the human-readable
/// cause stored on the reminder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("mail transport timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),
}

/// Renders reminders and hands them to the mail transport, one attempt per
/// call. Retrying is the poller's business.
pub struct ReminderDispatcher {
    transport: Arc<dyn MailTransport + Send + Sync>,
    renderer: Arc<dyn MessageRenderer + Send + Sync>,
    send_timeout: Duration,
}

impl ReminderDispatcher {
    pub fn new(
        transport: Arc<dyn MailTransport + Send + Sync>,
        renderer: Arc<dyn MessageRenderer + Send + Sync>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            renderer,
            send_timeout,
        }
    }

    pub async fn dispatch(&self, recipient: &str, payload: &Value) -> Result<(), DispatchError> {
        let message = self.renderer.render_reminder(payload);
        self.deliver(recipient, message).await
    }

    pub async fn send_confirmation(
        &self,
        recipient: &str,
        payload: &Value,
        fire_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let message = self.renderer.render_confirmation(payload, fire_at);
        self.deliver(recipient, message).await
    }

    pub async fn send_test(&self, recipient: &str) -> Result<(), DispatchError> {
        let message = self.renderer.render_test();
        self.deliver(recipient, message).await
    }

    async fn deliver(&self, recipient: &str, message: RenderedMessage) -> Result<(), DispatchError> {
        let mail = OutboundMail {
            to: recipient.to_string(),
            subject: message.subject,
            text: message.text,
            html: message.html,
        };
        let transport = self.transport.transport_name();

        match tokio::time::timeout(self.send_timeout, self.transport.send(mail)).await {
            Ok(Ok(())) => {
                info!(%recipient, transport, "dispatch_reminder: message handed to transport");
                Ok(())
            }
            Ok(Err(err)) => {
                warn!(%recipient, transport, error = %err, "dispatch_reminder: transport failed");
                Err(DispatchError::Transport(format!("{err:#}")))
            }
            Err(_) => {
                warn!(
                    %recipient,
                    transport,
                    timeout = ?self.send_timeout,
                    "dispatch_reminder: transport timed out"
                );
                Err(DispatchError::Timeout(self.send_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        application::usecases::render_reminder::ContestMessageRenderer,
        domain::repositories::mail_transport::MockMailTransport,
    };
    use serde_json::json;
    use std::sync::Mutex;

    fn dispatcher(transport: MockMailTransport) -> ReminderDispatcher {
        ReminderDispatcher::new(
            Arc::new(transport),
            Arc::new(ContestMessageRenderer),
            Duration::from_secs(5),
        )
    }

    fn transport_named(mut transport: MockMailTransport) -> MockMailTransport {
        transport.expect_transport_name().return_const("mock");
        transport
    }

    #[tokio::test]
    async fn hands_rendered_message_to_transport() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let sent_clone = Arc::clone(&sent);

        let mut transport = transport_named(MockMailTransport::new());
        transport.expect_send().times(1).returning(move |mail| {
            sent_clone.lock().unwrap().push(mail);
            Box::pin(async { Ok(()) })
        });

        let payload = json!({ "name": "Round 1", "date": "2026-03-01T12:35:00Z" });
        dispatcher(transport)
            .dispatch("a@x.com", &payload)
            .await
            .unwrap();

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@x.com");
        assert_eq!(
            sent[0].subject,
            ContestMessageRenderer.render_reminder(&payload).subject
        );
    }

    #[tokio::test]
    async fn transport_failure_carries_the_cause() {
        let mut transport = transport_named(MockMailTransport::new());
        transport
            .expect_send()
            .returning(|_| Box::pin(async { Err(anyhow::anyhow!("mail relay rejected message: 550")) }));

        let result = dispatcher(transport).dispatch("a@x.com", &json!({})).await;

        assert_eq!(
            result,
            Err(DispatchError::Transport(
                "mail relay rejected message: 550".to_string()
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn hung_transport_is_cut_off_by_the_attempt_timeout() {
        let mut transport = transport_named(MockMailTransport::new());
        transport.expect_send().returning(|_| {
            Box::pin(async {
                std::future::pending::<()>().await;
                Ok(())
            })
        });

        let result = dispatcher(transport).send_test("a@x.com").await;

        assert_eq!(result, Err(DispatchError::Timeout(Duration::from_secs(5))));
    }
}
