use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::domain::{
    repositories::mail_transport::MailTransport, value_objects::outbound_mail::OutboundMail,
};

/// Stand-in transport for when no relay is configured: logs the message and
/// reports success, so scheduling and polling keep working without delivering.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMailTransport;

#[async_trait]
impl MailTransport for LoggingMailTransport {
    async fn send(&self, mail: OutboundMail) -> Result<()> {
        info!(
            to = %mail.to,
            subject = %mail.subject,
            "mail_transport: disabled, message not sent"
        );
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_transport_reports_success() {
        let mail = OutboundMail {
            to: "a@x.com".to_string(),
            subject: "s".to_string(),
            text: "t".to_string(),
            html: "<p>t</p>".to_string(),
        };

        assert!(LoggingMailTransport.send(mail).await.is_ok());
        assert_eq!(LoggingMailTransport.transport_name(), "disabled");
    }
}
