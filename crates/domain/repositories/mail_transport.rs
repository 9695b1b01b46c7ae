use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::outbound_mail::OutboundMail;

#[async_trait]
#[automock]
pub trait MailTransport {
    async fn send(&self, mail: OutboundMail) -> Result<()>;

    fn transport_name(&self) -> &'static str;
}
