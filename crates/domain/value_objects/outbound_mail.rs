use serde::Serialize;

/// A fully rendered message, ready to hand to a `MailTransport`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}
