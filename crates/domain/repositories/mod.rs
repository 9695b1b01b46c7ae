pub mod mail_transport;
pub mod reminders;
