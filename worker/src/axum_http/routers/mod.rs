pub mod poller;
pub mod reminders;
