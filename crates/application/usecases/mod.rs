pub mod dispatch_reminder;
pub mod reminder_poller;
pub mod render_reminder;
pub mod schedule_reminder;
