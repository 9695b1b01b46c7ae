pub mod reminders;
pub mod reminders_in_memory;
