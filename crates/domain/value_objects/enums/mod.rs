pub mod reminder_statuses;
