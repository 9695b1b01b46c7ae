pub mod contest_event;
pub mod enums;
pub mod outbound_mail;
pub mod retry_policy;
