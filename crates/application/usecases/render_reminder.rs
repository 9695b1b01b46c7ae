use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::value_objects::contest_event::ContestEvent;

const TIME_FORMAT: &str = "%a, %d %b %Y %H:%M UTC";

const FALLBACK_NAME: &str = "Upcoming contest";
const FALLBACK_TIME: &str = "TBA";
const FALLBACK_URL: &str = "Not available";
const FALLBACK_PLATFORM: &str = "Unknown platform";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Turns reminder payloads into messages. Implementations must be pure:
/// the same input always renders to the same bytes, and absent payload fields
/// render as placeholders instead of failing.
pub trait MessageRenderer {
    fn render_reminder(&self, payload: &Value) -> RenderedMessage;

    fn render_confirmation(&self, payload: &Value, fire_at: DateTime<Utc>) -> RenderedMessage;

    fn render_test(&self) -> RenderedMessage;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ContestMessageRenderer;

struct EventFields {
    name: String,
    time: String,
    url: Option<String>,
    platform: String,
}

impl EventFields {
    fn from_payload(payload: &Value) -> Self {
        let event = ContestEvent::from_payload(payload);
        Self {
            name: event.name.unwrap_or_else(|| FALLBACK_NAME.to_string()),
            time: event
                .starts_at
                .map(format_time)
                .unwrap_or_else(|| FALLBACK_TIME.to_string()),
            url: event.url,
            platform: event
                .platform
                .unwrap_or_else(|| FALLBACK_PLATFORM.to_string()),
        }
    }

    fn url_text(&self) -> &str {
        self.url.as_deref().unwrap_or(FALLBACK_URL)
    }

    fn url_html(&self) -> String {
        match self.url.as_deref() {
            Some(url) => format!(
                "<a href=\"{}\">{}</a>",
                escape_html(url),
                escape_html(url)
            ),
            None => FALLBACK_URL.to_string(),
        }
    }
}

impl MessageRenderer for ContestMessageRenderer {
    fn render_reminder(&self, payload: &Value) -> RenderedMessage {
        let fields = EventFields::from_payload(payload);

        let subject = format!("Reminder: {} starts at {}", fields.name, fields.time);
        let text = format!(
            "Hi,\n\n\
             {name} on {platform} starts at {time}.\n\n\
             Contest link: {url}\n\n\
             Good luck!\n",
            name = fields.name,
            platform = fields.platform,
            time = fields.time,
            url = fields.url_text(),
        );
        let html = format!(
            "<h2>{name}</h2>\
             <p><strong>{name}</strong> on {platform} starts at <strong>{time}</strong>.</p>\
             <p>Contest link: {url}</p>\
             <p>Good luck!</p>",
            name = escape_html(&fields.name),
            platform = escape_html(&fields.platform),
            time = escape_html(&fields.time),
            url = fields.url_html(),
        );

        RenderedMessage {
            subject,
            text,
            html,
        }
    }

    fn render_confirmation(&self, payload: &Value, fire_at: DateTime<Utc>) -> RenderedMessage {
        let fields = EventFields::from_payload(payload);
        let fire_time = format_time(fire_at);

        let subject = format!("Reminder scheduled: {}", fields.name);
        let text = format!(
            "Your reminder for {name} ({platform}) is set.\n\n\
             We will email you at {fire_time}. The contest starts at {time}.\n\n\
             Contest link: {url}\n",
            name = fields.name,
            platform = fields.platform,
            fire_time = fire_time,
            time = fields.time,
            url = fields.url_text(),
        );
        let html = format!(
            "<p>Your reminder for <strong>{name}</strong> ({platform}) is set.</p>\
             <p>We will email you at <strong>{fire_time}</strong>. The contest starts at {time}.</p>\
             <p>Contest link: {url}</p>",
            name = escape_html(&fields.name),
            platform = escape_html(&fields.platform),
            fire_time = escape_html(&fire_time),
            time = escape_html(&fields.time),
            url = fields.url_html(),
        );

        RenderedMessage {
            subject,
            text,
            html,
        }
    }

    fn render_test(&self) -> RenderedMessage {
        RenderedMessage {
            subject: "Contest reminder test".to_string(),
            text: "This is a test message from the contest reminder service.\n\
                   If you received it, email delivery is working.\n"
                .to_string(),
            html: "<p>This is a test message from the contest reminder service.</p>\
                   <p>If you received it, email delivery is working.</p>"
                .to_string(),
        }
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
