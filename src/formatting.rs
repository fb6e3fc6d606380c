// src/formatting.rs

use crate::config::MessageFormat;
use crate::core::{Embed, EmbedField, Payload};
use chrono::{DateTime, SecondsFormat};

const BANNER: &str = "🚨 Alert 🚨";
const EMBED_COLOR: u32 = 0xE7_4C_3C;

/// The producer-supplied fields an alert message is built from.
#[derive(Debug, Clone, Copy)]
pub struct AlertDetails<'a> {
    pub avatar: &'a str,
    pub uuid: &'a str,
    pub reason: &'a str,
    pub time: &'a str,
}

/// Renders alert details into a sink payload.
pub trait AlertFormatter: Send + Sync {
    fn format(&self, alert: &AlertDetails<'_>) -> Payload;
}

/// Returns the formatter for the configured message shape.
pub fn formatter_for(format: MessageFormat) -> Box<dyn AlertFormatter> {
    match format {
        MessageFormat::Text => Box::new(CodeBlockFormatter),
        MessageFormat::Embed => Box::new(EmbedFormatter),
    }
}

/// Plain text wrapped in a code block, framed by a banner line.
pub struct CodeBlockFormatter;

impl AlertFormatter for CodeBlockFormatter {
    fn format(&self, alert: &AlertDetails<'_>) -> Payload {
        Payload::Text(format!(
            "```{banner}\n\nAvatar: {} ({})\n\nReason:\n{}\n\nTime: {}\n{banner}```",
            alert.avatar,
            alert.uuid,
            alert.reason,
            alert.time,
            banner = BANNER,
        ))
    }
}

/// A structured embed with one field per detail.
pub struct EmbedFormatter;

impl AlertFormatter for EmbedFormatter {
    fn format(&self, alert: &AlertDetails<'_>) -> Payload {
        let field = |name: &str, value: String, inline: bool| EmbedField {
            name: name.to_string(),
            value,
            inline,
        };
        Payload::Embed(Embed {
            title: Some(BANNER.to_string()),
            description: None,
            fields: vec![
                field("Avatar", format!("{} ({})", alert.avatar, alert.uuid), true),
                field("Time", alert.time.to_string(), true),
                field("Reason", alert.reason.to_string(), false),
            ],
            // The sink only accepts ISO 8601; free-form times stay in the field.
            timestamp: DateTime::parse_from_rfc3339(alert.time)
                .ok()
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            color: Some(EMBED_COLOR),
        })
    }
}
