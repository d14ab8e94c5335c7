//! Rules-engine messages shown around checkout: classification, priority
//! ordering, and the small markdown subset their bodies use.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Message payload as the rules engine emits it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRulesMessage {
    #[serde(default, alias = "message_id", alias = "template_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub requires_acknowledgment: Option<bool>,
    pub content: RawContent,
}

/// The three content shapes observed from the rules engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawContent {
    Text(String),
    Titled {
        #[serde(default)]
        title: Option<String>,
        message: String,
    },
    Envelope {
        content: Box<RawContent>,
    },
}

impl RawContent {
    fn into_parts(self) -> (Option<String>, String) {
        match self {
            RawContent::Text(body) => (None, body),
            RawContent::Titled { title, message } => (title, message),
            RawContent::Envelope { content } => content.into_parts(),
        }
    }
}

/// Variants are declared in display priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Error,
    Acknowledgment,
    Warning,
    Info,
}

impl MessageKind {
    pub fn classify(message_type: Option<&str>) -> Self {
        let Some(raw) = message_type else {
            return MessageKind::Info;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" | "blocking" | "blocked" => MessageKind::Error,
            "terms_and_conditions" | "consent" | "acknowledge" | "acknowledgment"
            | "acknowledgement" => MessageKind::Acknowledgment,
            "warning" | "alert" => MessageKind::Warning,
            _ => MessageKind::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesMessage {
    pub id: String,
    pub kind: MessageKind,
    pub title: Option<String>,
    pub body: String,
    pub requires_acknowledgment: bool,
}

impl RulesMessage {
    /// `index` names messages that arrive without an id.
    pub fn from_raw(raw: RawRulesMessage, index: usize) -> Self {
        let kind = MessageKind::classify(raw.message_type.as_deref());
        let (title, body) = raw.content.into_parts();
        Self {
            id: raw.id.unwrap_or_else(|| format!("message-{index}")),
            kind,
            title,
            body,
            requires_acknowledgment: raw
                .requires_acknowledgment
                .unwrap_or(kind == MessageKind::Acknowledgment),
        }
    }

    pub fn segments(&self) -> Vec<Segment> {
        format_markdown_lite(&self.body)
    }
}

pub fn normalize_messages(raw: Vec<RawRulesMessage>) -> Vec<RulesMessage> {
    raw.into_iter()
        .enumerate()
        .map(|(index, message)| RulesMessage::from_raw(message, index))
        .collect()
}

/// Stable: messages of equal kind keep their arrival order.
pub fn sort_by_priority(messages: &mut [RulesMessage]) {
    messages.sort_by_key(|message| message.kind);
}

pub fn checkout_blocked(messages: &[RulesMessage], acknowledged: &HashSet<String>) -> bool {
    messages.iter().any(|message| {
        message.kind == MessageKind::Error
            || (message.requires_acknowledgment && !acknowledged.contains(&message.id))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Segment {
    Text(String),
    Bold(String),
    Italic(String),
    Link { label: String, url: String },
    LineBreak,
}

/// Splits `text` into styled segments. Supports `**bold**`, `*italic*`,
/// `[label](url)` and line breaks; unmatched markers stay literal.
pub fn format_markdown_lite(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut buffer = String::new();
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix("**") {
            if let Some(end) = after.find("**").filter(|end| *end > 0) {
                flush_text(&mut buffer, &mut segments);
                segments.push(Segment::Bold(after[..end].to_string()));
                rest = &after[end + 2..];
                continue;
            }
        } else if let Some(after) = rest.strip_prefix('*') {
            if let Some(end) = after.find('*').filter(|end| *end > 0) {
                flush_text(&mut buffer, &mut segments);
                segments.push(Segment::Italic(after[..end].to_string()));
                rest = &after[end + 1..];
                continue;
            }
        } else if let Some(after) = rest.strip_prefix('[') {
            if let Some((label, url, consumed)) = parse_link(after) {
                flush_text(&mut buffer, &mut segments);
                segments.push(Segment::Link {
                    label: label.to_string(),
                    url: url.to_string(),
                });
                rest = &after[consumed..];
                continue;
            }
        } else if let Some(after) = rest
            .strip_prefix("\r\n")
            .or_else(|| rest.strip_prefix('\n'))
        {
            flush_text(&mut buffer, &mut segments);
            segments.push(Segment::LineBreak);
            rest = after;
            continue;
        }

        buffer.push(ch);
        rest = &rest[ch.len_utf8()..];
    }

    flush_text(&mut buffer, &mut segments);
    segments
}

fn flush_text(buffer: &mut String, segments: &mut Vec<Segment>) {
    if !buffer.is_empty() {
        segments.push(Segment::Text(std::mem::take(buffer)));
    }
}

/// `input` starts just after the opening `[`. Returns label, url and bytes consumed.
fn parse_link(input: &str) -> Option<(&str, &str, usize)> {
    let label_end = input.find("](")?;
    let label = &input[..label_end];
    if label.is_empty() || label.contains(['[', '\n']) {
        return None;
    }
    let url_start = label_end + 2;
    let url_len = input[url_start..].find(')')?;
    let url = &input[url_start..url_start + url_len];
    if url.is_empty() || url.contains(char::is_whitespace) {
        return None;
    }
    Some((label, url, url_start + url_len + 1))
}
