//! Content classification and display rendering.
//!
//! Backend messages arrive as structured block lists; the store persists a
//! single human-readable string per message. This module owns both the
//! classification rules (which decide whether a message is persisted at
//! all) and the per-block rendering.

use tether_core::content::{ContentBlock, ConversationMessage};

/// Placeholder shown for messages with nothing renderable.
pub const NO_TEXT: &str = "no text";

/// Reasoning blocks are previewed, not shown in full.
const REASONING_PREVIEW_MAX: usize = 80;

/// Tool parameters surfaced next to the tool name, in priority order.
const DISPLAY_PARAMETERS: [&str; 3] = ["pattern", "command", "file_path"];

/// Classification of a conversation message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageClass {
    /// A user prompt (any `user` message carrying text).
    User,
    /// An assistant response.
    Assistant,
    /// A `user` message consisting entirely of tool outcomes.
    ToolResult,
    /// A conversation summary (not persisted).
    Summary,
    /// A system notice (not persisted).
    System,
    /// A queue bookkeeping message (not persisted).
    QueueOperation,
}

impl MessageClass {
    /// Whether messages of this class are kept when applying a batch.
    #[must_use]
    pub fn is_persisted(self) -> bool {
        matches!(self, Self::User | Self::Assistant | Self::ToolResult)
    }
}

/// Classify a message by its `kind` and content shape.
///
/// A `user` message whose blocks are all tool outcomes is a tool result;
/// one containing any text block is a user message even when mixed with
/// tool outcomes. A missing or unrecognized kind yields `None`.
#[must_use]
pub fn classify(message: &ConversationMessage) -> Option<MessageClass> {
    match message.kind.as_deref()? {
        "user" => {
            let blocks = message.blocks();
            let has_text = blocks.iter().any(ContentBlock::is_text);
            let all_outcomes =
                !blocks.is_empty() && blocks.iter().all(ContentBlock::is_tool_outcome);
            if !has_text && all_outcomes {
                Some(MessageClass::ToolResult)
            } else {
                Some(MessageClass::User)
            }
        }
        "assistant" => Some(MessageClass::Assistant),
        "summary" => Some(MessageClass::Summary),
        "system" => Some(MessageClass::System),
        "queue-operation" => Some(MessageClass::QueueOperation),
        _ => None,
    }
}

/// Render a message into its display text.
///
/// `system` and `summary` messages read their text from the top-level
/// field. Everything else concatenates its rendered blocks, separated by a
/// blank line. An empty content list or a missing body renders [`NO_TEXT`].
#[must_use]
pub fn render(message: &ConversationMessage) -> String {
    if matches!(message.kind.as_deref(), Some("system" | "summary")) {
        return message
            .text
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_TEXT.to_owned());
    }

    let blocks = message.blocks();
    if blocks.is_empty() {
        return NO_TEXT.to_owned();
    }
    blocks
        .iter()
        .map(render_block)
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_block(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text { value } => value.clone(),
        ContentBlock::ToolInvocation { name, parameters } => {
            let detail = DISPLAY_PARAMETERS
                .iter()
                .find_map(|key| parameters.get(*key).and_then(serde_json::Value::as_str));
            match detail {
                Some(detail) => format!("🔧 {name}: {detail}"),
                None => format!("🔧 {name}"),
            }
        }
        ContentBlock::ToolOutcome { payload, is_error } => {
            if *is_error {
                format!("✗ Error: {payload}")
            } else {
                format!("✓ Result ({})", format_size(payload.len()))
            }
        }
        ContentBlock::Reasoning { value } => {
            if value.chars().count() > REASONING_PREVIEW_MAX {
                let preview: String = value.chars().take(REASONING_PREVIEW_MAX).collect();
                format!("💭 {preview}…")
            } else {
                format!("💭 {value}")
            }
        }
        ContentBlock::Unknown { kind } => format!("[{kind}]"),
    }
}

/// Render a byte count as bytes or KB by magnitude.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
