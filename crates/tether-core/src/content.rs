//! Content block types.
//!
//! Conversation messages pushed by the backend carry structured content
//! blocks. The block vocabulary is open-ended on the server side, so the
//! decoder maps unrecognized (or structurally incomplete) blocks to an
//! explicit [`ContentBlock::Unknown`] variant instead of failing the whole
//! frame or silently skipping — downstream rendering shows `[kind]` for
//! them.

use serde::de::{Deserializer, Error as _};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One block inside a conversation message.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text content.
        value: String,
    },
    /// A tool the assistant invoked.
    ToolInvocation {
        /// Tool name.
        name: String,
        /// Tool arguments.
        parameters: serde_json::Map<String, Value>,
    },
    /// The outcome of a tool invocation.
    ToolOutcome {
        /// Raw result payload.
        payload: String,
        /// Whether the tool failed.
        is_error: bool,
    },
    /// Assistant reasoning text.
    Reasoning {
        /// The reasoning content.
        value: String,
    },
    /// A block the client does not understand.
    Unknown {
        /// The wire `type` tag (or `"unknown"` when absent).
        kind: String,
    },
}

impl ContentBlock {
    /// Create a text block.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    /// Create a reasoning block.
    #[must_use]
    pub fn reasoning(value: impl Into<String>) -> Self {
        Self::Reasoning {
            value: value.into(),
        }
    }

    /// Returns `true` if this is a text block.
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// Returns `true` if this is a tool outcome block.
    #[must_use]
    pub fn is_tool_outcome(&self) -> bool {
        matches!(self, Self::ToolOutcome { .. })
    }

    /// Returns the text if this is a text block, `None` otherwise.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { value } => Some(value),
            _ => None,
        }
    }

    /// Convert a decoded JSON value into a block.
    ///
    /// Known tags with their required fields intact map to their variant;
    /// anything else (unrecognized tag, missing tag, missing required
    /// field, non-object) becomes [`ContentBlock::Unknown`].
    #[must_use]
    fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::Unknown {
                kind: "unknown".to_owned(),
            };
        };
        let kind = obj.get("type").and_then(Value::as_str).unwrap_or("unknown");
        match kind {
            "text" => match obj.get("text").and_then(Value::as_str) {
                Some(text) => Self::Text {
                    value: text.to_owned(),
                },
                None => Self::Unknown {
                    kind: "text".to_owned(),
                },
            },
            "tool_use" => match obj.get("name").and_then(Value::as_str) {
                Some(name) => Self::ToolInvocation {
                    name: name.to_owned(),
                    parameters: obj
                        .get("parameters")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default(),
                },
                None => Self::Unknown {
                    kind: "tool_use".to_owned(),
                },
            },
            "tool_result" => Self::ToolOutcome {
                payload: obj
                    .get("payload")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                is_error: obj
                    .get("isError")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            "thinking" => match obj.get("thinking").and_then(Value::as_str) {
                Some(thinking) => Self::Reasoning {
                    value: thinking.to_owned(),
                },
                None => Self::Unknown {
                    kind: "thinking".to_owned(),
                },
            },
            other => Self::Unknown {
                kind: other.to_owned(),
            },
        }
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_object() {
            Ok(Self::from_value(&value))
        } else {
            Err(D::Error::custom("content block must be a JSON object"))
        }
    }
}

impl Serialize for ContentBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Text { value } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "text")?;
                map.serialize_entry("text", value)?;
                map.end()
            }
            Self::ToolInvocation { name, parameters } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "tool_use")?;
                map.serialize_entry("name", name)?;
                map.serialize_entry("parameters", parameters)?;
                map.end()
            }
            Self::ToolOutcome { payload, is_error } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("type", "tool_result")?;
                map.serialize_entry("payload", payload)?;
                map.serialize_entry("isError", is_error)?;
                map.end()
            }
            Self::Reasoning { value } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", "thinking")?;
                map.serialize_entry("thinking", value)?;
                map.end()
            }
            Self::Unknown { kind } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("type", kind)?;
                map.end()
            }
        }
    }
}

/// The nested body of a conversation message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    /// Content blocks in display order.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// One message as pushed inside `session_updated` / `session_history`
/// frames.
///
/// `system` and `summary` messages carry their text in the top-level `text`
/// field rather than in nested content blocks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationMessage {
    /// Message kind (`user`, `assistant`, `summary`, `system`,
    /// `queue-operation`); absent on malformed pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Nested message body with content blocks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageBody>,
    /// Top-level text for `system` / `summary` messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ConversationMessage {
    /// Build a message of the given kind from content blocks.
    #[must_use]
    pub fn with_blocks(kind: impl Into<String>, content: Vec<ContentBlock>) -> Self {
        Self {
            kind: Some(kind.into()),
            message: Some(MessageBody { content }),
            text: None,
        }
    }

    /// Build a message of the given kind carrying top-level text.
    #[must_use]
    pub fn with_text(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            message: None,
            text: Some(text.into()),
        }
    }

    /// The content blocks, or an empty slice when the body is absent.
    #[must_use]
    pub fn blocks(&self) -> &[ContentBlock] {
        self.message.as_ref().map_or(&[], |m| m.content.as_slice())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
