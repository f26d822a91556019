//! Typed Slack Block Kit elements.
//!
//! Only the block and element kinds that deployment messages use are modelled.
//! Anything else Slack echoes back deserializes to an `Unsupported` variant so
//! that a foreign block never makes a whole callback unreadable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The tagged value carried by a promotion affordance button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl Verdict {
    /// The button `value` Slack sends back when the affordance is clicked.
    pub fn as_value(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_value(value: &str) -> Option<Self> {
        match value {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Approved => Self::Rejected,
            Self::Rejected => Self::Approved,
        }
    }

    /// Verb used in vote tallies ("thinks we should *approve* ...").
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Approved => "approve",
            Self::Rejected => "reject",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "Approved"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// A text composition object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Text {
    PlainText {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        emoji: Option<bool>,
    },
    Mrkdwn {
        text: String,
    },
}

impl Text {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText {
            text: text.into(),
            emoji: Some(true),
        }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PlainText { text, .. } | Self::Mrkdwn { text } => text,
        }
    }
}

/// Interactive element attached to a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Accessory {
    Button {
        text: Text,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

impl Accessory {
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Button { value, .. } => value.as_deref(),
            Self::Unsupported => None,
        }
    }
}

/// Element of a context block: either a small avatar or a line of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextElement {
    Image {
        image_url: String,
        alt_text: String,
    },
    PlainText {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        emoji: Option<bool>,
    },
    Mrkdwn {
        text: String,
    },
    #[serde(other)]
    Unsupported,
}

impl ContextElement {
    pub fn image(image_url: impl Into<String>, alt_text: impl Into<String>) -> Self {
        Self::Image {
            image_url: image_url.into(),
            alt_text: alt_text.into(),
        }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText {
            text: text.into(),
            emoji: Some(true),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::PlainText { text, .. } | Self::Mrkdwn { text } => Some(text),
            Self::Image { .. } | Self::Unsupported => None,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            Self::Image { image_url, .. } => Some(image_url),
            _ => None,
        }
    }
}

/// A top-level layout block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: Text,
    },
    Section {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<Text>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fields: Vec<Text>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accessory: Option<Accessory>,
    },
    Divider,
    Context {
        elements: Vec<ContextElement>,
    },
    #[serde(other)]
    Unsupported,
}

impl Block {
    pub fn header(text: impl Into<String>) -> Self {
        Self::Header {
            text: Text::plain(text),
        }
    }

    pub fn fields(fields: Vec<Text>) -> Self {
        Self::Section {
            block_id: None,
            text: None,
            fields,
            accessory: None,
        }
    }

    pub fn context(elements: Vec<ContextElement>) -> Self {
        Self::Context { elements }
    }

    /// A context block holding a single line of text.
    pub fn note(text: impl Into<String>) -> Self {
        Self::Context {
            elements: vec![ContextElement::mrkdwn(text)],
        }
    }

    pub fn is_context(&self) -> bool {
        matches!(self, Self::Context { .. })
    }

    pub fn is_divider(&self) -> bool {
        matches!(self, Self::Divider)
    }

    /// The verdict tagged on this block's button, if it is a promotion affordance.
    pub fn affordance(&self) -> Option<Verdict> {
        match self {
            Self::Section {
                accessory: Some(accessory),
                ..
            } => accessory.value().and_then(Verdict::from_value),
            _ => None,
        }
    }

    pub fn block_id(&self) -> Option<&str> {
        match self {
            Self::Section { block_id, .. } => block_id.as_deref(),
            _ => None,
        }
    }

    /// All human-readable text carried by the block, in display order.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            Self::Header { text } => vec![text.as_str()],
            Self::Section { text, fields, .. } => text
                .iter()
                .chain(fields.iter())
                .map(Text::as_str)
                .collect(),
            Self::Context { elements } => elements.iter().filter_map(|e| e.text()).collect(),
            Self::Divider | Self::Unsupported => Vec::new(),
        }
    }
}
