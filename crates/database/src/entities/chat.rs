//! Chat entity definitions

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub name: Option<String>,
    pub kind: ChatKind,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub name: Option<String>,
    pub kind: ChatKind,
    pub created_by: Option<String>,
}

/// The conversation flavor. An `ai_bot` chat is the only kind that
/// triggers the assistant reply pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Direct,
    Group,
    AiBot,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatKind::Direct => "direct",
            ChatKind::Group => "group",
            ChatKind::AiBot => "ai_bot",
        }
    }
}

impl From<&str> for ChatKind {
    fn from(s: &str) -> Self {
        match s {
            "group" => ChatKind::Group,
            "ai_bot" => ChatKind::AiBot,
            _ => ChatKind::Direct,
        }
    }
}

impl std::fmt::Display for ChatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
