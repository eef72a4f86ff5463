//! Wire types for the chat completions endpoint
//!
//! Only the subset of the common chat-API shape the relay actually reads or
//! writes is modelled here.

use serde::{Deserialize, Serialize};

/// Chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

/// Why a choice ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseChoice {
    pub message: ResponseMessage,
    pub finish_reason: FinishReason,
}

/// Non-streaming response body
///
/// `choices` is either empty or holds exactly one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub choices: Vec<ResponseChoice>,
}

impl ResponseEnvelope {
    pub fn single(content: impl Into<String>, finish_reason: FinishReason) -> Self {
        Self {
            choices: vec![ResponseChoice {
                message: ResponseMessage {
                    content: content.into(),
                },
                finish_reason,
            }],
        }
    }

    pub fn empty() -> Self {
        Self { choices: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChoice {
    pub delta: Delta,
}

/// Payload of one streamed `data:` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub choices: Vec<StreamChoice>,
}

impl StreamChunk {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![StreamChoice {
                delta: Delta {
                    content: content.into(),
                },
            }],
        }
    }
}
