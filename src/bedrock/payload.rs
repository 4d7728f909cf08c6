//! Request envelope for Anthropic models served by Bedrock.

use serde::Serialize;

use crate::config::RequestSettings;

/// The JSON body sent to `invoke` and `invoke-with-response-stream`.
///
/// Always carries exactly one user message with one text block.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    anthropic_version: String,
    max_tokens: u32,
    messages: [UserMessage; 1],
}

#[derive(Debug, Clone, Serialize)]
struct UserMessage {
    role: Role,
    content: [TextBlock; 1],
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "text")]
struct TextBlock {
    text: String,
}

impl RequestEnvelope {
    /// Wrap a prompt, prefixed by the configured system instruction.
    pub fn build(settings: &RequestSettings, prompt: &str) -> Self {
        Self {
            anthropic_version: settings.anthropic_version.clone(),
            max_tokens: settings.max_tokens,
            messages: [UserMessage {
                role: Role::User,
                content: [TextBlock {
                    text: format!("{}\n\n{}", settings.system_prompt, prompt),
                }],
            }],
        }
    }

    /// The single text block sent to the model.
    pub fn text(&self) -> &str {
        &self.messages[0].content[0].text
    }
}
