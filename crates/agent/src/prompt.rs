//! Rendering of the conversation into a single provider prompt.
//!
//! System messages travel separately as the request's system prompt. For
//! text-mode backends, earlier tool calls are shown in the same JSON shape
//! the model is asked to produce, so the transcript reinforces the
//! convention.

use ferrocode_core::message::{Message, Role, ToolCall};

#[derive(Debug, Clone, Copy)]
pub struct PromptRenderer {
    native_tools: bool,
}

impl PromptRenderer {
    pub fn new(native_tools: bool) -> Self {
        Self { native_tools }
    }

    pub fn render(&self, messages: &[Message]) -> String {
        let mut sections = Vec::with_capacity(messages.len() + 1);
        for message in messages {
            match message.role {
                Role::System => {}
                Role::User => sections.push(format!("User: {}", message.content)),
                Role::Assistant => match &message.tool_call {
                    Some(call) => sections.push(self.render_call(call)),
                    None => sections.push(format!("Assistant: {}", message.content)),
                },
                Role::Tool => {
                    let name = message.name.as_deref().unwrap_or("tool");
                    let id = message.tool_call_id.as_deref().unwrap_or("-");
                    sections.push(format!("Tool result ({name}, {id}):\n{}", message.content));
                }
            }
        }
        if !self.native_tools {
            sections.push("Assistant:".to_string());
        }
        sections.join("\n\n")
    }

    fn render_call(&self, call: &ToolCall) -> String {
        if self.native_tools {
            return format!(
                "Assistant called tool `{}` (id {}) with arguments: {}",
                call.name, call.id, call.arguments
            );
        }
        let arguments = serde_json::from_str::<serde_json::Value>(&call.arguments)
            .unwrap_or_else(|_| serde_json::Value::String(call.arguments.clone()));
        format!(
            r#"Assistant: {{"name": {}, "arguments": {}}}"#,
            serde_json::Value::String(call.name.clone()),
            arguments
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Vec<Message> {
        let call = ToolCall {
            id: "call_1".into(),
            name: "read_file".into(),
            arguments: r#"{"path":"src/main.rs"}"#.into(),
        };
        vec![
            Message::system("You are a coding assistant."),
            Message::user("What does main do?"),
            Message::assistant_call(call),
            Message::tool_result("call_1", "read_file", "fn main() {}"),
        ]
    }

    #[test]
    fn text_mode_renders_calls_as_json() {
        let prompt = PromptRenderer::new(false).render(&transcript());
        assert!(!prompt.contains("coding assistant"));
        assert!(prompt.starts_with("User: What does main do?"));
        assert!(prompt.contains(r#"Assistant: {"name": "read_file", "arguments": {"path":"src/main.rs"}}"#));
        assert!(prompt.contains("Tool result (read_file, call_1):\nfn main() {}"));
        assert!(prompt.ends_with("Assistant:"));
    }

    #[test]
    fn native_mode_describes_calls() {
        let prompt = PromptRenderer::new(true).render(&transcript());
        assert!(prompt.contains("Assistant called tool `read_file` (id call_1)"));
        assert!(!prompt.ends_with("Assistant:"));
    }

    #[test]
    fn plain_turns() {
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        assert_eq!(PromptRenderer::new(true).render(&messages), "User: hi\n\nAssistant: hello");
    }
}
