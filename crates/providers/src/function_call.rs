//! Text-mode function calling.
//!
//! Backends without a structured tool-call field are told, through the
//! system prompt, to answer with a bare JSON object
//! `{"name": "...", "arguments": {...}}` when they want a tool. Their
//! reply is then scanned for such an object.
//!
//! The grammar is strict on purpose: a call is only recognised when a
//! top-level object parses completely and carries both keys. The first
//! object-shaped candidate that fails to parse (truncated or malformed)
//! ends the scan and the whole reply is treated as the final answer, so a
//! half-parsed call can never reach a tool.

use ferrocode_core::message::ToolCall;
use ferrocode_core::provider::{FunctionCallResponse, ToolDefinition};
use serde_json::Value;
use tracing::trace;

/// Render the tool catalogue and calling convention for the system prompt.
pub fn tool_instructions(tools: &[ToolDefinition]) -> String {
    let mut out = String::from(
        "You can use tools to inspect and change the project.\n\
         To call a tool, reply with ONLY a JSON object of this form and nothing else:\n\
         {\"name\": \"<tool name>\", \"arguments\": {<arguments matching the tool's parameters>}}\n\
         Call at most one tool per reply. You will receive the tool's output in the next message.\n\
         When you have the final answer, reply in plain text without any tool call.\n\n\
         Available tools:\n",
    );
    for tool in tools {
        out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        out.push_str(&format!("  parameters: {}\n", tool.parameters));
    }
    out
}

/// Append the tool catalogue to a system prompt.
pub fn system_prompt_with_tools(system_prompt: &str, tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return system_prompt.to_string();
    }
    let instructions = tool_instructions(tools);
    if system_prompt.trim().is_empty() {
        instructions
    } else {
        format!("{}\n\n{}", system_prompt.trim_end(), instructions)
    }
}

/// Classify a text reply as either a function call or a final answer.
pub fn parse_response(text: &str) -> FunctionCallResponse {
    match parse_function_call(text) {
        Some(call) => FunctionCallResponse::FunctionCall(call),
        None => FunctionCallResponse::Text(text.trim().to_string()),
    }
}

/// Find an embedded `{"name": .., "arguments": ..}` object in `text`.
pub fn parse_function_call(text: &str) -> Option<ToolCall> {
    let mut offset = 0;
    while let Some(start) = next_candidate(text, offset) {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                if let Some(call) = call_from_value(&value) {
                    trace!(tool = %call.name, "Function call found in text reply");
                    return Some(call);
                }
                // Skip the whole object, nested objects included.
                offset = start + values.byte_offset().max(1);
            }
            Some(Err(e)) => {
                trace!(error = %e, at = start, "Malformed JSON candidate, treating reply as text");
                return None;
            }
            None => return None,
        }
    }
    None
}

/// Every top-level JSON object in `text`, in order. Malformed candidates
/// are skipped rather than ending the scan.
pub fn json_objects(text: &str) -> Vec<Value> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(start) = next_candidate(text, offset) {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                offset = start + values.byte_offset().max(1);
                found.push(value);
            }
            _ => offset = start + 1,
        }
    }
    found
}

/// Byte index of the next `{` at or after `from` that is followed by
/// optional whitespace and a `"`.
fn next_candidate(text: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while search < text.len() {
        let rel = text[search..].find('{')?;
        let start = search + rel;
        let after = text[start + 1..].trim_start();
        if after.starts_with('"') {
            return Some(start);
        }
        search = start + 1;
    }
    None
}

fn call_from_value(value: &Value) -> Option<ToolCall> {
    let object = value.as_object()?;
    let name = object.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let arguments = match object.get("arguments")? {
        Value::Object(_) => object.get("arguments")?.to_string(),
        Value::String(raw) => {
            let parsed: Value = serde_json::from_str(raw).ok()?;
            if !parsed.is_object() {
                return None;
            }
            raw.trim().to_string()
        }
        _ => return None,
    };
    Some(ToolCall::new(name, arguments))
}
