//! Tool-call grammar over free-form model output.
//!
//! The model is asked for a single JSON object per turn, but real
//! completions wrap it in prose, use vendor-specific field names, or
//! emit a bare argument object with a `to=tool.name` routing token.
//! The parser accepts all three shapes and normalizes them into a
//! [`ToolCall`].

use regex::Regex;
use serde_json::{Map, Value, json};
use sidekick_core::ToolCall;

/// Extract the first tool call from a model turn, if any.
///
/// Accepted shapes, tried in order against the first balanced JSON
/// object found in the text:
/// 1. `{"tool": "<name>", "args": {...}}`
/// 2. `{"name": "<name>", "arguments": {...}}`
/// 3. a bare argument object, with the tool name carried by a
///    `to=<dotted.name>` token elsewhere in the turn (a leading
///    `functions.` segment is dropped).
///
/// Malformed JSON is treated as plain prose, never an error.
pub fn parse_tool_call(text: &str) -> Option<ToolCall> {
    let span = first_object_span(text)?;
    let value: Value = serde_json::from_str(span).ok()?;
    let object = value.as_object()?;

    let call = explicit_call(object)
        .or_else(|| vendor_call(object))
        .or_else(|| routed_call(object, text))?;
    Some(normalize_save_file(call))
}

/// Locate the first balanced `{...}` span, honoring JSON string
/// literals and escapes so braces inside strings do not confuse the
/// depth count.
fn first_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn explicit_call(object: &Map<String, Value>) -> Option<ToolCall> {
    let name = object.get("tool")?.as_str()?;
    let args = object.get("args").cloned().unwrap_or_else(|| json!({}));
    Some(ToolCall::new(name, args))
}

fn vendor_call(object: &Map<String, Value>) -> Option<ToolCall> {
    let name = object.get("name")?.as_str()?;
    let args = match object.get("arguments") {
        // Some providers double-encode the argument object.
        Some(Value::String(s)) => serde_json::from_str(s).ok()?,
        Some(other) => other.clone(),
        None => json!({}),
    };
    Some(ToolCall::new(name, args))
}

fn routed_call(object: &Map<String, Value>, text: &str) -> Option<ToolCall> {
    let re = Regex::new(r"to=([A-Za-z0-9_.\-]+)").ok()?;
    let target = re.captures(text)?.get(1)?.as_str();
    let name = target.strip_prefix("functions.").unwrap_or(target);
    if name.is_empty() {
        return None;
    }
    Some(ToolCall::new(name, Value::Object(object.clone())))
}

/// Field-name normalization for `save_file`: models routinely emit
/// `path`/`data` instead of `file_name`/`content`, and array payloads
/// stand for a batch.
fn normalize_save_file(mut call: ToolCall) -> ToolCall {
    if call.name != "save_file" {
        return call;
    }
    if call.args.is_array() {
        call.args = json!({ "files": call.args });
        return call;
    }
    if let Some(object) = call.args.as_object_mut() {
        rename_key(object, "path", "file_name");
        rename_key(object, "data", "content");
    }
    call
}

fn rename_key(object: &mut Map<String, Value>, from: &str, to: &str) {
    if !object.contains_key(to) {
        if let Some(value) = object.remove(from) {
            object.insert(to.to_string(), value);
        }
    }
}
