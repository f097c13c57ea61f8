use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fenced_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").unwrap())
}

/// Extracts the first syntactically complete JSON object from a free-form
/// LLM response. Tries, in order: the response as a whole (or the contents
/// of a fenced code block, if present) parsed directly; a brace-balanced
/// scan over that same text; a brace-balanced scan over the raw response.
/// Tolerates leading/trailing prose and multiple or partially malformed
/// objects by recovering only the first balanced one.
pub fn extract_json_object(response: &str) -> Option<Value> {
    let candidate = fenced_block_pattern()
        .captures(response)
        .and_then(|captures| captures.get(1))
        .map(|block| block.as_str().trim().to_string())
        .unwrap_or_else(|| response.trim().to_string());

    if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
        return Some(value);
    }

    if let Some(balanced) = balanced_object(&candidate) {
        if let Ok(value) = serde_json::from_str::<Value>(&balanced) {
            return Some(value);
        }
    }

    if let Some(balanced) = balanced_object(response) {
        if let Ok(value) = serde_json::from_str::<Value>(&balanced) {
            return Some(value);
        }
    }

    None
}

fn balanced_object(text: &str) -> Option<String> {
    let mut depth = 0i32;
    let mut start = None;

    for (idx, ch) in text.char_indices() {
        match ch {
            '{' => {
                if start.is_none() {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(start_idx) = start {
                        let end_idx = idx + ch.len_utf8();
                        return Some(text[start_idx..end_idx].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json_object() {
        let value = extract_json_object(r#"{"worker": "shell", "action": "run"}"#).unwrap();
        assert_eq!(value["worker"], "shell");
    }

    #[test]
    fn test_fenced_code_block() {
        let response = "Here's my plan:\n```json\n{\"worker\": \"git\", \"action\": \"clone\"}\n```\nLet me know.";
        let value = extract_json_object(response).unwrap();
        assert_eq!(value["action"], "clone");
    }

    #[test]
    fn test_leading_and_trailing_prose() {
        let response = "Sure, here is the instruction: {\"worker\": \"system\"} that's it.";
        let value = extract_json_object(response).unwrap();
        assert_eq!(value["worker"], "system");
    }

    #[test]
    fn test_recovers_first_object_when_multiple_present() {
        let response = r#"{"worker": "shell"} followed by {"worker": "git"}"#;
        let value = extract_json_object(response).unwrap();
        assert_eq!(value["worker"], "shell");
    }

    #[test]
    fn test_no_object_returns_none() {
        assert!(extract_json_object("no json here at all").is_none());
    }

    #[test]
    fn test_unbalanced_braces_return_none() {
        assert!(extract_json_object("{\"worker\": \"shell\"").is_none());
    }
}
