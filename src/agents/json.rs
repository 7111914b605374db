//! Permissive JSON extraction from model output
//!
//! Models asked for JSON still wrap it in prose or code fences often enough
//! that strict parsing is a liability. The extractor takes the first
//! complete JSON object found in the text; strict schema validation happens
//! afterwards on the extracted value.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// First complete JSON object embedded in `text`, if any
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }

    let bytes = trimmed.as_bytes();
    let mut search_from = 0;
    while let Some(offset) = trimmed[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = matching_brace(bytes, start) {
            let candidate = &trimmed[start..=end];
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }
    None
}

/// Index of the brace closing the object opened at `start`, respecting
/// strings and escapes.
fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, &byte) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract and deserialize in one step
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let value = extract_json_object(text)
        .ok_or_else(|| format!("no JSON object found in response: {}", truncate(text, 200)))?;
    serde_json::from_value(value).map_err(|err| format!("response does not match schema: {err}"))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect::<String>() + "…"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        let value = extract_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extract_from_fenced_prose() {
        let text = "Here is the plan:\n```json\n{\"goal\": \"x\", \"steps\": []}\n```\nDone.";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["goal"], "x");
    }

    #[test]
    fn test_extract_with_nested_braces_and_strings() {
        let text = r#"noise {"msg": "a } inside \" string", "inner": {"k": 2}} trailing"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["inner"]["k"], 2);
    }

    #[test]
    fn test_extract_skips_invalid_candidates() {
        let text = "{not json} but then {\"valid\": true}";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["valid"], true);
    }

    #[test]
    fn test_extract_none_when_absent() {
        assert!(extract_json_object("just words").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_parse_json_response_schema_mismatch() {
        #[derive(serde::Deserialize, Debug)]
        struct Expected {
            #[allow(dead_code)]
            success: bool,
        }
        let err = parse_json_response::<Expected>(r#"{"other": 1}"#).unwrap_err();
        assert!(err.contains("schema"));
    }
}
