//! Tolerant extraction of JSON objects from model output
//!
//! Local models wrap JSON in commentary or code fences and occasionally emit
//! trailing commas or Python literals. Everything that talks to the model goes
//! through [`parse_model_json`] and gets a typed value back.

use crate::error::{Error, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

/// First balanced `{...}` span in `text`, ignoring braces inside strings
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
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

fn trailing_comma() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*([}\]])").expect("valid regex"))
}

fn python_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":\s*(None|True|False)\b").expect("valid regex"))
}

/// Best-effort repair of near-JSON emitted by small models
pub fn repair_json(span: &str) -> String {
    let fixed = trailing_comma().replace_all(span, "$1");
    python_literal()
        .replace_all(&fixed, |caps: &regex::Captures<'_>| {
            let literal = match &caps[1] {
                "None" => "null",
                "True" => "true",
                _ => "false",
            };
            format!(": {}", literal)
        })
        .into_owned()
}

/// Parse a typed value out of raw model output
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Ok(value);
    }

    let span = extract_json_object(trimmed).ok_or_else(|| {
        Error::Completion(format!(
            "no JSON object in model output: {}",
            preview(trimmed)
        ))
    })?;

    match serde_json::from_str::<T>(span) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str::<T>(&repair_json(span)).map_err(Error::from),
    }
}

fn preview(text: &str) -> String {
    let mut end = text.len().min(120);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Selection {
        thinking: String,
        #[serde(default)]
        node_list: Vec<String>,
    }

    #[test]
    fn test_extracts_object_from_commentary() {
        let raw = "Sure! Here you go:\n```json\n{\"thinking\": \"a {brace} in text\", \"node_list\": [\"0001\"]}\n```\nHope it helps {not json}";
        let span = extract_json_object(raw).unwrap();
        assert!(span.starts_with('{'));
        assert!(span.ends_with("]}"));

        let selection: Selection = parse_model_json(raw).unwrap();
        assert_eq!(selection.thinking, "a {brace} in text");
        assert_eq!(selection.node_list, vec!["0001".to_string()]);
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let raw = r#"{"thinking": "he said \"}\" loudly", "node_list": []}"#;
        assert_eq!(extract_json_object(raw), Some(raw));
    }

    #[test]
    fn test_repairs_trailing_commas_and_python_literals() {
        let raw = "{\"thinking\": \"ok\", \"node_list\": [\"1\", \"2\",], \"flag\": None,}";
        let selection: Selection = parse_model_json(raw).unwrap();
        assert_eq!(selection.node_list.len(), 2);
    }

    #[test]
    fn test_unbalanced_or_missing_json_is_an_error() {
        assert!(extract_json_object("{\"thinking\": \"cut off").is_none());
        assert!(parse_model_json::<Selection>("I cannot answer that.").is_err());
    }
}
