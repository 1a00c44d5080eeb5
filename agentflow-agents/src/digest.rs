//! Smart summarization of upstream results before prompt inclusion.

use serde_json::Value;

/// Serialized values longer than this are replaced by a digest.
const DIGEST_THRESHOLD: usize = 1000;
/// Prefix length taken from the dominant textual field.
const TEXT_PREFIX_LEN: usize = 200;
/// How many file paths a digest lists.
const MAX_DIGEST_PATHS: usize = 5;

/// Render a context value for prompt inclusion.
///
/// Values whose serialized form stays under the threshold pass through
/// verbatim. Larger objects are reduced to their status, a file count with
/// the first few paths, and a prefix of the dominant textual field; larger
/// arrays of objects are reduced to a count plus the first element's keys.
pub fn digest_value(value: &Value) -> String {
    let serialized = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if serialized.chars().count() <= DIGEST_THRESHOLD {
        return serialized;
    }

    match value {
        Value::Object(map) => {
            let mut parts: Vec<String> = Vec::new();

            if let Some(status) = map.get("status").and_then(Value::as_str) {
                parts.push(format!("status: {status}"));
            }

            if let Some(Value::Array(files)) = map.get("files_created") {
                let shown: Vec<&str> = files
                    .iter()
                    .filter_map(Value::as_str)
                    .take(MAX_DIGEST_PATHS)
                    .collect();
                parts.push(format!(
                    "{} file(s) created: {}{}",
                    files.len(),
                    shown.join(", "),
                    if files.len() > shown.len() { ", ..." } else { "" }
                ));
            }

            if let Some((key, text)) = dominant_text_field(map) {
                parts.push(format!("{}: {}...", key, prefix(text, TEXT_PREFIX_LEN)));
            }

            if parts.is_empty() {
                format!("{{object with {} keys}}", map.len())
            } else {
                parts.join("; ")
            }
        }
        Value::Array(items) => {
            let keys = items.first().and_then(Value::as_object).map(|o| {
                o.keys().cloned().collect::<Vec<_>>().join(", ")
            });
            match keys {
                Some(keys) => format!("[{} items; first item keys: {}]", items.len(), keys),
                None => format!("[{} items]", items.len()),
            }
        }
        _ => format!("{}...", prefix(&serialized, TEXT_PREFIX_LEN)),
    }
}

/// The longest string-valued field of an object.
fn dominant_text_field(map: &serde_json::Map<String, Value>) -> Option<(&str, &str)> {
    map.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
        .max_by_key(|(_, s)| s.chars().count())
}

fn prefix(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_small_values_pass_through() {
        assert_eq!(digest_value(&json!("short text")), "short text");
        assert_eq!(digest_value(&json!({"a": 1})), "{\"a\":1}");
    }

    #[test]
    fn test_large_object_digested_to_status_and_files() {
        let value = json!({
            "status": "completed",
            "files_created": ["a.py", "b.py", "c.py", "d.py", "e.py", "f.py", "g.py"],
            "summary": "x".repeat(2000),
        });
        let digest = digest_value(&value);
        assert!(digest.chars().count() < 600);
        assert!(digest.contains("status: completed"));
        assert!(digest.contains("7 file(s) created"));
        assert!(digest.contains("a.py"));
        assert!(digest.contains("e.py"));
        assert!(!digest.contains("f.py"));
        assert!(digest.contains(", ..."));
        // Dominant textual field contributes only a prefix.
        assert!(digest.contains(&format!("summary: {}...", "x".repeat(200))));
    }

    #[test]
    fn test_large_array_of_objects_summarized() {
        let items: Vec<Value> = (0..100)
            .map(|i| json!({"name": format!("item_{i}"), "detail": "y".repeat(20)}))
            .collect();
        let digest = digest_value(&Value::Array(items));
        assert_eq!(digest, "[100 items; first item keys: detail, name]");
    }

    #[test]
    fn test_large_plain_string_gets_prefix() {
        let digest = digest_value(&json!("z".repeat(5000)));
        assert!(digest.ends_with("..."));
        assert!(digest.chars().count() <= TEXT_PREFIX_LEN + 3);
    }
}
