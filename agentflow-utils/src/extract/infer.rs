//! Filename inference for fenced blocks that carry no path.

use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

static CLASS_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\bclass\s+(\w+)").expect("valid regex"));
static DEF_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\bdef\s+(\w+)").expect("valid regex"));
static FN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\bfn\s+(\w+)").expect("valid regex"));
static STRUCT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\bstruct\s+(\w+)").expect("valid regex"));

/// File extension (or full filename for Dockerfiles) for a fence language tag.
pub fn extension_for_language(language: &str) -> &'static str {
    match language.to_ascii_lowercase().as_str() {
        "python" | "py" => ".py",
        "javascript" | "js" => ".js",
        "typescript" | "ts" => ".ts",
        "tsx" => ".tsx",
        "jsx" => ".jsx",
        "java" => ".java",
        "cpp" | "c++" => ".cpp",
        "c" => ".c",
        "go" => ".go",
        "rust" => ".rs",
        "ruby" => ".rb",
        "php" => ".php",
        "html" => ".html",
        "css" => ".css",
        "scss" => ".scss",
        "sql" => ".sql",
        "yaml" => ".yaml",
        "yml" => ".yml",
        "json" => ".json",
        "xml" => ".xml",
        "toml" => ".toml",
        "markdown" | "md" => ".md",
        "bash" | "shell" | "sh" => ".sh",
        "dockerfile" | "docker" => "Dockerfile",
        _ => ".txt",
    }
}

/// Convert CamelCase to snake_case.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if i > 0 && (prev_lower || next_lower) && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Synthesize a filename for an anonymous code block.
///
/// Prefers the first declared class, then the first function, then a
/// timestamped default.
pub fn infer_filename(content: &str, language: Option<&str>) -> String {
    let ext = extension_for_language(language.unwrap_or(""));

    if let Some(caps) = CLASS_NAME.captures(content).or_else(|| STRUCT_NAME.captures(content)) {
        return format!("{}{}", to_snake_case(&caps[1]), ext);
    }
    if let Some(caps) = DEF_NAME.captures(content).or_else(|| FN_NAME.captures(content)) {
        return format!("{}{}", &caps[1], ext);
    }

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    format!("code_{timestamp}{ext}")
}
