//! Line classifier for the file extractor: file markers, fences, or text.

use regex::Regex;
use std::sync::LazyLock;

static BOLD_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\*\*File:\s*`([^`]+)`\s*\*\*\s*$").expect("valid regex")
});
static BACKTICK_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*File:\s*`([^`]+)`\s*$").expect("valid regex"));
static PLAIN_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*File:\s*(\S+)\s*$").expect("valid regex"));
static FENCE_WITH_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_+]+(?:-[A-Za-z0-9_+]+)*)\s*:\s*(.+?)\s*$").expect("valid regex")
});

/// Which of the marker syntaxes introduced a file path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    /// `**File: \`path\`**`
    Bold,
    /// `File: \`path\``
    Backtick,
    /// `File: path`
    Plain,
}

/// Classification of one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// A `File:` marker naming a path.
    FileMarker { path: String, style: MarkerStyle },
    /// A triple-backtick fence line.
    ///
    /// `lang` and `path` come from the fence info string:
    /// ` ```python ` carries a language, ` ```python:app.py ` carries both,
    /// a bare ` ``` ` carries neither. A fence with any info opens (or
    /// nests); a bare fence closes.
    Fence {
        lang: Option<String>,
        path: Option<String>,
    },
    /// Anything else.
    Text,
}

impl LineKind {
    /// True for a fence line with no info token (a closing fence).
    pub fn is_bare_fence(&self) -> bool {
        matches!(
            self,
            LineKind::Fence {
                lang: None,
                path: None
            }
        )
    }

    /// True for a fence line carrying an info token (opens or nests).
    pub fn is_opening_fence(&self) -> bool {
        matches!(self, LineKind::Fence { lang, path } if lang.is_some() || path.is_some())
    }
}

/// Classify a single line.
pub fn classify(line: &str) -> LineKind {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let info = rest.trim();
        if info.is_empty() {
            return LineKind::Fence {
                lang: None,
                path: None,
            };
        }
        if let Some(caps) = FENCE_WITH_PATH.captures(info) {
            return LineKind::Fence {
                lang: Some(caps[1].to_string()),
                path: Some(caps[2].to_string()),
            };
        }
        // Anything else after the backticks counts as an info token; take
        // the first word as the language tag.
        let lang = info.split_whitespace().next().unwrap_or(info);
        return LineKind::Fence {
            lang: Some(lang.to_string()),
            path: None,
        };
    }

    if let Some(caps) = BOLD_MARKER.captures(line) {
        return LineKind::FileMarker {
            path: caps[1].to_string(),
            style: MarkerStyle::Bold,
        };
    }
    if let Some(caps) = BACKTICK_MARKER.captures(line) {
        return LineKind::FileMarker {
            path: caps[1].to_string(),
            style: MarkerStyle::Backtick,
        };
    }
    if let Some(caps) = PLAIN_MARKER.captures(line) {
        return LineKind::FileMarker {
            path: caps[1].to_string(),
            style: MarkerStyle::Plain,
        };
    }

    LineKind::Text
}

/// Classify every line of `text`, returning the lines and their kinds.
pub fn tokenize(text: &str) -> (Vec<&str>, Vec<LineKind>) {
    let lines: Vec<&str> = text.lines().collect();
    let kinds = lines.iter().map(|l| classify(l)).collect();
    (lines, kinds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_fence() {
        assert!(classify("```").is_bare_fence());
        assert!(classify("   ```  ").is_bare_fence());
    }

    #[test]
    fn test_fence_with_language() {
        match classify("```python") {
            LineKind::Fence { lang, path } => {
                assert_eq!(lang.as_deref(), Some("python"));
                assert!(path.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fence_with_language_and_path() {
        match classify("```python:src/app.py") {
            LineKind::Fence { lang, path } => {
                assert_eq!(lang.as_deref(), Some("python"));
                assert_eq!(path.as_deref(), Some("src/app.py"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fence_with_hyphenated_language() {
        match classify("```objective-c:main.m") {
            LineKind::Fence { lang, path } => {
                assert_eq!(lang.as_deref(), Some("objective-c"));
                assert_eq!(path.as_deref(), Some("main.m"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_marker_styles() {
        assert_eq!(
            classify("**File: `app.py`**"),
            LineKind::FileMarker {
                path: "app.py".to_string(),
                style: MarkerStyle::Bold,
            }
        );
        assert_eq!(
            classify("File: `requirements.txt`"),
            LineKind::FileMarker {
                path: "requirements.txt".to_string(),
                style: MarkerStyle::Backtick,
            }
        );
        assert_eq!(
            classify("File: config.yaml"),
            LineKind::FileMarker {
                path: "config.yaml".to_string(),
                style: MarkerStyle::Plain,
            }
        );
    }

    #[test]
    fn test_prose_mentioning_file_is_not_a_plain_marker() {
        // A plain marker must name a single path token.
        assert_eq!(classify("File: the one described above"), LineKind::Text);
    }

    #[test]
    fn test_ordinary_text() {
        assert_eq!(classify("pytest>=7.0.0"), LineKind::Text);
        assert_eq!(classify(""), LineKind::Text);
    }
}
