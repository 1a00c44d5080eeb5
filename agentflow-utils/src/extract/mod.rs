//! ABOUTME: Parses free-form model output into an ordered path-to-content mapping
//! ABOUTME: Single linear tokenize pass, then per-pattern state machines with fence depth tracking
//!
//! The extractor recognizes four syntactic patterns, attempted in order;
//! the first pattern that yields a non-empty mapping wins:
//!
//! 1. Fenced header with language and filename: ` ```python:src/app.py `
//! 2. Bold file marker preceding a fence: `**File: \`app.py\`**`
//! 3. Plain file marker with backticks: `File: \`app.py\``
//! 4. Plain file marker without backticks: `File: app.py`
//!
//! Inside a block, a fence line with an info token nests one level deeper
//! and a bare fence closes one level; the block's true closing fence is the
//! one that brings the depth back to zero. This lets a Markdown file carry
//! fenced code examples without being split apart.
//!
//! If no pattern matches but anonymous fenced blocks exist, filenames are
//! synthesized from the block content (see [`infer`]).

mod infer;
mod tokenizer;

pub use infer::{extension_for_language, infer_filename, to_snake_case};
pub use tokenizer::{classify, tokenize, LineKind, MarkerStyle};

use tracing::{debug, warn};

/// One extracted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: String,
    pub content: String,
}

/// Ordered result of an extraction.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Files in insertion order. A path repeated in the input keeps its
    /// first position with the last content.
    pub files: Vec<ExtractedFile>,
    /// True when the input ended inside an unterminated block; the partial
    /// file is still emitted.
    pub had_unterminated_block: bool,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Content for `path`, if extracted.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.content.as_str())
    }

    fn insert(&mut self, path: String, content: String) {
        if content.is_empty() {
            debug!(path, "skipping empty code block");
            return;
        }
        if let Some(existing) = self.files.iter_mut().find(|f| f.path == path) {
            debug!(path, "duplicate path in model output, keeping last content");
            existing.content = content;
        } else {
            self.files.push(ExtractedFile { path, content });
        }
    }
}

/// Extract a `path -> content` mapping from model output.
pub fn extract(text: &str) -> Extraction {
    let (lines, kinds) = tokenize(text);

    let result = fenced_header_pass(&lines, &kinds);
    if !result.is_empty() {
        return result;
    }
    for style in [MarkerStyle::Bold, MarkerStyle::Backtick, MarkerStyle::Plain] {
        let result = marker_pass(&lines, &kinds, style);
        if !result.is_empty() {
            return result;
        }
    }

    anonymous_pass(&lines, &kinds)
}

/// End index (exclusive) of the block content and the closing-fence index.
///
/// `open_idx` is the index of the opening fence line; the depth starts at
/// one and every fence with an info token nests while every bare fence
/// closes one level.
fn consume_block(kinds: &[LineKind], open_idx: usize) -> (usize, Option<usize>) {
    let mut depth = 1usize;
    let mut i = open_idx + 1;
    while i < kinds.len() {
        match &kinds[i] {
            k if k.is_opening_fence() => depth += 1,
            k if k.is_bare_fence() => {
                depth -= 1;
                if depth == 0 {
                    return (i, Some(i));
                }
            }
            _ => {}
        }
        i += 1;
    }
    (kinds.len(), None)
}

/// Join content lines, dropping leading and trailing blank lines but
/// preserving interior blanks and indentation.
fn assemble(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let Some(start) = start else {
        return String::new();
    };
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(start);
    lines[start..=end].join("\n")
}

/// Strip whitespace, surrounding backticks, and surrounding asterisks from
/// each slash-separated segment, preserving the separators.
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| segment.trim().trim_matches('`').trim_matches('*').trim())
        .collect::<Vec<_>>()
        .join("/")
}

/// Pattern 1: ` ```lang:path ` headers.
fn fenced_header_pass(lines: &[&str], kinds: &[LineKind]) -> Extraction {
    let mut out = Extraction::default();
    let mut i = 0;
    while i < kinds.len() {
        if let LineKind::Fence {
            path: Some(path), ..
        } = &kinds[i]
        {
            let path = sanitize_path(path);
            let (end, close) = consume_block(kinds, i);
            let content = assemble(&lines[i + 1..end]);
            match close {
                Some(close_idx) => {
                    out.insert(path, content);
                    i = close_idx + 1;
                }
                None => {
                    warn!(path, "unterminated code block at end of output");
                    out.insert(path, content);
                    out.had_unterminated_block = true;
                    i = kinds.len();
                }
            }
        } else {
            i += 1;
        }
    }
    out
}

/// Patterns 2-4: a `File:` marker of the given style, optional blank lines,
/// then a fenced block.
fn marker_pass(lines: &[&str], kinds: &[LineKind], style: MarkerStyle) -> Extraction {
    let mut out = Extraction::default();
    let mut i = 0;
    while i < kinds.len() {
        let LineKind::FileMarker {
            path,
            style: marker_style,
        } = &kinds[i]
        else {
            i += 1;
            continue;
        };
        if *marker_style != style {
            i += 1;
            continue;
        }

        // Skip blank lines between the marker and its fence.
        let mut j = i + 1;
        while j < kinds.len() && kinds[j] == LineKind::Text && lines[j].trim().is_empty() {
            j += 1;
        }

        if j >= kinds.len() || !matches!(kinds[j], LineKind::Fence { .. }) {
            // Marker without a following fence does not match this pattern.
            i += 1;
            continue;
        }

        let path = sanitize_path(path);
        let (end, close) = consume_block(kinds, j);
        let content = assemble(&lines[j + 1..end]);
        match close {
            Some(close_idx) => {
                out.insert(path, content);
                i = close_idx + 1;
            }
            None => {
                warn!(path, "unterminated code block at end of output");
                out.insert(path, content);
                out.had_unterminated_block = true;
                i = kinds.len();
            }
        }
    }
    out
}

/// Fallback: anonymous fenced blocks with synthesized filenames.
fn anonymous_pass(lines: &[&str], kinds: &[LineKind]) -> Extraction {
    let mut out = Extraction::default();
    let mut i = 0;
    while i < kinds.len() {
        let LineKind::Fence { lang, .. } = &kinds[i] else {
            i += 1;
            continue;
        };
        let lang = lang.clone();
        let (end, close) = consume_block(kinds, i);
        let content = assemble(&lines[i + 1..end]);
        if !content.is_empty() {
            let name = infer_filename(&content, lang.as_deref());
            match close {
                Some(close_idx) => {
                    out.insert(name, content);
                    i = close_idx + 1;
                    continue;
                }
                None => {
                    warn!(file = name, "unterminated code block at end of output");
                    out.insert(name, content);
                    out.had_unterminated_block = true;
                    return out;
                }
            }
        }
        i = match close {
            Some(close_idx) => close_idx + 1,
            None => kinds.len(),
        };
    }
    out
}
