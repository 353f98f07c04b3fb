use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tokio::fs;
use unicode_width::UnicodeWidthStr;
use xxhash_rust::xxh3::xxh3_64;

const BRANCH_NAME_MAX_LEN: usize = 50;

/// Status glyph attached to outcome log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Success,
    Warn,
    Error,
}

impl Glyph {
    pub fn symbol(&self) -> &'static str {
        match self {
            Glyph::Success => "✅",
            Glyph::Warn => "⚠️",
            Glyph::Error => "❌",
        }
    }
}

impl fmt::Display for Glyph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Derives a git-safe branch / directory name from a free-form task name.
///
/// Letters and digits of any script are kept. A name with nothing left
/// after sanitizing gets a stable `task-<hash>` name so distinct inputs
/// stay distinct.
pub fn sanitize_branch_name(input: &str) -> String {
    let sanitized: String = input
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let collapsed = sanitized
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    let truncated: String = collapsed.chars().take(BRANCH_NAME_MAX_LEN).collect();
    let result = truncated.trim_end_matches('-').trim_matches('.').to_string();

    if result.is_empty() {
        format!("task-{:08x}", xxh3_64(input.as_bytes()) as u32)
    } else {
        result
    }
}

/// Truncates a string to max_chars characters, appending "..." if truncated.
/// Safe for UTF-8 multi-byte characters (e.g., Japanese text).
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncate_at = max_chars.saturating_sub(3);
        let byte_index = s
            .char_indices()
            .nth(truncate_at)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        format!("{}...", &s[..byte_index])
    }
}

/// Right-pads `s` to `width` terminal columns. Wide (CJK) characters count twice.
pub fn pad_display(s: &str, width: usize) -> String {
    let current = UnicodeWidthStr::width(s);
    if current >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - current))
    }
}

pub fn shell_single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Writes `value` as pretty JSON, replacing the whole file through a sibling
/// temp file so readers never observe a half-written document.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp))?;
    fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {:?}", path))?;
    Ok(())
}
