use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path};

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

pub fn normalize_rel_path(repo_root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(repo_root).with_context(|| {
        format!(
            "strip prefix {} from {}",
            repo_root.display(),
            path.display()
        )
    })?;
    Ok(normalize_path(rel))
}

pub fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::CurDir => {}
            _ => {}
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

pub fn truncate_str_bytes(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes.min(value.len());
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Lines around a 1-indexed anchor line, `context` lines either side,
/// byte-capped. Empty when the anchor falls outside the file.
pub fn snippet_around(content: &str, line: u32, context: u32, max_bytes: usize) -> Option<String> {
    if line == 0 || content.is_empty() {
        return None;
    }
    let lines: Vec<&str> = content.lines().collect();
    let anchor = (line - 1) as usize;
    if anchor >= lines.len() {
        return None;
    }
    let start = anchor.saturating_sub(context as usize);
    let end = (anchor + context as usize + 1).min(lines.len());
    let raw = lines[start..end].join("\n");
    let trimmed = raw.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(truncate_str_bytes(trimmed, max_bytes))
    }
}

/// True when `haystack[at..at+needle.len()]` is `needle` delimited by
/// non-identifier characters on both sides.
pub fn is_identifier_boundary(haystack: &str, at: usize, len: usize) -> bool {
    let before_ok = at == 0
        || haystack[..at]
            .chars()
            .next_back()
            .map(|ch| !ch.is_alphanumeric() && ch != '_')
            .unwrap_or(true);
    let after_ok = haystack[at + len..]
        .chars()
        .next()
        .map(|ch| !ch.is_alphanumeric() && ch != '_')
        .unwrap_or(true);
    before_ok && after_ok
}
