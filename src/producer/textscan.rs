//! Cross-language fallback producer.
//!
//! When no grammar is wired up for a file type, definitions are still
//! recognizable from the introducing keyword on the line. This producer
//! scans lines for `<keyword> <name>` shapes and plain `NAME = ...`
//! assignments; it trades precision for coverage and is always one voice
//! among several, never the sole authority by itself.

use crate::model::{SourceRef, SymbolKind, ValidationSource};
use crate::producer::{EvidenceProducer, ProducerVerdict};
use crate::util::is_identifier_boundary;
use std::path::Path;

static DEFINITION_KEYWORDS: &[(&str, SymbolKind)] = &[
    ("class", SymbolKind::Class),
    ("struct", SymbolKind::Class),
    ("enum", SymbolKind::Class),
    ("trait", SymbolKind::Class),
    ("interface", SymbolKind::Class),
    ("type", SymbolKind::Class),
    ("def", SymbolKind::Function),
    ("fn", SymbolKind::Function),
    ("func", SymbolKind::Function),
    ("function", SymbolKind::Function),
    ("sub", SymbolKind::Function),
    ("let", SymbolKind::Variable),
    ("const", SymbolKind::Variable),
    ("var", SymbolKind::Variable),
    ("static", SymbolKind::Variable),
    ("val", SymbolKind::Variable),
];

#[derive(Debug, Clone)]
pub struct ScanHit {
    pub line: u32,
    pub kind: SymbolKind,
}

/// Definition-shaped occurrences of `name` in `content`, 1-indexed lines.
pub fn scan_definitions(content: &str, name: &str) -> Vec<ScanHit> {
    let mut hits = Vec::new();
    if name.is_empty() {
        return hits;
    }
    for (idx, line) in content.lines().enumerate() {
        if let Some(kind) = definition_kind(line, name) {
            hits.push(ScanHit {
                line: idx as u32 + 1,
                kind,
            });
        }
    }
    hits
}

fn definition_kind(line: &str, name: &str) -> Option<SymbolKind> {
    let at = find_identifier(line, name)?;
    let before = line[..at].trim_end();
    // Last token before the name decides the kind: "pub fn name", "def name(".
    if let Some(keyword) = before.rsplit(|ch: char| !ch.is_alphanumeric() && ch != '_').next() {
        for (candidate, kind) in DEFINITION_KEYWORDS {
            if keyword == *candidate {
                return Some(*kind);
            }
        }
    }
    // Assignment at the start of a line: "NAME = ..." or "NAME := ...".
    if before.is_empty() {
        let after = line[at + name.len()..].trim_start();
        if (after.starts_with('=') && !after.starts_with("==")) || after.starts_with(":=") {
            return Some(SymbolKind::Variable);
        }
    }
    None
}

fn find_identifier(line: &str, name: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = line[from..].find(name) {
        let at = from + offset;
        if is_identifier_boundary(line, at, name.len()) {
            return Some(at);
        }
        from = at + name.len();
    }
    None
}

pub struct TextScanProducer;

impl TextScanProducer {
    pub fn new() -> Self {
        TextScanProducer
    }
}

impl Default for TextScanProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceProducer for TextScanProducer {
    fn source(&self) -> ValidationSource {
        ValidationSource::GrammarParse
    }

    fn is_available(&self, repo_root: &Path, claim: &SourceRef) -> bool {
        repo_root.join(&claim.file_path).is_file()
    }

    fn confirm(&mut self, repo_root: &Path, claim: &SourceRef) -> ProducerVerdict {
        let path = repo_root.join(&claim.file_path);
        let Ok(bytes) = std::fs::read(&path) else {
            return ProducerVerdict::Unavailable;
        };
        let Ok(content) = String::from_utf8(bytes) else {
            return ProducerVerdict::Unavailable;
        };
        let hits = scan_definitions(&content, &claim.symbol_name);
        if hits.is_empty() {
            return ProducerVerdict::NotFound;
        }
        let best = if claim.line_number > 0 {
            hits.iter()
                .min_by_key(|hit| (hit.line as i64 - claim.line_number as i64).abs())
        } else {
            hits.first()
        };
        match best {
            Some(hit) => ProducerVerdict::Found {
                line: hit.line,
                kind: hit.kind,
                signature: None,
            },
            None => ProducerVerdict::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_keyword_definitions() {
        let content = "module X\n  class Greeter\n    def greet(name)\n    end\n  end\nend\n";
        let hits = scan_definitions(content, "Greeter");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 2);
        assert_eq!(hits[0].kind, SymbolKind::Class);
        let hits = scan_definitions(content, "greet");
        assert_eq!(hits[0].line, 3);
        assert_eq!(hits[0].kind, SymbolKind::Function);
    }

    #[test]
    fn finds_plain_assignments() {
        let content = "TIMEOUT = 30\nTIMEOUT_MS == 5\nresult := compute()\n";
        let hits = scan_definitions(content, "TIMEOUT");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, SymbolKind::Variable);
        assert!(scan_definitions(content, "TIMEOUT_MS").is_empty());
        assert_eq!(scan_definitions(content, "result")[0].kind, SymbolKind::Variable);
    }

    #[test]
    fn ignores_call_sites_and_substrings() {
        let content = "greet(\"world\")\nclass GreeterFactory\n";
        assert!(scan_definitions(content, "greet").is_empty());
        assert!(scan_definitions(content, "Greeter").is_empty());
    }
}
