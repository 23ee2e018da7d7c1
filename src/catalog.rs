//! Symbol catalog: `name -> [SourceRef]`, built once from a pre-generated
//! codewiki document and/or a fresh scan of the repository, read-only after
//! construction. A missing codewiki file yields an empty catalog plus a
//! warning, never a hard error; retrieval can still run against the repo.

use crate::model::{SourceRef, SymbolKind, ValidationSource};
use crate::producer::structural::{self, StructuralProducer};
use crate::producer::{EvidenceProducer, ProducerVerdict};
use crate::util;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    #[serde(default)]
    kind: Option<String>,
    path: String,
    line: u32,
    #[serde(default)]
    signature: Option<String>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    // Entries grouped per file keep refresh cheap; the name index is
    // derived from them.
    by_file: BTreeMap<String, Vec<SourceRef>>,
    by_name: BTreeMap<String, Vec<SourceRef>>,
    file_hashes: HashMap<String, String>,
    repo_root: PathBuf,
}

impl Catalog {
    pub fn empty(repo_root: &Path) -> Self {
        Catalog {
            repo_root: repo_root.to_path_buf(),
            ..Default::default()
        }
    }

    /// Parse a pre-built codewiki document. A missing path is a warning and
    /// an empty catalog by contract.
    pub fn load(codewiki: &Path, repo_root: &Path) -> Result<Self> {
        if !codewiki.is_file() {
            eprintln!(
                "veridex: Warning: catalog document not found: {}, continuing with empty catalog",
                codewiki.display()
            );
            return Ok(Catalog::empty(repo_root));
        }
        let content = util::read_to_string(codewiki)?;
        let entries = if codewiki.extension() == Some(OsStr::new("json")) {
            parse_json(&content)
                .with_context(|| format!("parse catalog {}", codewiki.display()))?
        } else {
            parse_markdown(&content)
        };
        let mut catalog = Catalog::empty(repo_root);
        for entry in entries {
            let kind = entry
                .kind
                .as_deref()
                .map(|raw| raw.parse().unwrap_or(SymbolKind::Unknown))
                .unwrap_or(SymbolKind::Unknown);
            let reference =
                SourceRef::new(entry.name, kind, entry.path, entry.line, entry.signature);
            catalog.insert(reference);
        }
        catalog.sort_entries();
        Ok(catalog)
    }

    /// Build the index from a live walk of the repository.
    pub fn scan(repo_root: &Path) -> Result<Self> {
        let mut catalog = Catalog::empty(repo_root);
        let mut parser = StructuralProducer::new()?;
        for file in walk_source_files(repo_root)? {
            let source = match std::fs::read_to_string(&file.abs_path) {
                Ok(value) => value,
                Err(err) => {
                    eprintln!("veridex: Warning: skipping {}: {err}", file.rel_path);
                    continue;
                }
            };
            catalog.index_file(&mut parser, &file, &source);
        }
        catalog.sort_entries();
        Ok(catalog)
    }

    /// Rescan the repository, reusing entries for files whose content hash
    /// is unchanged.
    pub fn refresh(&mut self) -> Result<()> {
        let mut parser = StructuralProducer::new()?;
        let mut fresh = Catalog::empty(&self.repo_root);
        for file in walk_source_files(&self.repo_root)? {
            if self.file_hashes.get(&file.rel_path) == Some(&file.hash) {
                if let Some(entries) = self.by_file.get(&file.rel_path) {
                    fresh.by_file.insert(file.rel_path.clone(), entries.clone());
                    fresh.file_hashes.insert(file.rel_path, file.hash);
                }
                continue;
            }
            let Ok(source) = std::fs::read_to_string(&file.abs_path) else {
                continue;
            };
            fresh.index_file(&mut parser, &file, &source);
        }
        fresh.rebuild_name_index();
        fresh.sort_entries();
        *self = fresh;
        Ok(())
    }

    fn index_file(&mut self, parser: &mut StructuralProducer, file: &SourceFile, source: &str) {
        let Some(lang) = structural::language_for_path(&file.abs_path) else {
            return;
        };
        let Some(defs) = parser.definitions(lang, source) else {
            return;
        };
        for def in defs {
            let reference = SourceRef::new(
                def.name,
                def.kind,
                file.rel_path.clone(),
                def.line,
                def.signature,
            );
            self.insert(reference);
        }
        self.file_hashes
            .insert(file.rel_path.clone(), file.hash.clone());
    }

    fn insert(&mut self, reference: SourceRef) {
        self.by_file
            .entry(reference.file_path.clone())
            .or_default()
            .push(reference.clone());
        self.by_name
            .entry(reference.symbol_name.clone())
            .or_default()
            .push(reference);
    }

    fn rebuild_name_index(&mut self) {
        self.by_name.clear();
        let entries: Vec<SourceRef> = self.by_file.values().flatten().cloned().collect();
        for reference in entries {
            self.by_name
                .entry(reference.symbol_name.clone())
                .or_default()
                .push(reference);
        }
    }

    fn sort_entries(&mut self) {
        for refs in self.by_name.values_mut().chain(self.by_file.values_mut()) {
            refs.sort_by(|a, b| {
                a.file_path
                    .cmp(&b.file_path)
                    .then(a.line_number.cmp(&b.line_number))
            });
        }
    }

    /// Candidate refs for a name, unvalidated, in deterministic order.
    /// Non-exact lookup matches name substrings case-insensitively.
    pub fn lookup(&self, name: &str, exact: bool) -> Vec<SourceRef> {
        if exact {
            return self.by_name.get(name).cloned().unwrap_or_default();
        }
        let needle = name.to_ascii_lowercase();
        let mut out = Vec::new();
        for (key, refs) in &self.by_name {
            if key.to_ascii_lowercase().contains(&needle) {
                out.extend(refs.iter().cloned());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.by_name.values().map(|refs| refs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }
}

fn parse_json(content: &str) -> Result<Vec<CatalogEntry>> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(content)?;
    Ok(entries)
}

/// Lenient codewiki markdown: any line carrying a backticked symbol name and
/// a `path:line` token is an entry; an optional `(kind)` tag is honored.
///
///   - `StateGraph` (class) — graph/state.py:112
fn parse_markdown(content: &str) -> Vec<CatalogEntry> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let Some(name) = first_backtick_span(line) else {
            continue;
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            continue;
        }
        let Some((path, line_number)) = find_citation_token(line) else {
            continue;
        };
        let kind = find_kind_tag(line);
        entries.push(CatalogEntry {
            name: name.to_string(),
            kind,
            path,
            line: line_number,
            signature: None,
        });
    }
    entries
}

fn first_backtick_span(line: &str) -> Option<&str> {
    let start = line.find('`')?;
    let rest = &line[start + 1..];
    let end = rest.find('`')?;
    Some(&rest[..end])
}

fn find_kind_tag(line: &str) -> Option<String> {
    let start = line.find('(')?;
    let rest = &line[start + 1..];
    let end = rest.find(')')?;
    let tag = rest[..end].trim();
    let known = matches!(
        tag.to_ascii_lowercase().as_str(),
        "class" | "struct" | "enum" | "trait" | "interface" | "type" | "function" | "func"
            | "fn" | "def" | "method" | "variable" | "var" | "const" | "constant" | "static"
    );
    known.then(|| tag.to_string())
}

fn find_citation_token(line: &str) -> Option<(String, u32)> {
    for token in line.split_whitespace() {
        let token = token.trim_matches(|ch: char| "`*()[],;".contains(ch));
        let Some((path, line_str)) = token.rsplit_once(':') else {
            continue;
        };
        if path.is_empty() || !(path.contains('/') || path.contains('.')) {
            continue;
        }
        if let Ok(line_number) = line_str.parse::<u32>() {
            return Some((path.to_string(), line_number));
        }
    }
    None
}

struct SourceFile {
    rel_path: String,
    abs_path: PathBuf,
    hash: String,
}

fn walk_source_files(repo_root: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    let walker = WalkBuilder::new(repo_root)
        .hidden(false)
        .require_git(false)
        .filter_entry(|entry| entry.file_name() != OsStr::new(".git"))
        .build();
    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                eprintln!("veridex: walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if structural::language_for_path(path).is_none() {
            continue;
        }
        let rel_path = util::normalize_rel_path(repo_root, path)?;
        let data = match std::fs::read(path) {
            Ok(value) => value,
            Err(err) => {
                eprintln!("veridex: Warning: skipping {rel_path}: {err}");
                continue;
            }
        };
        let hash = blake3::hash(&data).to_hex().to_string();
        files.push(SourceFile {
            rel_path,
            abs_path: path.to_path_buf(),
            hash,
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// The catalog consulted as an evidence producer: a claim is confirmed when
/// the catalog knows the name in the same file. An empty catalog cannot run.
pub struct CatalogProducer {
    catalog: Arc<Catalog>,
}

impl CatalogProducer {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        CatalogProducer { catalog }
    }
}

impl EvidenceProducer for CatalogProducer {
    fn source(&self) -> ValidationSource {
        ValidationSource::Catalog
    }

    fn is_available(&self, _repo_root: &Path, _claim: &SourceRef) -> bool {
        !self.catalog.is_empty()
    }

    fn confirm(&mut self, _repo_root: &Path, claim: &SourceRef) -> ProducerVerdict {
        let entries = self.catalog.lookup(&claim.symbol_name, true);
        if entries.is_empty() {
            return ProducerVerdict::NotFound;
        }
        let mut same_file: Vec<&SourceRef> = entries
            .iter()
            .filter(|entry| entry.file_path == claim.file_path)
            .collect();
        if same_file.is_empty() {
            return ProducerVerdict::NotFound;
        }
        if claim.line_number > 0 {
            same_file
                .sort_by_key(|entry| (entry.line_number as i64 - claim.line_number as i64).abs());
        }
        let best = same_file[0];
        ProducerVerdict::Found {
            line: best.line_number,
            kind: best.symbol_type,
            signature: best.signature.clone(),
        }
    }
}
