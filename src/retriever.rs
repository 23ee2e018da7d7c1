//! Direct dependency retrieval.
//!
//! A query resolves to catalog candidates first (exact, then fuzzy), falling
//! back to a targeted scan of the repository when the catalog has nothing.
//! Every candidate is cross-checked by the validator before it may appear in
//! a result, and every retrieval feeds the hallucination metric. A query
//! with no candidates at all still counts one rejected claim; silence is not
//! evidence.

use crate::catalog::Catalog;
use crate::config::Config;
use crate::metric::{HallMetric, HallMetricExceeded};
use crate::model::{
    BatchProgress, BatchResult, CodeElement, RetrieveResult, SourceRef, SymbolKind,
    ValidationResult, hall_rate,
};
use crate::producer::structural::{self, StructuralProducer};
use crate::producer::textscan;
use crate::util;
use crate::validator::{self, Validator};
use ignore::WalkBuilder;
use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

pub struct Retriever {
    repo_root: PathBuf,
    catalog: Arc<Catalog>,
    validator: Validator,
    metric: HallMetric,
    scanner: Option<StructuralProducer>,
}

impl Retriever {
    pub fn new(catalog: Arc<Catalog>, validator: Validator, metric: HallMetric) -> Self {
        Retriever {
            repo_root: catalog.repo_root().to_path_buf(),
            scanner: StructuralProducer::new().ok(),
            catalog,
            validator,
            metric,
        }
    }

    pub fn metric(&self) -> &HallMetric {
        &self.metric
    }

    /// Retrieve validated references for one symbol query.
    pub fn retrieve(
        &mut self,
        query: &str,
        max_results: usize,
    ) -> Result<RetrieveResult, HallMetricExceeded> {
        let candidates = self.candidates_for(query);
        if candidates.is_empty() {
            // Nothing anywhere claims this symbol exists. That is one
            // rejected claim, not a silent empty result.
            self.metric.record("retrieve", 0, 1)?;
            return Ok(RetrieveResult {
                query: query.to_string(),
                elements: Vec::new(),
                validated_count: 0,
                rejected_count: 1,
                hallucination_rate: 1.0,
                success: 1.0 < self.metric.threshold(),
            });
        }

        let mut validated = Vec::new();
        let mut validated_count = 0usize;
        let mut rejected_count = 0usize;
        for candidate in &candidates {
            let result = self.validator.validate(candidate);
            if result.is_valid {
                validated_count += 1;
                validated.push((result.confidence, validator::finalize_ref(candidate, &result)));
            } else {
                rejected_count += 1;
            }
        }

        validated.sort_by(|(conf_a, ref_a), (conf_b, ref_b)| {
            conf_b
                .partial_cmp(conf_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(ref_a.citation.len().cmp(&ref_b.citation.len()))
                .then(ref_a.citation.cmp(&ref_b.citation))
        });
        validated.truncate(max_results);

        let elements = self.attach_snippets(validated.into_iter().map(|(_, r)| r));
        let rate = hall_rate(validated_count as u64, rejected_count as u64);
        self.metric
            .record("retrieve", validated_count as u64, rejected_count as u64)?;
        Ok(RetrieveResult {
            query: query.to_string(),
            elements,
            validated_count,
            rejected_count,
            hallucination_rate: rate,
            success: rate < self.metric.threshold(),
        })
    }

    /// Run a sequence of queries, reporting cumulative progress after each.
    /// The overall rate is computed from the summed counts; a mean of
    /// per-query rates would let small queries swamp large ones.
    pub fn retrieve_batch(
        &mut self,
        queries: &[String],
        max_results: usize,
        mut on_progress: impl FnMut(&BatchProgress),
        cancel: &AtomicBool,
    ) -> Result<BatchResult, HallMetricExceeded> {
        let started = Instant::now();
        let mut results = Vec::with_capacity(queries.len());
        let mut total_validated = 0usize;
        let mut total_rejected = 0usize;
        for query in queries {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let result = self.retrieve(query, max_results)?;
            total_validated += result.validated_count;
            total_rejected += result.rejected_count;
            results.push(result);
            on_progress(&BatchProgress {
                queries_processed: results.len(),
                total_queries: queries.len(),
                total_validated,
                total_rejected,
                hallucination_rate: hall_rate(total_validated as u64, total_rejected as u64),
            });
        }
        let queries_processed = results.len();
        let success =
            queries_processed == queries.len() && results.iter().all(|result| result.success);
        Ok(BatchResult {
            queries_processed,
            total_validated,
            total_rejected,
            overall_hallucination_rate: hall_rate(total_validated as u64, total_rejected as u64),
            duration_seconds: started.elapsed().as_secs_f64(),
            success,
            results,
        })
    }

    /// Cross-check one explicit claim.
    pub fn validate_symbol(
        &mut self,
        name: &str,
        file: &str,
        line: u32,
        kind: SymbolKind,
    ) -> Result<ValidationResult, HallMetricExceeded> {
        let claim = SourceRef::new(name, kind, file, line, None);
        let result = self.validator.validate(&claim);
        let (validated, rejected) = if result.is_valid { (1, 0) } else { (0, 1) };
        self.metric.record("validate_symbol", validated, rejected)?;
        Ok(result)
    }

    fn candidates_for(&mut self, query: &str) -> Vec<SourceRef> {
        let mut candidates = self.catalog.lookup(query, true);
        if candidates.is_empty() {
            candidates = self.catalog.lookup(query, false);
        }
        if candidates.is_empty() {
            candidates = self.scan_repo(query);
        }
        let mut seen = HashSet::new();
        candidates.retain(|candidate| seen.insert(candidate.citation.clone()));
        candidates
    }

    /// Walk the repo for definition-shaped occurrences of `name`. Supported
    /// languages go through the grammar; everything else through the line
    /// scanner. Capped so a pathological query cannot turn into a full
    /// re-index.
    fn scan_repo(&mut self, name: &str) -> Vec<SourceRef> {
        let cap = Config::get().scan_max_candidates;
        let mut candidates = Vec::new();
        let walker = WalkBuilder::new(&self.repo_root)
            .hidden(false)
            .require_git(false)
            .filter_entry(|entry| entry.file_name() != OsStr::new(".git"))
            .build();
        for entry in walker {
            if candidates.len() >= cap {
                break;
            }
            let Ok(entry) = entry else { continue };
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };
            if !content.contains(name) {
                continue;
            }
            let Ok(rel_path) = util::normalize_rel_path(&self.repo_root, path) else {
                continue;
            };
            let lang = structural::language_for_path(path);
            let defs = lang
                .and_then(|lang| self.scanner.as_mut()?.definitions(lang, &content))
                .map(|defs| {
                    defs.into_iter()
                        .filter(|def| def.name == name)
                        .map(|def| {
                            SourceRef::new(name, def.kind, rel_path.clone(), def.line, def.signature)
                        })
                        .collect::<Vec<_>>()
                });
            match defs {
                Some(defs) => candidates.extend(defs),
                None => candidates.extend(
                    textscan::scan_definitions(&content, name)
                        .into_iter()
                        .map(|hit| SourceRef::new(name, hit.kind, rel_path.clone(), hit.line, None)),
                ),
            }
        }
        candidates.truncate(cap);
        candidates.sort_by(|a, b| a.citation.cmp(&b.citation));
        candidates
    }

    fn attach_snippets(&self, refs: impl Iterator<Item = SourceRef>) -> Vec<CodeElement> {
        let max_bytes = Config::get().snippet_max_bytes;
        let mut cache: HashMap<String, Option<String>> = HashMap::new();
        refs.map(|reference| {
            let content = cache
                .entry(reference.file_path.clone())
                .or_insert_with(|| {
                    std::fs::read_to_string(self.repo_root.join(&reference.file_path)).ok()
                });
            let snippet = content.as_deref().and_then(|content| {
                util::snippet_around(content, reference.line_number, 2, max_bytes)
            });
            CodeElement {
                source: reference,
                snippet,
            }
        })
        .collect()
    }
}
