//! Multi-source claim validation.
//!
//! Every claim is cross-checked against the evidence producers that are able
//! to run for it. Producers that cannot run stay out of `sources_checked`;
//! only a producer that actually answered can confirm or dispute. A claim is
//! valid when a majority of the consulted producers agree, within the line
//! tolerance window.

use crate::model::{SourceRef, SymbolKind, ValidationResult, ValidationSource};
use crate::producer::{EvidenceProducer, ProducerVerdict};
use std::path::{Path, PathBuf};

pub struct Validator {
    repo_root: PathBuf,
    producers: Vec<Box<dyn EvidenceProducer>>,
    line_tolerance: u32,
}

impl Validator {
    pub fn new(
        repo_root: &Path,
        producers: Vec<Box<dyn EvidenceProducer>>,
        line_tolerance: u32,
    ) -> Self {
        Validator {
            repo_root: repo_root.to_path_buf(),
            producers,
            line_tolerance,
        }
    }

    /// Cross-check one claim against every producer that can run for it.
    pub fn validate(&mut self, claim: &SourceRef) -> ValidationResult {
        let mut checked = Vec::new();
        let mut confirmed = Vec::new();
        let mut discrepancies = Vec::new();
        let mut observations: Vec<(ValidationSource, u32, SymbolKind, Option<String>)> =
            Vec::new();

        let tolerance = self.line_tolerance;
        for producer in &mut self.producers {
            let source = producer.source();
            if !producer.is_available(&self.repo_root, claim) {
                continue;
            }
            match producer.confirm(&self.repo_root, claim) {
                ProducerVerdict::Unavailable => continue,
                ProducerVerdict::NotFound => {
                    checked.push(source);
                    discrepancies.push(format!(
                        "{} found no definition of {} in {}",
                        source.label(),
                        claim.symbol_name,
                        claim.file_path
                    ));
                }
                ProducerVerdict::Found {
                    line,
                    kind,
                    signature,
                } => {
                    checked.push(source);
                    observations.push((source, line, kind, signature));
                    if agrees(tolerance, claim, line, kind) {
                        confirmed.push(source);
                    } else {
                        discrepancies.push(format!(
                            "{} reports {} at {}:{}, claimed line {}",
                            source.label(),
                            claim.symbol_name,
                            claim.file_path,
                            line,
                            claim.line_number
                        ));
                    }
                }
            }
        }

        checked.sort();
        confirmed.sort();

        // Majority of consulted producers; a single consulted producer
        // decides alone. No producers at all means the claim cannot be
        // validated and is treated as invalid, with nothing to report as a
        // disagreement.
        let is_valid = !checked.is_empty() && confirmed.len() >= checked.len().div_ceil(2);
        let confidence = if checked.is_empty() {
            0.0
        } else {
            confirmed.len() as f64 / checked.len() as f64
        };

        // Best observation wins in fixed source order, confirming sources
        // first.
        observations.sort_by_key(|(source, ..)| {
            let confirming = confirmed.contains(source);
            (!confirming, *source)
        });
        let best = observations.first();

        let actual_line = best.and_then(|(_, line, ..)| {
            (*line != claim.line_number).then_some(*line)
        });
        let symbol_kind = if claim.symbol_type == SymbolKind::Unknown {
            best.map(|(_, _, kind, _)| *kind).unwrap_or(SymbolKind::Unknown)
        } else {
            claim.symbol_type
        };
        let signature = claim
            .signature
            .clone()
            .or_else(|| best.and_then(|(.., sig)| sig.clone()));

        ValidationResult {
            symbol_name: claim.symbol_name.clone(),
            is_valid,
            confidence,
            line_number: claim.line_number,
            actual_line,
            symbol_kind,
            signature,
            sources_checked: checked,
            sources_confirmed: confirmed,
            discrepancies,
        }
    }
}

/// With a claimed line, the observed line must sit inside the tolerance
/// window. Without one, the observed kind must be compatible with the
/// claimed kind.
fn agrees(tolerance: u32, claim: &SourceRef, line: u32, kind: SymbolKind) -> bool {
    if claim.line_number == 0 {
        return claim.symbol_type == SymbolKind::Unknown
            || kind == SymbolKind::Unknown
            || kind == claim.symbol_type;
    }
    (line as i64 - claim.line_number as i64).abs() <= tolerance as i64
}

/// Fold a validation outcome back into the claim: mark it validated and,
/// when the claim carried no line, adopt the observed one so the citation
/// points at a real location.
pub fn finalize_ref(claim: &SourceRef, result: &ValidationResult) -> SourceRef {
    let line = if claim.line_number == 0 {
        result.actual_line.unwrap_or(0)
    } else {
        claim.line_number
    };
    let mut reference = SourceRef::new(
        claim.symbol_name.clone(),
        result.symbol_kind,
        claim.file_path.clone(),
        line,
        result.signature.clone(),
    );
    reference.validated = result.is_valid;
    reference
}
