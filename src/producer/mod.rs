use crate::model::{SourceRef, SymbolKind, ValidationSource};
use std::path::Path;

pub mod lsp;
pub mod structural;
pub mod textscan;

/// What one producer had to say about one claim.
///
/// `Unavailable` means the producer could not run at all (missing grammar,
/// unreadable file, server not started). It is distinct from `NotFound` and
/// must never count as a rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerVerdict {
    Found {
        line: u32,
        kind: SymbolKind,
        signature: Option<String>,
    },
    NotFound,
    Unavailable,
}

/// An independent checker capable of confirming or refuting
/// "symbol S is defined at file F, line L, kind K".
pub trait EvidenceProducer {
    fn source(&self) -> ValidationSource;

    /// Cheap capability check; a producer reporting `false` is skipped
    /// without entering the checked set.
    fn is_available(&self, repo_root: &Path, claim: &SourceRef) -> bool;

    fn confirm(&mut self, repo_root: &Path, claim: &SourceRef) -> ProducerVerdict;
}
