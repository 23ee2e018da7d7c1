use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of a claimed or observed symbol.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Class,
    Function,
    Method,
    Variable,
    Unknown,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Variable => "variable",
            SymbolKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "class" | "struct" | "enum" | "trait" | "interface" | "type" => SymbolKind::Class,
            "function" | "func" | "fn" | "def" => SymbolKind::Function,
            "method" => SymbolKind::Method,
            "variable" | "var" | "const" | "constant" | "static" | "let" => SymbolKind::Variable,
            _ => SymbolKind::Unknown,
        })
    }
}

/// A claimed symbol location. `line_number` is 1-indexed; 0 means the line is
/// unknown. `validated` is set only by the validator, never at catalog load.
#[derive(Debug, Serialize, Clone)]
pub struct SourceRef {
    pub symbol_name: String,
    pub symbol_type: SymbolKind,
    pub file_path: String,
    pub line_number: u32,
    pub citation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub validated: bool,
}

impl SourceRef {
    pub fn new(
        symbol_name: impl Into<String>,
        symbol_type: SymbolKind,
        file_path: impl Into<String>,
        line_number: u32,
        signature: Option<String>,
    ) -> Self {
        let symbol_name = symbol_name.into();
        let file_path = file_path.into();
        let citation = format!("{file_path}:{line_number}");
        SourceRef {
            symbol_name,
            symbol_type,
            file_path,
            line_number,
            citation,
            signature,
            validated: false,
        }
    }
}

/// A validated reference plus a short content snippet; only ever built for
/// refs the validator confirmed.
#[derive(Debug, Serialize, Clone)]
pub struct CodeElement {
    #[serde(flatten)]
    pub source: SourceRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Evidence producers actually consulted for one claim. An unavailable
/// producer is absent from the set, never counted as disagreement.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSource {
    Catalog,
    StructuralParse,
    GrammarParse,
    SemanticServer,
}

impl ValidationSource {
    pub fn label(&self) -> &'static str {
        match self {
            ValidationSource::Catalog => "catalog",
            ValidationSource::StructuralParse => "structural parse",
            ValidationSource::GrammarParse => "grammar parse",
            ValidationSource::SemanticServer => "semantic server",
        }
    }
}

/// Outcome of one cross-checked claim.
///
/// Invariants: `sources_confirmed` is a subset of `sources_checked`; an empty
/// `sources_checked` forces `is_valid == false` and `confidence == 0.0`.
#[derive(Debug, Serialize, Clone)]
pub struct ValidationResult {
    pub symbol_name: String,
    pub is_valid: bool,
    pub confidence: f64,
    pub line_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_line: Option<u32>,
    pub symbol_kind: SymbolKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub sources_checked: Vec<ValidationSource>,
    pub sources_confirmed: Vec<ValidationSource>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub discrepancies: Vec<String>,
}

/// Per-query retrieval outcome. `elements` holds validated refs only;
/// `success` compares the query's rate against the configured threshold.
#[derive(Debug, Serialize)]
pub struct RetrieveResult {
    pub query: String,
    pub elements: Vec<CodeElement>,
    pub validated_count: usize,
    pub rejected_count: usize,
    pub hallucination_rate: f64,
    pub success: bool,
}

/// Streaming view over a running batch; counts are cumulative.
#[derive(Debug, Serialize, Clone)]
pub struct BatchProgress {
    pub queries_processed: usize,
    pub total_queries: usize,
    pub total_validated: usize,
    pub total_rejected: usize,
    pub hallucination_rate: f64,
}

/// Aggregate batch outcome. The overall rate is computed from the cumulative
/// totals, never as a mean of per-query rates. `success` requires the batch
/// to have run to completion (not cancelled) with every query successful.
#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub queries_processed: usize,
    pub total_validated: usize,
    pub total_rejected: usize,
    pub overall_hallucination_rate: f64,
    pub duration_seconds: f64,
    pub success: bool,
    pub results: Vec<RetrieveResult>,
}

#[derive(Debug, Serialize, Clone)]
pub struct OperationStats {
    pub validated: u64,
    pub rejected: u64,
    pub hall_m: f64,
}

/// Snapshot of the hallucination metric tracker.
#[derive(Debug, Serialize, Clone)]
pub struct MetricSummary {
    pub total_validated: u64,
    pub total_rejected: u64,
    pub hall_m: f64,
    pub threshold: f64,
    pub is_within_threshold: bool,
    pub per_operation: BTreeMap<String, OperationStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_hall_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hall_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_hall_m: Option<f64>,
    pub samples: usize,
    pub session_start: i64,
}

/// Fraction of claims that could not be confirmed. Zero claims means
/// vacuously zero hallucination, never a division error.
pub fn hall_rate(validated: u64, rejected: u64) -> f64 {
    let total = validated + rejected;
    if total == 0 {
        0.0
    } else {
        rejected as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hall_rate_is_zero_without_claims() {
        assert_eq!(hall_rate(0, 0), 0.0);
    }

    #[test]
    fn hall_rate_is_bounded() {
        assert_eq!(hall_rate(0, 3), 1.0);
        assert_eq!(hall_rate(3, 0), 0.0);
        let mid = hall_rate(1, 1);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn citation_joins_path_and_line() {
        let r = SourceRef::new("StateGraph", SymbolKind::Class, "graph/state.py", 112, None);
        assert_eq!(r.citation, "graph/state.py:112");
        assert!(!r.validated);
    }

    #[test]
    fn symbol_kind_parses_aliases() {
        assert_eq!("struct".parse::<SymbolKind>().unwrap(), SymbolKind::Class);
        assert_eq!("fn".parse::<SymbolKind>().unwrap(), SymbolKind::Function);
        assert_eq!("const".parse::<SymbolKind>().unwrap(), SymbolKind::Variable);
        assert_eq!("widget".parse::<SymbolKind>().unwrap(), SymbolKind::Unknown);
    }
}
