use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use veridex::catalog::{Catalog, CatalogProducer};
use veridex::model::{SourceRef, SymbolKind, ValidationSource};
use veridex::producer::EvidenceProducer;
use veridex::producer::structural::StructuralProducer;
use veridex::producer::textscan::TextScanProducer;
use veridex::validator::Validator;

fn fixture_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let graph = dir.path().join("graph");
    fs::create_dir_all(&graph).unwrap();
    let mut state = String::new();
    for _ in 0..111 {
        state.push_str("# padding\n");
    }
    state.push_str("class StateGraph:\n");
    state.push_str("    def add_node(self, name):\n");
    state.push_str("        pass\n");
    fs::write(graph.join("state.py"), state).unwrap();
    fs::write(
        dir.path().join("lib.rb"),
        "module Demo\nclass Greeter\n  def greet(name)\n  end\nend\nend\n",
    )
    .unwrap();
    dir
}

fn validator_for(dir: &TempDir, catalog: Catalog) -> Validator {
    let catalog = Arc::new(catalog);
    let producers: Vec<Box<dyn EvidenceProducer>> = vec![
        Box::new(CatalogProducer::new(catalog)),
        Box::new(StructuralProducer::new().unwrap()),
        Box::new(TextScanProducer::new()),
    ];
    Validator::new(dir.path(), producers, 5)
}

#[test]
fn agreeing_sources_confirm_with_full_confidence() {
    let dir = fixture_repo();
    let mut validator = validator_for(&dir, Catalog::scan(dir.path()).unwrap());

    let claim = SourceRef::new("StateGraph", SymbolKind::Class, "graph/state.py", 112, None);
    let result = validator.validate(&claim);
    assert!(result.is_valid);
    assert_eq!(result.sources_checked.len(), 3);
    assert_eq!(result.sources_confirmed.len(), 3);
    assert_eq!(result.confidence, 1.0);
    assert!(result.discrepancies.is_empty());
}

#[test]
fn claims_inside_the_tolerance_window_pass() {
    let dir = fixture_repo();
    let mut validator = validator_for(&dir, Catalog::scan(dir.path()).unwrap());

    // Off by four lines: accepted, with the observed line surfaced.
    let claim = SourceRef::new("StateGraph", SymbolKind::Class, "graph/state.py", 108, None);
    let result = validator.validate(&claim);
    assert!(result.is_valid);
    assert_eq!(result.actual_line, Some(112));

    // Off by twelve: every source disputes the line.
    let claim = SourceRef::new("StateGraph", SymbolKind::Class, "graph/state.py", 100, None);
    let result = validator.validate(&claim);
    assert!(!result.is_valid);
    assert!(result.sources_confirmed.is_empty());
    assert_eq!(result.discrepancies.len(), 3);
    assert!(result.discrepancies.iter().all(|d| d.contains("graph/state.py:112")));
}

#[test]
fn nonexistent_symbol_is_rejected_by_every_source() {
    let dir = fixture_repo();
    let mut validator = validator_for(&dir, Catalog::scan(dir.path()).unwrap());

    let claim = SourceRef::new("Phantom", SymbolKind::Class, "graph/state.py", 50, None);
    let result = validator.validate(&claim);
    assert!(!result.is_valid);
    assert_eq!(result.sources_checked.len(), 3);
    assert!(result.sources_confirmed.is_empty());
    assert!(result.discrepancies.iter().any(|d| d.contains("found no definition")));
}

#[test]
fn unavailable_sources_stay_out_of_the_checked_set() {
    let dir = fixture_repo();
    let mut validator = validator_for(&dir, Catalog::scan(dir.path()).unwrap());

    // No grammar covers ruby, so only the catalog and the line scanner can
    // answer; the scanner's lone confirmation carries the majority.
    let claim = SourceRef::new("Greeter", SymbolKind::Class, "lib.rb", 2, None);
    let result = validator.validate(&claim);
    assert!(result.is_valid);
    assert!(!result.sources_checked.contains(&ValidationSource::StructuralParse));
    assert_eq!(result.sources_confirmed, vec![ValidationSource::GrammarParse]);
}

#[test]
fn no_reachable_source_means_invalid_with_zero_confidence() {
    let dir = fixture_repo();
    let mut validator = validator_for(&dir, Catalog::empty(dir.path()));

    let claim = SourceRef::new("StateGraph", SymbolKind::Class, "missing/file.py", 10, None);
    let result = validator.validate(&claim);
    assert!(!result.is_valid);
    assert_eq!(result.confidence, 0.0);
    assert!(result.sources_checked.is_empty());
    assert!(result.discrepancies.is_empty());
}
