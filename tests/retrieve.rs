use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use veridex::catalog::{Catalog, CatalogProducer};
use veridex::metric::HallMetric;
use veridex::producer::EvidenceProducer;
use veridex::producer::structural::StructuralProducer;
use veridex::producer::textscan::TextScanProducer;
use veridex::retriever::Retriever;
use veridex::validator::Validator;

/// A python module with `class StateGraph` on line 112, `add_node` on 113
/// and `compile_graph` on 116.
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
    state.push('\n');
    state.push_str("def compile_graph(graph):\n");
    state.push_str("    return graph\n");
    fs::write(graph.join("state.py"), state).unwrap();
    dir
}

fn retriever_for(dir: &TempDir, catalog: Catalog) -> Retriever {
    let catalog = Arc::new(catalog);
    let producers: Vec<Box<dyn EvidenceProducer>> = vec![
        Box::new(CatalogProducer::new(Arc::clone(&catalog))),
        Box::new(StructuralProducer::new().unwrap()),
        Box::new(TextScanProducer::new()),
    ];
    let validator = Validator::new(dir.path(), producers, 5);
    Retriever::new(catalog, validator, HallMetric::new(0.5, false))
}

#[test]
fn codewiki_claim_is_validated_with_exact_citation() {
    let dir = fixture_repo();
    let wiki = dir.path().join("codewiki.md");
    fs::write(
        &wiki,
        "# Code Wiki\n\n- `StateGraph` (class) graph/state.py:112\n- `add_node` (method) graph/state.py:113\n",
    )
    .unwrap();
    let catalog = Catalog::load(&wiki, dir.path()).unwrap();
    let mut retriever = retriever_for(&dir, catalog);

    let result = retriever.retrieve("StateGraph", 20).unwrap();
    assert!(result.success);
    assert_eq!(result.validated_count, 1);
    assert_eq!(result.rejected_count, 0);
    assert_eq!(result.hallucination_rate, 0.0);
    assert_eq!(result.elements.len(), 1);
    let element = &result.elements[0];
    assert_eq!(element.source.citation, "graph/state.py:112");
    assert!(element.source.validated);
    assert!(element.snippet.as_deref().unwrap().contains("class StateGraph"));
}

#[test]
fn unknown_symbol_counts_as_one_rejection() {
    let dir = fixture_repo();
    let catalog = Catalog::scan(dir.path()).unwrap();
    let mut retriever = retriever_for(&dir, catalog);

    let result = retriever.retrieve("FakeSymbol", 20).unwrap();
    assert!(!result.success);
    assert_eq!(result.validated_count, 0);
    assert_eq!(result.rejected_count, 1);
    assert_eq!(result.hallucination_rate, 1.0);
    assert!(result.elements.is_empty());

    let summary = retriever.metric().summary();
    assert_eq!(summary.total_rejected, 1);
}

#[test]
fn scanned_catalog_serves_queries_without_a_codewiki() {
    let dir = fixture_repo();
    let catalog = Catalog::scan(dir.path()).unwrap();
    assert!(!catalog.is_empty());
    let mut retriever = retriever_for(&dir, catalog);

    let result = retriever.retrieve("compile_graph", 20).unwrap();
    assert!(result.success);
    assert_eq!(result.elements[0].source.citation, "graph/state.py:116");
}

#[test]
fn empty_catalog_falls_back_to_a_repo_scan() {
    let dir = fixture_repo();
    let mut retriever = retriever_for(&dir, Catalog::empty(dir.path()));

    let result = retriever.retrieve("StateGraph", 20).unwrap();
    assert!(result.success);
    assert_eq!(result.validated_count, 1);
    assert_eq!(result.elements[0].source.citation, "graph/state.py:112");
}

#[test]
fn refresh_picks_up_new_definitions() {
    let dir = fixture_repo();
    let mut catalog = Catalog::scan(dir.path()).unwrap();
    assert!(catalog.lookup("Pipeline", true).is_empty());

    fs::write(dir.path().join("pipe.py"), "class Pipeline:\n    pass\n").unwrap();
    catalog.refresh().unwrap();
    assert_eq!(catalog.lookup("Pipeline", true).len(), 1);
    assert!(!catalog.lookup("StateGraph", true).is_empty());
}

#[test]
fn max_results_caps_returned_elements() {
    let dir = fixture_repo();
    let extra = dir.path().join("alt.py");
    fs::write(&extra, "class StateGraph:\n    pass\n").unwrap();
    let catalog = Catalog::scan(dir.path()).unwrap();
    let mut retriever = retriever_for(&dir, catalog);

    let result = retriever.retrieve("StateGraph", 1).unwrap();
    assert_eq!(result.validated_count, 2);
    assert_eq!(result.elements.len(), 1);
    // Equal confidence; the shorter citation ranks first.
    assert_eq!(result.elements[0].source.citation, "alt.py:1");
}
