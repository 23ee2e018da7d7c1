use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use veridex::catalog::{Catalog, CatalogProducer};
use veridex::metric::HallMetric;
use veridex::producer::EvidenceProducer;
use veridex::producer::structural::StructuralProducer;
use veridex::producer::textscan::TextScanProducer;
use veridex::retriever::Retriever;
use veridex::validator::Validator;

fn fixture_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let graph = dir.path().join("graph");
    fs::create_dir_all(&graph).unwrap();
    fs::write(
        graph.join("state.py"),
        "class StateGraph:\n    def add_node(self, name):\n        pass\n\ndef compile_graph(graph):\n    return graph\n",
    )
    .unwrap();
    dir
}

fn retriever_for(dir: &TempDir, metric: HallMetric) -> Retriever {
    let catalog = Arc::new(Catalog::scan(dir.path()).unwrap());
    let producers: Vec<Box<dyn EvidenceProducer>> = vec![
        Box::new(CatalogProducer::new(Arc::clone(&catalog))),
        Box::new(StructuralProducer::new().unwrap()),
        Box::new(TextScanProducer::new()),
    ];
    let validator = Validator::new(dir.path(), producers, 5);
    Retriever::new(catalog, validator, metric)
}

#[test]
fn overall_rate_comes_from_cumulative_counts() {
    let dir = fixture_repo();
    let mut retriever = retriever_for(&dir, HallMetric::new(0.9, false));

    // "Graph" resolves fuzzily to two symbols, both validated; the fake
    // query contributes one rejection. Cumulative: 2 validated, 1 rejected.
    let queries = vec!["Graph".to_string(), "FakeSymbol".to_string()];
    let cancel = AtomicBool::new(false);
    let batch = retriever
        .retrieve_batch(&queries, 20, |_| {}, &cancel)
        .unwrap();

    assert_eq!(batch.queries_processed, 2);
    assert_eq!(batch.total_validated, 2);
    assert_eq!(batch.total_rejected, 1);
    assert!((batch.overall_hallucination_rate - 1.0 / 3.0).abs() < 1e-9);
    // A mean of the per-query rates (0.0 and 1.0) would say 0.5.
    assert!((batch.overall_hallucination_rate - 0.5).abs() > 1e-9);
    assert!(!batch.success);
    assert!(batch.duration_seconds >= 0.0);
}

#[test]
fn progress_reports_cumulative_counts_after_each_query() {
    let dir = fixture_repo();
    let mut retriever = retriever_for(&dir, HallMetric::new(0.9, false));

    let queries = vec!["StateGraph".to_string(), "FakeSymbol".to_string()];
    let cancel = AtomicBool::new(false);
    let mut seen = Vec::new();
    retriever
        .retrieve_batch(&queries, 20, |progress| seen.push(progress.clone()), &cancel)
        .unwrap();

    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].queries_processed, 1);
    assert_eq!(seen[0].total_queries, 2);
    assert_eq!(seen[0].hallucination_rate, 0.0);
    assert_eq!(seen[1].total_validated, 1);
    assert_eq!(seen[1].total_rejected, 1);
    assert_eq!(seen[1].hallucination_rate, 0.5);
}

#[test]
fn cancellation_stops_the_batch_between_queries() {
    let dir = fixture_repo();
    let mut retriever = retriever_for(&dir, HallMetric::new(0.9, false));

    let queries = vec!["StateGraph".to_string(), "compile_graph".to_string()];
    let cancel = AtomicBool::new(false);
    let batch = retriever
        .retrieve_batch(
            &queries,
            20,
            |_| cancel.store(true, Ordering::Relaxed),
            &cancel,
        )
        .unwrap();

    assert_eq!(batch.queries_processed, 1);
    assert!(!batch.success);
    assert_eq!(batch.results.len(), 1);
}

#[test]
fn strict_mode_records_before_raising() {
    let dir = fixture_repo();
    let metric = HallMetric::new(0.5, true);
    let mut retriever = retriever_for(&dir, metric.clone());

    // A clean query passes under strict mode.
    retriever.retrieve("StateGraph", 20).unwrap();

    // The fake symbol pushes the rate to the threshold; the error carries
    // the breaching rate and the counts were still recorded.
    let err = retriever.retrieve("FakeSymbol", 20).unwrap_err();
    assert!(err.hall_m >= 0.5);
    assert_eq!(err.threshold, 0.5);

    let summary = metric.summary();
    assert_eq!(summary.total_validated, 1);
    assert_eq!(summary.total_rejected, 1);
    assert!(!summary.is_within_threshold);
}

#[test]
fn explicit_validation_feeds_its_own_metric_bucket() {
    let dir = fixture_repo();
    let metric = HallMetric::new(0.9, false);
    let mut retriever = retriever_for(&dir, metric.clone());

    use veridex::model::SymbolKind;
    let result = retriever
        .validate_symbol("StateGraph", "graph/state.py", 1, SymbolKind::Class)
        .unwrap();
    assert!(result.is_valid);

    let rejected = retriever
        .validate_symbol("Phantom", "graph/state.py", 1, SymbolKind::Class)
        .unwrap();
    assert!(!rejected.is_valid);

    let summary = metric.summary();
    let bucket = summary.per_operation.get("validate_symbol").unwrap();
    assert_eq!(bucket.validated, 1);
    assert_eq!(bucket.rejected, 1);
    assert_eq!(bucket.hall_m, 0.5);
}
