use anyhow::{Context, Result, bail};
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use veridex::catalog::{Catalog, CatalogProducer};
use veridex::cli;
use veridex::config::Config;
use veridex::metric::HallMetric;
use veridex::model::{RetrieveResult, SymbolKind, ValidationResult};
use veridex::producer::EvidenceProducer;
use veridex::producer::lsp::LspProducer;
use veridex::producer::structural::StructuralProducer;
use veridex::producer::textscan::TextScanProducer;
use veridex::retriever::Retriever;
use veridex::validator::Validator;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    let config = Config::get();

    if !args.repo.is_dir() {
        bail!("repository path does not exist: {}", args.repo.display());
    }
    let threshold = match args.threshold {
        Some(value) if (0.0..=1.0).contains(&value) => value,
        Some(value) => bail!("--threshold must be between 0.0 and 1.0, got {value}"),
        None => config.hall_threshold,
    };

    let catalog = match &args.codewiki {
        Some(path) => Catalog::load(path, &args.repo)?,
        None => Catalog::scan(&args.repo)?,
    };
    let catalog = Arc::new(catalog);

    let mut producers: Vec<Box<dyn EvidenceProducer>> =
        vec![Box::new(CatalogProducer::new(Arc::clone(&catalog)))];
    if args.multi_source_enabled() {
        producers.push(Box::new(StructuralProducer::new()?));
        producers.push(Box::new(TextScanProducer::new()));
        if args.use_lsp {
            let cmd = args
                .lsp_cmd
                .clone()
                .or_else(|| std::env::var("VERIDEX_LSP_CMD").ok());
            let Some(cmd) = cmd else {
                bail!("--use-lsp requires --lsp-cmd or VERIDEX_LSP_CMD");
            };
            let cmd: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
            producers.push(Box::new(LspProducer::new(
                cmd,
                Duration::from_secs(config.lsp_timeout_secs),
            )));
        }
    }

    let validator = Validator::new(&args.repo, producers, config.line_tolerance);
    let metric = HallMetric::new(threshold, args.strict);
    let mut retriever = Retriever::new(catalog, validator, metric.clone());

    let outcome = run(&args, &mut retriever);
    if args.show_metrics {
        let summary = metric.summary();
        if args.json {
            eprintln!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            eprintln!(
                "metrics: {} validated, {} rejected, rate {:.4} (threshold {:.4}, {})",
                summary.total_validated,
                summary.total_rejected,
                summary.hall_m,
                summary.threshold,
                if summary.is_within_threshold {
                    "within threshold"
                } else {
                    "threshold exceeded"
                }
            );
            for (operation, stats) in &summary.per_operation {
                eprintln!(
                    "  {operation}: {} validated, {} rejected, rate {:.4}",
                    stats.validated, stats.rejected, stats.hall_m
                );
            }
        }
    }
    outcome
}

fn run(args: &cli::Args, retriever: &mut Retriever) -> Result<()> {
    if let Some(query) = &args.query {
        let result = retriever.retrieve(query, args.max_results)?;
        print_retrieve(args, &result)?;
        return Ok(());
    }

    if !args.batch.is_empty() {
        let queries: Vec<String> = args
            .batch
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        let cancel = AtomicBool::new(false);
        let verbose = args.verbose;
        let batch = retriever.retrieve_batch(
            &queries,
            args.max_results,
            |progress| {
                if verbose {
                    eprintln!(
                        "[{}/{}] {} validated, {} rejected, rate {:.4}",
                        progress.queries_processed,
                        progress.total_queries,
                        progress.total_validated,
                        progress.total_rejected,
                        progress.hallucination_rate
                    );
                }
            },
            &cancel,
        )?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&batch)?);
        } else {
            for result in &batch.results {
                print_retrieve(args, result)?;
            }
            println!(
                "batch: {} queries, {} validated, {} rejected, rate {:.4}, {:.2}s",
                batch.queries_processed,
                batch.total_validated,
                batch.total_rejected,
                batch.overall_hallucination_rate,
                batch.duration_seconds
            );
        }
        return Ok(());
    }

    if let Some(symbol) = &args.validate {
        let file = args
            .file
            .as_deref()
            .context("--validate requires --file")?;
        let kind = args
            .symbol_type
            .as_deref()
            .map(|raw| raw.parse().unwrap_or(SymbolKind::Unknown))
            .unwrap_or(SymbolKind::Unknown);
        let result = retriever.validate_symbol(symbol, file, args.line, kind)?;
        print_validation(args, &result)?;
        return Ok(());
    }

    bail!("one of --query, --batch, or --validate is required (see --help)")
}

fn print_retrieve(args: &cli::Args, result: &RetrieveResult) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    println!(
        "{}: {} validated, {} rejected, rate {:.4}",
        result.query, result.validated_count, result.rejected_count, result.hallucination_rate
    );
    for element in &result.elements {
        let signature = element
            .source
            .signature
            .as_deref()
            .map(|sig| format!("  {sig}"))
            .unwrap_or_default();
        println!(
            "  {}  {} {}{}",
            element.source.citation,
            element.source.symbol_type,
            element.source.symbol_name,
            signature
        );
        if args.verbose {
            if let Some(snippet) = &element.snippet {
                for line in snippet.lines() {
                    println!("    | {line}");
                }
            }
        }
    }
    if result.elements.is_empty() {
        println!("  no validated references");
    }
    Ok(())
}

fn print_validation(args: &cli::Args, result: &ValidationResult) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    println!(
        "{}: {} (confidence {:.2})",
        result.symbol_name,
        if result.is_valid { "valid" } else { "invalid" },
        result.confidence
    );
    let checked: Vec<&str> = result.sources_checked.iter().map(|s| s.label()).collect();
    let confirmed: Vec<&str> = result.sources_confirmed.iter().map(|s| s.label()).collect();
    println!("  checked: [{}]", checked.join(", "));
    println!("  confirmed: [{}]", confirmed.join(", "));
    if let Some(actual) = result.actual_line {
        println!("  actual line: {actual}");
    }
    for discrepancy in &result.discrepancies {
        println!("  discrepancy: {discrepancy}");
    }
    Ok(())
}
