use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "veridex",
    version,
    about = "Zero-hallucination symbol retrieval and validation",
    after_help = r#"Examples:
  veridex --query StateGraph --codewiki docs/codewiki.md --repo .
  veridex --query Retriever --json --show-metrics
  veridex --batch "StateGraph,compile_graph,FakeSymbol" --strict --threshold 0.05
  veridex --validate StateGraph --file graph/state.py --line 112 --type class
  veridex --query add_node --use-lsp --lsp-cmd "pyright-langserver --stdio"
"#
)]
pub struct Args {
    /// Retrieve validated references for one symbol.
    #[arg(long, value_name = "SYMBOL")]
    pub query: Option<String>,

    /// Retrieve a comma-delimited list of symbols as one batch.
    #[arg(long, value_name = "SYMBOLS", value_delimiter = ',', conflicts_with = "query")]
    pub batch: Vec<String>,

    /// Validate one explicit claim instead of retrieving.
    #[arg(
        long,
        value_name = "SYMBOL",
        conflicts_with_all = ["query", "batch"],
        requires = "file"
    )]
    pub validate: Option<String>,

    /// Claimed file path, relative to the repo root (with --validate).
    #[arg(long, value_name = "PATH")]
    pub file: Option<String>,

    /// Claimed 1-indexed line number; 0 means unknown (with --validate).
    #[arg(long, default_value_t = 0)]
    pub line: u32,

    /// Claimed symbol kind: class|function|method|variable (with --validate).
    #[arg(long = "type", value_name = "KIND")]
    pub symbol_type: Option<String>,

    /// Pre-built catalog document, JSON or markdown. Missing file is a
    /// warning; the catalog is then built by scanning the repo.
    #[arg(long, value_name = "PATH")]
    pub codewiki: Option<PathBuf>,

    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Maximum validated references returned per query.
    #[arg(long, default_value_t = 20)]
    pub max_results: usize,

    /// Emit results as JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// Print content snippets and batch progress.
    #[arg(long)]
    pub verbose: bool,

    /// Print the hallucination metric summary after the run.
    #[arg(long)]
    pub show_metrics: bool,

    /// Fail the run when the hallucination rate reaches the threshold.
    #[arg(long)]
    pub strict: bool,

    /// Cross-check candidates against every available evidence source.
    #[arg(long, overrides_with = "no_multi_source")]
    pub multi_source: bool,

    /// Validate against the catalog only.
    #[arg(long, overrides_with = "multi_source")]
    pub no_multi_source: bool,

    /// Consult a language server as an additional evidence source.
    #[arg(long)]
    pub use_lsp: bool,

    /// Hallucination-rate threshold; overrides VERIDEX_HALL_THRESHOLD.
    #[arg(long, value_name = "RATE")]
    pub threshold: Option<f64>,

    /// Language server command line (with --use-lsp), e.g.
    /// "pyright-langserver --stdio".
    #[arg(long, value_name = "CMD")]
    pub lsp_cmd: Option<String>,
}

impl Args {
    /// Multi-source validation is the default; `--no-multi-source` restricts
    /// validation to the catalog alone.
    pub fn multi_source_enabled(&self) -> bool {
        !self.no_multi_source
    }
}
