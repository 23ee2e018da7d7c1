// Configuration module for veridex
// Reads from environment variables with sensible defaults

use std::env;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Line tolerance window for evidence agreement (VERIDEX_LINE_TOLERANCE)
    pub line_tolerance: u32,

    /// Default hallucination-rate threshold (VERIDEX_HALL_THRESHOLD)
    pub hall_threshold: f64,

    /// Semantic server request timeout in seconds (VERIDEX_LSP_TIMEOUT_SECS)
    pub lsp_timeout_secs: u64,

    /// Maximum snippet size in bytes (VERIDEX_SNIPPET_MAX_BYTES)
    pub snippet_max_bytes: usize,

    /// Maximum candidates taken from a live scan per query (VERIDEX_SCAN_MAX_CANDIDATES)
    pub scan_max_candidates: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            line_tolerance: 5,
            hall_threshold: 0.02,
            lsp_timeout_secs: 10,
            snippet_max_bytes: 400,
            scan_max_candidates: 50,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("VERIDEX_LINE_TOLERANCE") {
            if let Ok(parsed) = val.parse() {
                config.line_tolerance = parsed;
            } else {
                eprintln!(
                    "veridex: Warning: Invalid VERIDEX_LINE_TOLERANCE value: {}, using default: {}",
                    val, config.line_tolerance
                );
            }
        }

        if let Ok(val) = env::var("VERIDEX_HALL_THRESHOLD") {
            match val.parse::<f64>() {
                Ok(parsed) if (0.0..=1.0).contains(&parsed) => config.hall_threshold = parsed,
                _ => eprintln!(
                    "veridex: Warning: Invalid VERIDEX_HALL_THRESHOLD value: {}, using default: {}",
                    val, config.hall_threshold
                ),
            }
        }

        if let Ok(val) = env::var("VERIDEX_LSP_TIMEOUT_SECS") {
            if let Ok(parsed) = val.parse() {
                config.lsp_timeout_secs = parsed;
            } else {
                eprintln!(
                    "veridex: Warning: Invalid VERIDEX_LSP_TIMEOUT_SECS value: {}, using default: {}",
                    val, config.lsp_timeout_secs
                );
            }
        }

        if let Ok(val) = env::var("VERIDEX_SNIPPET_MAX_BYTES") {
            if let Ok(parsed) = val.parse() {
                config.snippet_max_bytes = parsed;
            } else {
                eprintln!(
                    "veridex: Warning: Invalid VERIDEX_SNIPPET_MAX_BYTES value: {}, using default: {}",
                    val, config.snippet_max_bytes
                );
            }
        }

        if let Ok(val) = env::var("VERIDEX_SCAN_MAX_CANDIDATES") {
            if let Ok(parsed) = val.parse() {
                config.scan_max_candidates = parsed;
            } else {
                eprintln!(
                    "veridex: Warning: Invalid VERIDEX_SCAN_MAX_CANDIDATES value: {}, using default: {}",
                    val, config.scan_max_candidates
                );
            }
        }

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.line_tolerance, 5);
        assert_eq!(config.hall_threshold, 0.02);
        assert_eq!(config.lsp_timeout_secs, 10);
        assert_eq!(config.snippet_max_bytes, 400);
        assert_eq!(config.scan_max_candidates, 50);
    }
}
