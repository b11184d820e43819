//! Configuration schema (mapdoc.toml)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use crate::diagnostic::{DiagnosticCode, Severity};

/// Keywords never accepted as the column half of a `qualifier.column` reference
pub const DEFAULT_RESERVED_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "CASE", "WHEN", "THEN", "ELSE", "END", "AND", "OR", "AS", "IS",
    "NOT", "NULL", "IN", "LIKE", "BETWEEN", "EXISTS", "ALL", "ANY", "TRUE", "FALSE",
];

/// How expressions without a parseable alias are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Skip the expression and emit a warning
    #[default]
    Lenient,

    /// Skip the expression and emit an error, failing the run
    Strict,
}

/// Strategy used to find the projection inside the terminal CTE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorStrategy {
    /// `select` and `from` are the first lines starting with those keywords
    #[default]
    Line,

    /// First top-level `select` / `from` keywords found by depth tracking
    Depth,
}

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }
}

/// Reserved keyword configuration for source-reference scanning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Keywords added to the built-in list (e.g. OVER, PARTITION, ORDER)
    #[serde(default)]
    pub extra: Vec<String>,
}

impl KeywordConfig {
    /// Built-in keywords plus configured extras, uppercased
    pub fn reserved(&self) -> BTreeSet<String> {
        DEFAULT_RESERVED_KEYWORDS
            .iter()
            .map(|k| k.to_string())
            .chain(self.extra.iter().map(|k| k.trim().to_uppercase()))
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// Injected mapping from CTE / table alias to the upstream table it reads
///
/// Lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpstreamAliases(HashMap<String, String>);

impl UpstreamAliases {
    /// Register an alias
    pub fn insert(&mut self, alias: impl Into<String>, table: impl Into<String>) {
        self.0.insert(alias.into().to_lowercase(), table.into());
    }

    /// Resolve an alias to its upstream table
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.0
            .get(&alias.to_lowercase())
            .or_else(|| {
                self.0
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(alias))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

/// Allowlist rules for specific models or patterns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowlistRules {
    /// Skip extraction for these models (glob patterns)
    #[serde(default)]
    pub skip_models: Vec<String>,
}

impl AllowlistRules {
    /// Check if a model should be skipped
    pub fn is_model_skipped(&self, model: &str) -> bool {
        self.skip_models.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, model)
            } else {
                pattern == model
            }
        })
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name of the CTE consumed by the trailing `select * from <name>`.
    /// An empty string detects the name from the SQL.
    #[serde(default = "default_terminal_cte")]
    pub terminal_cte: String,

    /// Unparseable alias handling
    #[serde(default)]
    pub mode: ExtractionMode,

    /// Projection locator strategy
    #[serde(default)]
    pub locator: LocatorStrategy,

    /// Treat a bare `q.col` or `col` expression as aliased by its column name
    #[serde(default)]
    pub implicit_aliases: bool,

    /// Reserved keywords for source-reference scanning
    #[serde(default)]
    pub keywords: KeywordConfig,

    /// Alias to upstream table mapping
    #[serde(default)]
    pub upstream_aliases: UpstreamAliases,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,

    /// Allowlist rules
    #[serde(default)]
    pub allowlist: AllowlistRules,
}

fn default_terminal_cte() -> String {
    "final".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            terminal_cte: default_terminal_cte(),
            mode: ExtractionMode::default(),
            locator: LocatorStrategy::default(),
            implicit_aliases: false,
            keywords: KeywordConfig::default(),
            upstream_aliases: UpstreamAliases::default(),
            severity: SeverityThreshold::default(),
            allowlist: AllowlistRules::default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Configured terminal CTE name, or `None` to detect it
    pub fn terminal_cte_name(&self) -> Option<&str> {
        let name = self.terminal_cte.trim();
        (!name.is_empty()).then_some(name)
    }

    /// Effective severity for a code, honoring mode and overrides
    pub fn severity_for(&self, code: DiagnosticCode) -> Severity {
        let default = match (code, self.mode) {
            (DiagnosticCode::AliasUnparseable, ExtractionMode::Strict) => Severity::Error,
            _ => code.default_severity(),
        };
        self.severity.get_severity(code, default)
    }
}

/// Simple glob matching (supports a single `*`)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];

        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}
