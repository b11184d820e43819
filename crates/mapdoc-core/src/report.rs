//! Lineage report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::diagnostic::{Diagnostic, Severity};
use crate::lineage::ModelLineage;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Number of models processed
    pub models: usize,

    /// Number of extracted output columns
    pub columns: usize,

    /// Columns containing CASE logic
    pub conditional_columns: usize,

    /// Conditional columns whose branches were extracted
    pub case_logic_extracted: usize,

    /// Projection expressions dropped for lack of an alias
    pub skipped_expressions: usize,

    /// Number of error diagnostics
    pub errors: usize,

    /// Number of warning diagnostics
    pub warnings: usize,

    /// Number of info diagnostics
    pub info: usize,
}

/// Lineage report (report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (RFC 3339)
    pub timestamp: String,

    /// Summary statistics
    pub summary: ReportSummary,

    /// Per-model lineage
    pub models: Vec<ModelLineage>,

    /// All diagnostics
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    /// Create a new empty report
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::default(),
            models: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Add one model's lineage and its diagnostics
    pub fn add_model(&mut self, lineage: ModelLineage, diagnostics: Vec<Diagnostic>) {
        self.summary.models += 1;
        self.summary.columns += lineage.columns.len();
        self.summary.skipped_expressions += lineage.skipped_expressions;
        for column in lineage.conditional_columns() {
            self.summary.conditional_columns += 1;
            if column.case_logic.as_ref().is_some_and(|l| !l.is_empty()) {
                self.summary.case_logic_extracted += 1;
            }
        }
        self.models.push(lineage);

        for diagnostic in diagnostics {
            self.add_diagnostic(diagnostic);
        }
    }

    /// Add a diagnostic to the report
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.summary.errors += 1,
            Severity::Warn => self.summary.warnings += 1,
            Severity::Info => self.summary.info += 1,
        }

        self.diagnostics.push(diagnostic);
    }

    /// Check if the report has any errors
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}
