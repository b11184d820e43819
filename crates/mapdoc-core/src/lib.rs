//! mapdoc core
//!
//! Stable domain types shared by the extractor and its consumers.
//! Never rename diagnostic codes - they are part of the report format.

pub mod diagnostic;
pub mod config;
pub mod lineage;
pub mod report;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use config::{
    Config, ConfigError, ExtractionMode, LocatorStrategy, KeywordConfig, UpstreamAliases,
    SeverityThreshold, AllowlistRules, DEFAULT_RESERVED_KEYWORDS,
};
pub use lineage::{
    CaseBranch, CaseLogic, ColumnMapping, Literal, LiteralKind, ModelLineage, SourceRef, Upstream,
};
pub use report::{Report, ReportSummary, ReportVersion};
