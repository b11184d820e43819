//! Column lineage extraction from templated dbt SQL
//!
//! This crate handles:
//! - Locating the terminal CTE projection of a model
//! - Masking comments and template blocks
//! - Splitting the projection into column expressions, respecting
//!   parentheses and `CASE ... END` blocks
//! - Extracting output aliases and `qualifier.column` source references
//! - Decomposing CASE expressions into ordered branches
//! - Scanning dbt `ref()` / `source()` calls
//!
//! This is not a SQL parser: it targets the conventional layout of dbt
//! transformation models and reports what it cannot handle as diagnostics.

pub mod depth;
pub mod template;
pub mod splitter;
pub mod locator;
pub mod extractor;
pub mod case_logic;
pub mod refs;
pub mod pipeline;

pub use depth::{DepthScanner, Nesting, Token, TokenKind};
pub use splitter::{split_column_list, split_top_level, ColumnList, RawExpression};
pub use locator::{
    declared_ctes, detect_terminal_cte, locate_projection, locate_select_projection, CteBoundary,
    LocateError, Projection,
};
pub use extractor::{AliasError, ExpressionExtractor};
pub use case_logic::{decompose, parse_literal, CaseError};
pub use refs::RefScanner;
pub use pipeline::{Extraction, LineageExtractor};
