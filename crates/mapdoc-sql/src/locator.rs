//! Terminal CTE and projection locator
//!
//! dbt transformation models conventionally end with
//!
//! ```sql
//! final as (
//!     select
//!         ...
//!     from ...
//! )
//! select * from final
//! ```
//!
//! The locator anchors on that shape. Inside the CTE body the default
//! strategy assumes the outermost `select` and `from` start their own lines
//! while nested subqueries are written inline; this holds for the code base
//! the tool targets, not for SQL in general. [`LocatorStrategy::Depth`] uses
//! the depth tracker instead.

use std::ops::Range;
use mapdoc_core::{Diagnostic, DiagnosticCode, LocatorStrategy, Location};
use once_cell::sync::Lazy;
use regex::Regex;
use crate::depth::{self, DepthScanner, TokenKind};
use crate::template;

static TERMINAL_SELECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bselect\s+\*\s+from\s+([A-Za-z_][A-Za-z0-9_]*)\s*;?\s*$")
        .expect("terminal select pattern")
});

static CTE_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-Za-z_][A-Za-z0-9_]*)\s+as\s*\(").expect("cte declaration pattern")
});

/// Words that precede `as (` without naming a CTE
const NOT_CTE_NAMES: &[&str] = &["with", "select", "from", "where", "and", "or", "on", "not"];

/// Line numbers (1-indexed, in the full SQL) of the located structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CteBoundary {
    pub start_line: usize,
    pub select_line: usize,
    pub from_line: usize,
}

/// The column list between the outermost `select` and `from`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    /// Column list with comments blanked and template blocks intact
    pub text: String,

    pub boundary: CteBoundary,
}

/// Why no projection could be located
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    #[error("no terminal CTE '{name}' consumed by 'select * from {name}'")]
    CteNotFound { name: String },

    #[error("no terminal 'select * from <cte>' to detect the terminal CTE from")]
    TerminalSelectNotFound,

    #[error("no select/from pair found in {scope}")]
    ProjectionNotFound { scope: String },
}

impl LocateError {
    /// Convert to a diagnostic
    pub fn to_diagnostic(&self, model: &str) -> Diagnostic {
        Diagnostic::for_code(DiagnosticCode::StructureNotFound, self.to_string())
            .with_location(Location::new(model))
    }
}

/// SQL prepared for scanning: comments blanked, and a second copy with
/// template blocks blanked too. Both share byte offsets with the input.
struct Prepared {
    cleaned: String,
    scan: String,
}

impl Prepared {
    fn new(sql: &str) -> Self {
        let cleaned = template::blank_comments(sql);
        let scan = template::blank_blocks(&cleaned);
        Self { cleaned, scan }
    }
}

/// Locate the projection of the CTE `name`
pub fn locate_projection(
    sql: &str,
    name: &str,
    strategy: LocatorStrategy,
) -> Result<Projection, LocateError> {
    let prepared = Prepared::new(sql);
    let body = find_cte_body(&prepared.scan, name).ok_or_else(|| LocateError::CteNotFound {
        name: name.to_string(),
    })?;

    let found = match strategy {
        LocatorStrategy::Line => line_anchored(&prepared.scan, body.clone()),
        LocatorStrategy::Depth => depth_tracked(&prepared.scan, body.clone()),
    };
    let (list, from_pos) = found.ok_or_else(|| LocateError::ProjectionNotFound {
        scope: format!("CTE '{}'", name),
    })?;

    Ok(Projection {
        text: strip_distinct(&prepared.cleaned[list.clone()]).to_string(),
        boundary: CteBoundary {
            start_line: line_of(sql, body.start),
            select_line: line_of(sql, list.start),
            from_line: line_of(sql, from_pos),
        },
    })
}

/// Locate the projection of a plain `select ... from ...` statement
pub fn locate_select_projection(sql: &str) -> Result<Projection, LocateError> {
    let prepared = Prepared::new(sql);
    let (list, from_pos) = depth_tracked(&prepared.scan, 0..prepared.scan.len()).ok_or_else(|| {
        LocateError::ProjectionNotFound { scope: "statement".to_string() }
    })?;

    Ok(Projection {
        text: strip_distinct(&prepared.cleaned[list.clone()]).to_string(),
        boundary: CteBoundary {
            start_line: 1,
            select_line: line_of(sql, list.start),
            from_line: line_of(sql, from_pos),
        },
    })
}

/// Name of the CTE consumed by the trailing `select * from <name>`
pub fn detect_terminal_cte(sql: &str) -> Result<String, LocateError> {
    let prepared = Prepared::new(sql);
    TERMINAL_SELECT
        .captures(&prepared.scan)
        .map(|caps| caps[1].to_string())
        .ok_or(LocateError::TerminalSelectNotFound)
}

/// Names of all CTEs declared as `<name> as (`, in order, deduplicated
pub fn declared_ctes(sql: &str) -> Vec<String> {
    let prepared = Prepared::new(sql);
    let mut names: Vec<String> = Vec::new();

    for caps in CTE_DECLARATION.captures_iter(&prepared.scan) {
        let name = &caps[1];
        if NOT_CTE_NAMES.iter().any(|k| k.eq_ignore_ascii_case(name)) {
            continue;
        }
        if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
            names.push(name.to_string());
        }
    }

    names
}

/// Body range of `<name> as ( ... )` whose closing parenthesis is followed
/// by `select * from <name>`
fn find_cte_body(scan: &str, name: &str) -> Option<Range<usize>> {
    let name = regex::escape(name);
    let opener = Regex::new(&format!(r"(?i)\b{}\s+as\s*\(", name)).ok()?;
    let tail = Regex::new(&format!(r"(?i)^\s*select\s+\*\s+from\s+{}\b", name)).ok()?;

    let body = opener.find_iter(scan).find_map(|m| {
        let open = m.end() - 1;
        let close = DepthScanner::from_offset(scan, open)
            .find(|t| t.kind == TokenKind::Char(')') && t.after.paren_depth() == 0)?
            .span
            .start;
        tail.is_match(&scan[close + 1..]).then_some(open + 1..close)
    });
    body
}

/// First line starting with `select`, then the first later line starting
/// with `from`. Returns the column list range and the `from` offset.
fn line_anchored(scan: &str, body: Range<usize>) -> Option<(Range<usize>, usize)> {
    let mut offset = body.start;
    let mut list_start = None;

    for line in scan[body.clone()].split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let pos = offset + indent;
        offset += line.len();

        match list_start {
            None if depth::keyword_at(scan, pos, "select") => list_start = Some(pos + "select".len()),
            Some(start) if depth::keyword_at(scan, pos, "from") => return Some((start..pos, pos)),
            _ => {}
        }
    }

    None
}

/// First top-level `select`, then the first top-level `from` after it
fn depth_tracked(scan: &str, range: Range<usize>) -> Option<(Range<usize>, usize)> {
    let region = &scan[..range.end];
    let select = depth::find_top_level_keyword(region, "select", range.start)?;
    let list_start = select + "select".len();
    let from = depth::find_top_level_keyword(region, "from", list_start)?;
    Some((list_start..from, from))
}

fn strip_distinct(list: &str) -> &str {
    let trimmed = list.trim_start();
    if depth::keyword_at(trimmed, 0, "distinct") {
        &trimmed["distinct".len()..]
    } else {
        list
    }
}

fn line_of(sql: &str, offset: usize) -> usize {
    sql.as_bytes()[..offset.min(sql.len())].iter().filter(|&&b| b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"{{ config(materialized='table') }}

with txn as (
    select * from {{ ref('bronze__transactions') }}
),

final as (
    select
        txn.id as txn_id, -- primary key
        (select max(x.ts) from x where x.id = txn.id) as last_ts,
        txn.amt as amount
    from txn
    where txn.amt is not null
)

select * from final
"#;

    #[test]
    fn locates_line_anchored_projection() {
        let projection = locate_projection(MODEL, "final", LocatorStrategy::Line).unwrap();
        assert!(projection.text.contains("txn.id as txn_id"));
        assert!(projection.text.contains("txn.amt as amount"));
        assert!(!projection.text.contains("primary key"));
        assert!(!projection.text.contains("where txn.amt"));
        assert_eq!(
            projection.boundary,
            CteBoundary { start_line: 7, select_line: 8, from_line: 12 }
        );
    }

    #[test]
    fn depth_strategy_agrees_on_conventional_layout() {
        let line = locate_projection(MODEL, "final", LocatorStrategy::Line).unwrap();
        let depth = locate_projection(MODEL, "final", LocatorStrategy::Depth).unwrap();
        assert_eq!(line, depth);
    }

    #[test]
    fn cte_name_is_case_insensitive() {
        let sql = "with FINAL as (select a as b\nfrom t)\nSELECT * FROM final";
        assert!(locate_projection(sql, "final", LocatorStrategy::Depth).is_ok());
    }

    #[test]
    fn missing_cte_is_reported() {
        let err = locate_projection("select a from t", "final", LocatorStrategy::Line).unwrap_err();
        assert_eq!(err, LocateError::CteNotFound { name: "final".to_string() });

        let diag = err.to_diagnostic("model_x");
        assert_eq!(diag.code, DiagnosticCode::StructureNotFound);
    }

    #[test]
    fn cte_not_consumed_by_terminal_select_is_ignored() {
        let sql = "with final as (select a as b\nfrom t)\nselect * from other";
        assert!(locate_projection(sql, "final", LocatorStrategy::Line).is_err());
    }

    #[test]
    fn skips_declaration_not_followed_by_terminal_select() {
        let sql = "with wrapper as (\n  with final as (select 1 as a\nfrom t) select * from t2\n),\n\
                   final as (\nselect b.x as y\nfrom b\n)\nselect * from final";
        let projection = locate_projection(sql, "final", LocatorStrategy::Line).unwrap();
        assert_eq!(projection.text.trim(), "b.x as y");
        assert_eq!(projection.boundary.select_line, 6);
    }

    #[test]
    fn single_line_body_needs_depth_strategy() {
        let sql = "with final as (select a as b from t)\nselect * from final";
        assert!(matches!(
            locate_projection(sql, "final", LocatorStrategy::Line),
            Err(LocateError::ProjectionNotFound { .. })
        ));
        let projection = locate_projection(sql, "final", LocatorStrategy::Depth).unwrap();
        assert_eq!(projection.text.trim(), "a as b");
    }

    #[test]
    fn plain_select_statement() {
        let projection = locate_select_projection("select distinct a.x as y, f(b) as z from t a").unwrap();
        assert_eq!(projection.text.trim(), "a.x as y, f(b) as z");
    }

    #[test]
    fn detects_terminal_cte() {
        assert_eq!(detect_terminal_cte(MODEL).unwrap(), "final");
        assert_eq!(
            detect_terminal_cte("select * from renamed;\n-- done\n").unwrap(),
            "renamed"
        );
        assert_eq!(detect_terminal_cte("select a from t"), Err(LocateError::TerminalSelectNotFound));
    }

    #[test]
    fn lists_declared_ctes() {
        assert_eq!(declared_ctes(MODEL), vec!["txn", "final"]);
    }
}
