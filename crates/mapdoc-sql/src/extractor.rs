//! Alias and source-reference extraction for single projection expressions

use std::collections::BTreeSet;
use mapdoc_core::{ColumnMapping, KeywordConfig, SourceRef};
use once_cell::sync::Lazy;
use regex::Regex;
use crate::depth::{self, DepthScanner, TokenKind};

/// `<expression> [as] <alias>`; the lazy head keeps the alias as short as possible
static ALIASED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^(.*?)\s+(?:as\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*$").expect("alias pattern")
});

/// A bare column, optionally qualified
static BARE_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Za-z_][A-Za-z0-9_]*\.)?([A-Za-z_][A-Za-z0-9_]*)$").expect("bare column pattern")
});

static QUALIFIED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*)\b").expect("qualified pattern")
});

/// The expression does not end in an output alias
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not parse alias for expression: {text}")]
pub struct AliasError {
    /// Expression text, whitespace-collapsed
    pub text: String,
}

/// Extracts a [`ColumnMapping`] from one projection expression
#[derive(Debug, Clone)]
pub struct ExpressionExtractor {
    reserved: BTreeSet<String>,
    implicit_aliases: bool,
}

impl Default for ExpressionExtractor {
    fn default() -> Self {
        Self::new(&KeywordConfig::default(), false)
    }
}

impl ExpressionExtractor {
    pub fn new(keywords: &KeywordConfig, implicit_aliases: bool) -> Self {
        Self {
            reserved: keywords.reserved(),
            implicit_aliases,
        }
    }

    fn is_reserved(&self, word: &str) -> bool {
        self.reserved.contains(&word.to_uppercase())
    }

    /// Build the mapping for one expression. CASE branches are not decomposed here.
    pub fn extract(&self, raw: &str) -> Result<ColumnMapping, AliasError> {
        let (expression, alias) = self.split_alias(raw).ok_or_else(|| AliasError {
            text: collapse_whitespace(raw),
        })?;

        Ok(ColumnMapping {
            source_references: self.source_references(&expression),
            is_conditional: is_conditional(&expression),
            alias,
            expression,
            case_logic: None,
        })
    }

    /// Separate the value expression from its trailing alias.
    ///
    /// Returns the whitespace-collapsed expression and the uppercased alias.
    pub fn split_alias(&self, raw: &str) -> Option<(String, String)> {
        let raw = raw.trim();

        if let Some(caps) = ALIASED.captures(raw) {
            let expression = caps[1].trim();
            let alias = &caps[2];
            if !expression.is_empty() && !self.is_reserved(alias) && !ends_inside_nesting(expression) {
                return Some((collapse_whitespace(expression), alias.to_uppercase()));
            }
        }

        if self.implicit_aliases {
            if let Some(caps) = BARE_COLUMN.captures(raw) {
                if !self.is_reserved(&caps[1]) {
                    return Some((raw.to_string(), caps[1].to_uppercase()));
                }
            }
        }

        None
    }

    /// All `qualifier.column` references, deduplicated in first-seen order.
    ///
    /// Quoted literals, dotted function calls and three-part names are skipped,
    /// as are references whose column part is a reserved keyword.
    pub fn source_references(&self, expression: &str) -> Vec<SourceRef> {
        let scan = blank_quoted(expression);
        let bytes = scan.as_bytes();
        let mut refs: Vec<SourceRef> = Vec::new();

        for caps in QUALIFIED.captures_iter(&scan) {
            let (Some(whole), Some(qualifier), Some(column)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };

            let preceded_by_dot = whole.start() > 0 && bytes[whole.start() - 1] == b'.';
            let next = scan[whole.end()..].trim_start().bytes().next();
            if preceded_by_dot || matches!(next, Some(b'(') | Some(b'.')) {
                continue;
            }
            if self.is_reserved(column.as_str()) {
                continue;
            }

            let reference = SourceRef::new(qualifier.as_str(), column.as_str());
            if !refs.contains(&reference) {
                refs.push(reference);
            }
        }

        refs
    }
}

/// True when the expression contains the CASE keyword outside literals
pub fn is_conditional(expression: &str) -> bool {
    depth::contains_keyword(expression, "case")
}

/// Collapse whitespace runs to single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// An unbalanced head such as `f(a` in `f(a b` leaves its trailing word
/// inside the parenthesis, so that word is not an alias.
fn ends_inside_nesting(expression: &str) -> bool {
    let mut scanner = DepthScanner::new(expression);
    scanner.by_ref().for_each(drop);
    scanner.state().paren_depth() > 0
}

/// Overwrite quoted literals with spaces, keeping byte offsets
fn blank_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for token in DepthScanner::new(text) {
        let piece = &text[token.span.clone()];
        if token.kind == TokenKind::Quoted {
            out.extend(std::iter::repeat(' ').take(piece.len()));
        } else {
            out.push_str(piece);
        }
    }
    out
}
