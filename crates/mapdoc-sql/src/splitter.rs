//! Top-level splitting of a projection list into column expressions

use std::ops::Range;
use crate::depth::{DepthScanner, TokenKind};
use crate::template::{self, MaskedText};

/// One projection expression, as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExpression {
    /// Byte range in the text that was split
    pub span: Range<usize>,

    /// Trimmed expression text
    pub text: String,
}

/// Result of splitting a column list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnList {
    pub expressions: Vec<RawExpression>,

    /// Column list after template blocks were replaced; spans index this text
    pub masked: MaskedText,
}

/// Split a column list after replacing `{% ... %}` blocks with a placeholder.
///
/// The input must already have `SELECT` / `FROM` and comments removed.
/// Text from an unclosed `{%` onward is not split.
pub fn split_column_list(text: &str) -> ColumnList {
    let masked = template::mask_blocks(text);
    let end = masked.unterminated_at.unwrap_or(masked.text.len());
    let expressions = split_top_level(&masked.text[..end]);
    ColumnList { expressions, masked }
}

/// Split at commas outside parentheses, `CASE ... END` and quoted literals.
///
/// Empty pieces (e.g. after a trailing comma) are dropped.
pub fn split_top_level(text: &str) -> Vec<RawExpression> {
    let mut expressions = Vec::new();
    let mut start = 0;

    for token in DepthScanner::new(text) {
        if token.kind == TokenKind::Char(',') && token.before.is_top_level() {
            push_trimmed(text, start..token.span.start, &mut expressions);
            start = token.span.end;
        }
    }
    push_trimmed(text, start..text.len(), &mut expressions);

    expressions
}

fn push_trimmed(text: &str, range: Range<usize>, out: &mut Vec<RawExpression>) {
    let piece = &text[range.clone()];
    let trimmed = piece.trim();
    if trimmed.is_empty() {
        return;
    }

    let start = range.start + (piece.len() - piece.trim_start().len());
    out.push(RawExpression {
        span: start..start + trimmed.len(),
        text: trimmed.to_string(),
    });
}
