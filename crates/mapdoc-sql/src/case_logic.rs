//! Decomposition of CASE expressions into ordered branches
//!
//! Only flat CASE expressions whose results are literals are decomposed.
//! Anything else yields an error rather than a partial or guessed branch list,
//! since branch order carries first-match-wins semantics.

use std::ops::Range;
use mapdoc_core::{CaseBranch, CaseLogic, Literal};
use once_cell::sync::Lazy;
use regex::Regex;
use crate::depth::{self, DepthScanner, TokenKind};
use crate::extractor::collapse_whitespace;
use crate::template::TEMPLATE_PLACEHOLDER;

static SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^'((?:[^']|'')*)'$").expect("single-quoted literal pattern"));

static DOUBLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"([^"]*)"$"#).expect("double-quoted literal pattern"));

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)$").expect("integer literal pattern"));

static BARE_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)$").expect("bare word pattern")
});

/// Why a conditional expression has no structured logic
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaseError {
    #[error("expression has no CASE keyword")]
    NoCase,

    #[error("nested CASE expressions are not decomposed")]
    Nested,

    #[error("CASE has no WHEN ... THEN branches")]
    NoBranches,

    #[error("WHEN without a matching THEN")]
    MissingThen,

    #[error("unexpected {keyword} in CASE")]
    Unexpected { keyword: &'static str },

    #[error("CASE operand is built by a template block")]
    TemplatedOperand,

    #[error("empty WHEN condition")]
    EmptyCondition,

    #[error("result is not a literal: {text}")]
    UnsupportedValue { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Case,
    When,
    Then,
    Else,
    End,
}

impl Keyword {
    fn as_str(self) -> &'static str {
        match self {
            Self::Case => "CASE",
            Self::When => "WHEN",
            Self::Then => "THEN",
            Self::Else => "ELSE",
            Self::End => "END",
        }
    }
}

/// CASE-related keywords outside quoted literals, in order
fn keywords(text: &str) -> Vec<(Keyword, Range<usize>)> {
    let mut found = Vec::new();

    for token in DepthScanner::new(text) {
        let start = token.span.start;
        let keyword = match token.kind {
            TokenKind::CaseOpen => Keyword::Case,
            TokenKind::CaseClose => Keyword::End,
            TokenKind::Char(_) if depth::keyword_at(text, start, "when") => Keyword::When,
            TokenKind::Char(_) if depth::keyword_at(text, start, "then") => Keyword::Then,
            TokenKind::Char(_) if depth::keyword_at(text, start, "else") => Keyword::Else,
            _ => continue,
        };
        found.push((keyword, start..start + keyword.as_str().len()));
    }

    found
}

/// Decode a branch or default value.
///
/// Tried in priority order: single-quoted string, double-quoted string,
/// unsigned integer, bare word. The whole text must match.
pub fn parse_literal(text: &str) -> Option<Literal> {
    let text = text.trim();

    if let Some(caps) = SINGLE_QUOTED.captures(text) {
        return Some(Literal::string(caps[1].replace("''", "'")));
    }
    if let Some(caps) = DOUBLE_QUOTED.captures(text) {
        return Some(Literal::string(&caps[1]));
    }
    if let Some(caps) = INTEGER.captures(text) {
        return Some(Literal::integer(&caps[1]));
    }
    BARE_WORD.captures(text).map(|caps| Literal::identifier(&caps[1]))
}

fn literal_or_error(text: &str) -> Result<Literal, CaseError> {
    parse_literal(text).ok_or_else(|| CaseError::UnsupportedValue {
        text: collapse_whitespace(text),
    })
}

/// Decompose a conditional expression into branches and an optional default
pub fn decompose(expression: &str) -> Result<CaseLogic, CaseError> {
    let all = keywords(expression);

    let mut cases = all.iter().filter(|(k, _)| *k == Keyword::Case);
    let (_, case) = cases.next().ok_or(CaseError::NoCase)?;
    if cases.next().is_some() {
        return Err(CaseError::Nested);
    }

    let after_case: Vec<&(Keyword, Range<usize>)> =
        all.iter().filter(|(_, r)| r.start >= case.end).collect();
    let end_pos = after_case
        .iter()
        .find(|(k, _)| *k == Keyword::End)
        .map_or(expression.len(), |(_, r)| r.start);
    let inner: Vec<&(Keyword, Range<usize>)> =
        after_case.into_iter().filter(|(_, r)| r.start < end_pos).collect();

    let first = match inner.first() {
        Some((Keyword::When, r)) => r.start,
        _ => return Err(CaseError::NoBranches),
    };
    let operand = collapse_whitespace(&expression[case.end..first]);
    if operand.contains(TEMPLATE_PLACEHOLDER) {
        return Err(CaseError::TemplatedOperand);
    }

    let mut logic = CaseLogic {
        operand: (!operand.is_empty()).then_some(operand),
        ..CaseLogic::default()
    };

    let mut i = 0;
    while i < inner.len() {
        let (keyword, range) = inner[i];
        match keyword {
            Keyword::When => {
                let then = match inner.get(i + 1) {
                    Some((Keyword::Then, r)) => r,
                    _ => return Err(CaseError::MissingThen),
                };

                let condition = collapse_whitespace(&expression[range.end..then.start]);
                if condition.is_empty() {
                    return Err(CaseError::EmptyCondition);
                }

                let value_end = inner.get(i + 2).map_or(end_pos, |(_, r)| r.start);
                let result = literal_or_error(&expression[then.end..value_end])?;
                logic.branches.push(CaseBranch { condition, result });
                i += 2;
            }
            Keyword::Else => {
                if let Some((next, _)) = inner.get(i + 1) {
                    return Err(CaseError::Unexpected { keyword: next.as_str() });
                }
                logic.else_literal = Some(literal_or_error(&expression[range.end..end_pos])?);
                i += 1;
            }
            other => return Err(CaseError::Unexpected { keyword: other.as_str() }),
        }
    }

    if logic.branches.is_empty() {
        return Err(CaseError::NoBranches);
    }

    Ok(logic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapdoc_core::LiteralKind;
    use pretty_assertions::assert_eq;

    fn pairs(logic: &CaseLogic) -> Vec<(String, String)> {
        logic
            .branches
            .iter()
            .map(|b| (b.condition.clone(), b.result.text.clone()))
            .collect()
    }

    #[test]
    fn branch_order_and_default() {
        let logic = decompose("CASE WHEN a THEN '1' WHEN b THEN '2' ELSE '3' END").unwrap();
        assert_eq!(
            pairs(&logic),
            vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
        );
        assert_eq!(logic.else_literal, Some(Literal::string("3")));
        assert_eq!(logic.operand, None);
    }

    #[test]
    fn transaction_direction() {
        let logic = decompose(
            "case when a.amt > 0 then 'CREDIT' when a.amt < 0 then 'DEBIT' else 'ZERO' end",
        )
        .unwrap();
        assert_eq!(
            pairs(&logic),
            vec![
                ("a.amt > 0".to_string(), "CREDIT".to_string()),
                ("a.amt < 0".to_string(), "DEBIT".to_string()),
            ]
        );
        assert_eq!(logic.else_literal, Some(Literal::string("ZERO")));
    }

    #[test]
    fn missing_else_stays_absent() {
        let logic = decompose("case when x = 1 then 'Y' end").unwrap();
        assert_eq!(logic.branches.len(), 1);
        assert_eq!(logic.else_literal, None);
    }

    #[test]
    fn literal_kinds() {
        let logic = decompose(
            "case when a then '123' when b then \"dq\" when c then 7 when d then null else t.fallback end",
        )
        .unwrap();
        let kinds: Vec<LiteralKind> = logic.result_values().iter().map(|l| l.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LiteralKind::String,
                LiteralKind::String,
                LiteralKind::Integer,
                LiteralKind::Identifier,
                LiteralKind::Identifier,
            ]
        );
        assert_eq!(logic.branches[0].result.text, "123");
        assert_eq!(logic.else_literal.as_ref().map(|l| l.text.as_str()), Some("t.fallback"));
    }

    #[test]
    fn escaped_quotes_are_decoded() {
        assert_eq!(parse_literal("'it''s'"), Some(Literal::string("it's")));
        assert_eq!(parse_literal("'a' || 'b'"), None);
        assert_eq!(parse_literal("-1"), None);
    }

    #[test]
    fn simple_case_records_operand() {
        let logic = decompose("case a.status when 1 then 'OPEN' when 2 then 'CLOSED' end").unwrap();
        assert_eq!(logic.operand.as_deref(), Some("a.status"));
        assert_eq!(
            pairs(&logic),
            vec![("1".to_string(), "OPEN".to_string()), ("2".to_string(), "CLOSED".to_string())]
        );
    }

    #[test]
    fn keywords_inside_literals_are_ignored() {
        let logic = decompose("case when a.t = 'then' then 'when' else 'end' end").unwrap();
        assert_eq!(pairs(&logic), vec![("a.t = 'then'".to_string(), "when".to_string())]);
        assert_eq!(logic.else_literal, Some(Literal::string("end")));
    }

    #[test]
    fn wrapped_case_is_decomposed() {
        let logic = decompose("coalesce(CASE WHEN a.flag THEN 1 END, 0)").unwrap();
        assert_eq!(pairs(&logic), vec![("a.flag".to_string(), "1".to_string())]);
    }

    #[test]
    fn multiline_conditions_are_normalized() {
        let logic = decompose("case\n  when a.x  in ('A',\n 'B')\n  then 'AB'\nend").unwrap();
        assert_eq!(logic.branches[0].condition, "a.x in ('A', 'B')");
    }

    #[test]
    fn unsupported_forms() {
        assert_eq!(decompose("coalesce(a, b)"), Err(CaseError::NoCase));
        assert_eq!(
            decompose("case when x then case when y then 1 end end"),
            Err(CaseError::Nested)
        );
        assert_eq!(decompose("case x end"), Err(CaseError::NoBranches));
        assert_eq!(
            decompose("case when x then a.amt * 2 else 0 end"),
            Err(CaseError::UnsupportedValue { text: "a.amt * 2".to_string() })
        );
        assert_eq!(decompose("case when x else 1 end"), Err(CaseError::MissingThen));
        assert_eq!(
            decompose("case [jinja_template] [jinja_template] when a.x = 1 then 'b' end"),
            Err(CaseError::TemplatedOperand)
        );
        assert_eq!(
            decompose("case when x then 1 else 2 when y then 3 end"),
            Err(CaseError::Unexpected { keyword: "WHEN" })
        );
    }
}
