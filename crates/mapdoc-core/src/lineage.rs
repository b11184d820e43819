//! Column lineage records
//!
//! One [`ModelLineage`] per transformation, holding one [`ColumnMapping`] per
//! output column of its terminal projection.

use serde::{Deserialize, Serialize};
use crate::config::UpstreamAliases;

/// Conditions longer than this are shortened in summaries
const SUMMARY_CONDITION_WIDTH: usize = 50;

/// A `qualifier.column` reference found in an expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    /// Table or CTE alias, uppercased
    pub qualifier: String,

    /// Column name, uppercased
    pub column: String,
}

impl SourceRef {
    pub fn new(qualifier: &str, column: &str) -> Self {
        Self {
            qualifier: qualifier.to_uppercase(),
            column: column.to_uppercase(),
        }
    }

    /// Resolve the qualifier through an injected alias mapping
    pub fn upstream_table<'a>(&self, aliases: &'a UpstreamAliases) -> Option<&'a str> {
        aliases.resolve(&self.qualifier)
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.qualifier, self.column)
    }
}

/// Kind of a literal found in a CASE branch result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralKind {
    /// Single- or double-quoted string
    String,

    /// Unsigned integer
    Integer,

    /// Bare word such as `null`, `true` or `a.col`
    Identifier,
}

/// A decoded CASE result value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub kind: LiteralKind,

    /// Decoded text, without surrounding quotes
    pub text: String,
}

impl Literal {
    pub fn string(text: impl Into<String>) -> Self {
        Self { kind: LiteralKind::String, text: text.into() }
    }

    pub fn integer(text: impl Into<String>) -> Self {
        Self { kind: LiteralKind::Integer, text: text.into() }
    }

    pub fn identifier(text: impl Into<String>) -> Self {
        Self { kind: LiteralKind::Identifier, text: text.into() }
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            LiteralKind::String => write!(f, "'{}'", self.text.replace('\'', "''")),
            LiteralKind::Integer | LiteralKind::Identifier => write!(f, "{}", self.text),
        }
    }
}

/// One `WHEN <condition> THEN <result>` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseBranch {
    /// Condition text, whitespace-normalized
    pub condition: String,

    pub result: Literal,
}

/// Structured decomposition of a CASE expression
///
/// Branch order is source order; the first matching branch wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseLogic {
    /// Operand of a simple `CASE <operand> WHEN ...` form
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operand: Option<String>,

    pub branches: Vec<CaseBranch>,

    /// `ELSE` value; `None` when the expression has no `ELSE`
    pub else_literal: Option<Literal>,
}

impl CaseLogic {
    /// True when no branch could be extracted
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Branch results followed by the else value, in order
    pub fn result_values(&self) -> Vec<&Literal> {
        self.branches
            .iter()
            .map(|b| &b.result)
            .chain(self.else_literal.iter())
            .collect()
    }

    /// One-line rendering: `WHEN c THEN 'v' | ... | ELSE 'v'`
    ///
    /// Returns an empty string when no branches were extracted.
    pub fn summary(&self) -> String {
        if self.branches.is_empty() {
            return String::new();
        }

        let mut parts: Vec<String> = self
            .branches
            .iter()
            .map(|b| format!("WHEN {} THEN {}", shorten(&b.condition), b.result))
            .collect();

        if let Some(else_literal) = &self.else_literal {
            parts.push(format!("ELSE {}", else_literal));
        }

        parts.join(" | ")
    }
}

fn shorten(condition: &str) -> String {
    if condition.chars().count() <= SUMMARY_CONDITION_WIDTH {
        return condition.to_string();
    }
    let head: String = condition.chars().take(SUMMARY_CONDITION_WIDTH - 3).collect();
    format!("{}...", head)
}

/// One output column of a transformation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Output column name, uppercased
    pub alias: String,

    /// Value expression, whitespace-collapsed
    pub expression: String,

    /// Deduplicated references, in first-seen order
    pub source_references: Vec<SourceRef>,

    /// Expression contains a CASE keyword
    pub is_conditional: bool,

    /// Present iff `is_conditional`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_logic: Option<CaseLogic>,
}

impl ColumnMapping {
    /// The first referenced column, if any
    pub fn primary_source(&self) -> Option<&SourceRef> {
        self.source_references.first()
    }

    /// Upstream tables of all references that resolve through `aliases`
    pub fn upstream_tables<'a>(&self, aliases: &'a UpstreamAliases) -> Vec<&'a str> {
        let mut tables: Vec<&str> = Vec::new();
        for table in self.source_references.iter().filter_map(|r| r.upstream_table(aliases)) {
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
        tables
    }

    /// Text to show as the transformation: the CASE summary when one was
    /// extracted, otherwise the raw expression
    pub fn display_logic(&self) -> String {
        match &self.case_logic {
            Some(logic) if !logic.is_empty() => logic.summary(),
            _ => self.expression.clone(),
        }
    }
}

/// Upstream model consumed through a dbt template call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Upstream {
    /// `ref('model')`
    Ref { model: String },

    /// `source('source', 'table')`
    Source { source: String, table: String },
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ref { model } => write!(f, "{}", model),
            Self::Source { source, table } => write!(f, "{}.{}", source, table),
        }
    }
}

/// Lineage of one transformation model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLineage {
    /// Model name (file stem)
    pub model: String,

    /// Terminal CTE the projection was taken from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_cte: Option<String>,

    /// Models and sources referenced through template calls
    pub upstream: Vec<Upstream>,

    /// Declared CTE names, in order
    pub ctes: Vec<String>,

    pub columns: Vec<ColumnMapping>,

    /// Projection expressions dropped because no alias could be parsed
    pub skipped_expressions: usize,
}

impl ModelLineage {
    pub fn column(&self, alias: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.alias.eq_ignore_ascii_case(alias))
    }

    pub fn conditional_columns(&self) -> impl Iterator<Item = &ColumnMapping> {
        self.columns.iter().filter(|c| c.is_conditional)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direction_logic() -> CaseLogic {
        CaseLogic {
            operand: None,
            branches: vec![
                CaseBranch { condition: "a.amt > 0".into(), result: Literal::string("CREDIT") },
                CaseBranch { condition: "a.amt < 0".into(), result: Literal::string("DEBIT") },
            ],
            else_literal: Some(Literal::string("ZERO")),
        }
    }

    #[test]
    fn literal_display_by_kind() {
        assert_eq!(Literal::string("Y").to_string(), "'Y'");
        assert_eq!(Literal::string("it's").to_string(), "'it''s'");
        assert_eq!(Literal::integer("42").to_string(), "42");
        assert_eq!(Literal::identifier("null").to_string(), "null");
    }

    #[test]
    fn case_summary() {
        assert_eq!(
            direction_logic().summary(),
            "WHEN a.amt > 0 THEN 'CREDIT' | WHEN a.amt < 0 THEN 'DEBIT' | ELSE 'ZERO'"
        );
    }

    #[test]
    fn summary_shortens_long_conditions() {
        let logic = CaseLogic {
            operand: None,
            branches: vec![CaseBranch {
                condition: "x".repeat(60),
                result: Literal::integer("1"),
            }],
            else_literal: None,
        };
        let summary = logic.summary();
        assert_eq!(summary, format!("WHEN {}... THEN 1", "x".repeat(47)));
    }

    #[test]
    fn result_values_keep_order() {
        let logic = direction_logic();
        let values: Vec<&str> = logic.result_values().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(values, vec!["CREDIT", "DEBIT", "ZERO"]);
    }

    #[test]
    fn display_logic_falls_back_to_expression() {
        let mapping = ColumnMapping {
            alias: "X".into(),
            expression: "case when a.b then a.c + 1 end".into(),
            source_references: vec![SourceRef::new("a", "b")],
            is_conditional: true,
            case_logic: Some(CaseLogic::default()),
        };
        assert_eq!(mapping.display_logic(), mapping.expression);
    }

    #[test]
    fn upstream_tables_resolve_and_dedupe() {
        let mut aliases = UpstreamAliases::default();
        aliases.insert("txn", "bronze__transactions");

        let mapping = ColumnMapping {
            alias: "AMT".into(),
            expression: "coalesce(txn.amt, txn.amount, x.y)".into(),
            source_references: vec![
                SourceRef::new("txn", "amt"),
                SourceRef::new("txn", "amount"),
                SourceRef::new("x", "y"),
            ],
            is_conditional: false,
            case_logic: None,
        };

        assert_eq!(mapping.upstream_tables(&aliases), vec!["bronze__transactions"]);
        assert_eq!(mapping.primary_source().map(|r| r.to_string()).as_deref(), Some("TXN.AMT"));
    }
}
