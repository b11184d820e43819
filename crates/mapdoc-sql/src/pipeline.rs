//! End-to-end lineage extraction for one transformation model
//!
//! locate projection -> mask templates -> split -> alias/refs -> CASE branches
//!
//! Every step degrades to partial output plus diagnostics; nothing here
//! returns an error for malformed SQL.

use mapdoc_core::{
    CaseLogic, Config, Diagnostic, DiagnosticCode, Location, ModelLineage,
};
use crate::case_logic;
use crate::extractor::ExpressionExtractor;
use crate::locator::{self, LocateError, Projection};
use crate::refs::RefScanner;
use crate::splitter;
use crate::template;

/// Lineage of one model plus everything worth reporting about it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub lineage: ModelLineage,
    pub diagnostics: Vec<Diagnostic>,
}

impl Extraction {
    fn new(model: &str) -> Self {
        Self {
            lineage: ModelLineage {
                model: model.to_string(),
                ..ModelLineage::default()
            },
            diagnostics: Vec::new(),
        }
    }
}

/// Configured extraction pipeline
#[derive(Debug, Clone)]
pub struct LineageExtractor {
    config: Config,
    expressions: ExpressionExtractor,
}

impl LineageExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            expressions: ExpressionExtractor::new(&config.keywords, config.implicit_aliases),
            config: config.clone(),
        }
    }

    /// Extract from a full model, using the configured terminal CTE name or,
    /// when none is configured, the one consumed by the trailing `select *`
    pub fn extract_model(&self, model: &str, sql: &str) -> Extraction {
        let cte = match self.config.terminal_cte_name() {
            Some(name) => name.to_string(),
            None => match locator::detect_terminal_cte(sql) {
                Ok(name) => name,
                Err(err) => return self.structure_failure(model, sql, err),
            },
        };

        self.extract_with_cte(model, sql, &cte)
    }

    /// Extract from the projection of the CTE `cte`
    pub fn extract_with_cte(&self, model: &str, sql: &str, cte: &str) -> Extraction {
        tracing::debug!(model, cte, templated = template::has_template(sql), "extracting model");

        match locator::locate_projection(sql, cte, self.config.locator) {
            Ok(projection) => {
                let mut extraction = self.with_inventory(model, sql);
                extraction.lineage.terminal_cte = Some(cte.to_string());
                self.fill_columns(&projection, &mut extraction);
                extraction
            }
            Err(err) => self.structure_failure(model, sql, err),
        }
    }

    /// Extract from a plain `select ... from ...` statement
    pub fn extract_select(&self, model: &str, sql: &str) -> Extraction {
        match locator::locate_select_projection(sql) {
            Ok(projection) => {
                let mut extraction = self.with_inventory(model, sql);
                self.fill_columns(&projection, &mut extraction);
                extraction
            }
            Err(err) => self.structure_failure(model, sql, err),
        }
    }

    /// Extract from a bare column list, the text between `select` and `from`
    pub fn extract_columns(&self, model: &str, column_list: &str) -> Extraction {
        let mut extraction = Extraction::new(model);
        let projection = Projection {
            text: template::blank_comments(column_list),
            boundary: locator::CteBoundary { start_line: 1, select_line: 1, from_line: 1 },
        };
        self.fill_columns(&projection, &mut extraction);
        extraction
    }

    fn with_inventory(&self, model: &str, sql: &str) -> Extraction {
        let mut extraction = Extraction::new(model);
        extraction.lineage.upstream = RefScanner::extract(sql);
        extraction.lineage.ctes = locator::declared_ctes(sql);
        extraction
    }

    fn structure_failure(&self, model: &str, sql: &str, err: LocateError) -> Extraction {
        tracing::debug!(model, error = %err, "projection not located");

        let mut extraction = self.with_inventory(model, sql);
        let diagnostic = err.to_diagnostic(model);
        extraction.diagnostics.push(self.at_severity(diagnostic));
        extraction
    }

    fn diagnostic(&self, code: DiagnosticCode, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(code, self.config.severity_for(code), message)
    }

    fn at_severity(&self, diagnostic: Diagnostic) -> Diagnostic {
        let severity = self.config.severity_for(diagnostic.code);
        diagnostic.with_severity(severity)
    }

    fn fill_columns(&self, projection: &Projection, extraction: &mut Extraction) {
        let model = extraction.lineage.model.clone();
        let columns = splitter::split_column_list(&projection.text);
        let first_line = projection.boundary.select_line;
        let line_at = |offset: usize| {
            first_line + columns.masked.text[..offset].matches('\n').count()
        };

        if let Some(offset) = columns.masked.unterminated_at {
            extraction.diagnostics.push(
                self.diagnostic(
                    DiagnosticCode::TemplateUnterminated,
                    "template block opened with '{%' is never closed",
                )
                .with_location(Location::with_line(&model, line_at(offset))),
            );
        }

        tracing::debug!(
            model = %model,
            expressions = columns.expressions.len(),
            template_blocks = columns.masked.blocks,
            "split projection"
        );

        for raw in &columns.expressions {
            let text = template::trim_placeholders(&raw.text);
            if text.is_empty() {
                continue;
            }
            let start = raw.span.start + raw.text.find(text).unwrap_or(0);
            let location = Location::with_line(&model, line_at(start));

            let mut mapping = match self.expressions.extract(text) {
                Ok(mapping) => mapping,
                Err(err) => {
                    tracing::debug!(model = %model, expression = %err.text, "skipping unaliased expression");
                    extraction.lineage.skipped_expressions += 1;
                    extraction.diagnostics.push(
                        self.diagnostic(DiagnosticCode::AliasUnparseable, "could not parse an output alias")
                            .with_location(location)
                            .with_snippet(err.text),
                    );
                    continue;
                }
            };

            if mapping.is_conditional {
                mapping.case_logic = Some(match case_logic::decompose(&mapping.expression) {
                    Ok(logic) => logic,
                    Err(err) => {
                        extraction.diagnostics.push(
                            self.diagnostic(
                                DiagnosticCode::CaseUnparseable,
                                format!("CASE logic of {} not extracted: {}", mapping.alias, err),
                            )
                            .with_location(location)
                            .with_snippet(mapping.expression.clone()),
                        );
                        CaseLogic::default()
                    }
                });
            }

            extraction.lineage.columns.push(mapping);
        }
    }
}

impl Default for LineageExtractor {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapdoc_core::{ExtractionMode, Literal, Severity, Upstream};
    use pretty_assertions::assert_eq;

    const MODEL: &str = r#"{{ config(materialized='table') }}

with txn as (
    select * from {{ ref('bronze__transactions') }}
),

final as (
    select
        txn.id as txn_id,
        case
            when txn.amt > 0 then 'CREDIT'
            when txn.amt < 0 then 'DEBIT'
            else 'ZERO'
        end as direction,
        txn.amt * 100 amount_cents,
        txn.amt + 1
    from txn
)

select * from final
"#;

    #[test]
    fn extracts_full_model() {
        let extraction = LineageExtractor::default().extract_model("fct_txn", MODEL);
        let lineage = &extraction.lineage;

        assert_eq!(lineage.terminal_cte.as_deref(), Some("final"));
        assert_eq!(lineage.ctes, vec!["txn", "final"]);
        assert_eq!(
            lineage.upstream,
            vec![Upstream::Ref { model: "bronze__transactions".to_string() }]
        );

        let aliases: Vec<&str> = lineage.columns.iter().map(|c| c.alias.as_str()).collect();
        assert_eq!(aliases, vec!["TXN_ID", "DIRECTION", "AMOUNT_CENTS"]);
        assert_eq!(lineage.skipped_expressions, 1);

        let direction = lineage.column("direction").unwrap();
        let logic = direction.case_logic.as_ref().unwrap();
        assert_eq!(logic.branches.len(), 2);
        assert_eq!(logic.else_literal, Some(Literal::string("ZERO")));
    }

    #[test]
    fn unaliased_expression_reports_location() {
        let extraction = LineageExtractor::default().extract_model("fct_txn", MODEL);
        assert_eq!(extraction.diagnostics.len(), 1);

        let diag = &extraction.diagnostics[0];
        assert_eq!(diag.code, DiagnosticCode::AliasUnparseable);
        assert_eq!(diag.severity, Severity::Warn);
        assert_eq!(diag.snippet.as_deref(), Some("txn.amt + 1"));
        assert_eq!(diag.location, Some(Location::with_line("fct_txn", 16)));
    }

    #[test]
    fn strict_mode_escalates_alias_failures() {
        let config = Config { mode: ExtractionMode::Strict, ..Config::default() };
        let extraction = LineageExtractor::new(&config).extract_model("fct_txn", MODEL);
        assert_eq!(extraction.diagnostics[0].severity, Severity::Error);
        assert_eq!(extraction.lineage.columns.len(), 3);
    }

    #[test]
    fn missing_cte_yields_empty_lineage() {
        let extraction = LineageExtractor::default().extract_with_cte("m", MODEL, "renamed");
        assert!(extraction.lineage.columns.is_empty());
        assert_eq!(extraction.lineage.terminal_cte, None);
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].code, DiagnosticCode::StructureNotFound);
    }

    #[test]
    fn detects_terminal_cte_when_unconfigured() {
        let sql = "with renamed as (\n    select\n        a.x as y\n    from a\n)\nselect * from renamed";
        let config = Config { terminal_cte: String::new(), ..Config::default() };
        let extraction = LineageExtractor::new(&config).extract_model("m", sql);
        assert_eq!(extraction.lineage.terminal_cte.as_deref(), Some("renamed"));
        assert_eq!(extraction.lineage.columns[0].alias, "Y");
    }

    #[test]
    fn unsupported_case_keeps_column() {
        let extraction = LineageExtractor::default()
            .extract_columns("m", "case when a.x then a.y * 2 end as z");
        let column = &extraction.lineage.columns[0];
        assert!(column.is_conditional);
        assert_eq!(column.case_logic, Some(CaseLogic::default()));
        assert_eq!(extraction.diagnostics[0].code, DiagnosticCode::CaseUnparseable);
        assert_eq!(extraction.diagnostics[0].severity, Severity::Info);
    }

    #[test]
    fn templated_case_operand_is_not_decomposed() {
        let extraction = LineageExtractor::default().extract_columns(
            "m",
            "case {% if var('x') %}{% endif %} when a.x = 1 then 'b' end as col",
        );
        let column = &extraction.lineage.columns[0];
        assert_eq!(column.alias, "COL");
        assert_eq!(column.case_logic, Some(CaseLogic::default()));
        assert_eq!(extraction.diagnostics[0].code, DiagnosticCode::CaseUnparseable);
    }

    #[test]
    fn template_wrapped_columns() {
        let list = "a.x as x,\n{% if var('full', false) %}\na.y as y,\n{% endif %}\na.z as z";
        let extraction = LineageExtractor::default().extract_columns("m", list);
        let aliases: Vec<&str> = extraction.lineage.columns.iter().map(|c| c.alias.as_str()).collect();
        assert_eq!(aliases, vec!["X", "Y", "Z"]);
        assert!(extraction.diagnostics.is_empty());
    }

    #[test]
    fn multiline_template_block_keeps_line_numbers() {
        let list = "\n\na.x as x,\n{% set cols = [\n 'a',\n 'b'\n] %}\na.y + 1,\na.z as z";
        let extraction = LineageExtractor::default().extract_columns("m", list);
        assert_eq!(extraction.lineage.columns.len(), 2);
        assert_eq!(extraction.diagnostics.len(), 1);

        let diag = &extraction.diagnostics[0];
        assert_eq!(diag.code, DiagnosticCode::AliasUnparseable);
        assert_eq!(diag.location, Some(Location::with_line("m", 8)));
    }

    #[test]
    fn unterminated_template_is_reported() {
        let extraction = LineageExtractor::default().extract_columns("m", "a.x as x, {% if y");
        assert_eq!(extraction.lineage.columns.len(), 1);
        assert_eq!(extraction.diagnostics[0].code, DiagnosticCode::TemplateUnterminated);
    }

    #[test]
    fn empty_projection() {
        let extraction = LineageExtractor::default().extract_columns("m", "   ");
        assert!(extraction.lineage.columns.is_empty());
        assert!(extraction.diagnostics.is_empty());
    }
}
