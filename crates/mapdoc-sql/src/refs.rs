//! dbt `ref()` / `source()` reference scanning
//!
//! Handles template calls like {{ ref('model') }} and {{ source('source', 'table') }}.
//! Only `{{ ... }}` blocks outside comments are considered.

use mapdoc_core::Upstream;
use once_cell::sync::Lazy;
use regex::Regex;
use crate::template;

static CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(ref|source)\s*\(([^()]*)\)").expect("template call pattern")
});

/// Scans model SQL for the models and sources it reads from
pub struct RefScanner;

impl RefScanner {
    /// All upstream references, deduplicated in source order
    pub fn extract(sql: &str) -> Vec<Upstream> {
        let cleaned = template::blank_comments(sql);
        let mut upstream: Vec<Upstream> = Vec::new();

        let mut start = 0;
        while let Some(open) = cleaned[start..].find("{{") {
            let open_pos = start + open;
            let Some(close) = cleaned[open_pos..].find("}}") else {
                break;
            };
            let close_pos = open_pos + close;

            for caps in CALL.captures_iter(&cleaned[open_pos + 2..close_pos]) {
                let parsed = match &caps[1] {
                    "ref" => Self::parse_ref(&caps[2]),
                    _ => Self::parse_source(&caps[2]),
                };
                if let Some(reference) = parsed {
                    if !upstream.contains(&reference) {
                        upstream.push(reference);
                    }
                }
            }

            start = close_pos + 2;
        }

        upstream
    }

    /// Arguments of `ref(...)`
    ///
    /// Examples:
    /// - ref('users')
    /// - ref("users")
    /// - ref('package', 'users'), where the last argument names the model
    fn parse_ref(args: &str) -> Option<Upstream> {
        let parts = Self::string_arguments(args)?;
        match parts.as_slice() {
            [model] | [_, model] => Some(Upstream::Ref { model: model.to_string() }),
            _ => None,
        }
    }

    /// Arguments of `source('source_name', 'table_name')`
    fn parse_source(args: &str) -> Option<Upstream> {
        let parts = Self::string_arguments(args)?;
        match parts.as_slice() {
            [source, table] => Some(Upstream::Source {
                source: source.to_string(),
                table: table.to_string(),
            }),
            _ => None,
        }
    }

    /// Positional string literals; keyword arguments such as `v=2` are ignored
    fn string_arguments(args: &str) -> Option<Vec<&str>> {
        args.split(',')
            .map(str::trim)
            .filter(|arg| !arg.is_empty() && !arg.contains('='))
            .map(Self::extract_string_literal)
            .collect()
    }

    fn extract_string_literal(s: &str) -> Option<&str> {
        let trimmed = s.trim();

        if let Some(content) = trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            return Some(content);
        }

        trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"'))
    }
}
