//! Comment and template-block masking
//!
//! Two flavors:
//! - blanking, which overwrites text with spaces but keeps byte offsets and
//!   newlines, so positions found in the blanked copy index the original;
//! - placeholder masking, which swaps each `{% ... %}` block for a neutral
//!   token before a column list is split.

/// Token substituted for `{% ... %}` blocks in column lists
pub const TEMPLATE_PLACEHOLDER: &str = "[jinja_template]";

/// Column list with template blocks replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedText {
    pub text: String,

    /// Number of blocks replaced
    pub blocks: usize,

    /// Byte offset in `text` of a `{%` with no closing `%}`
    pub unterminated_at: Option<usize>,
}

/// Blank `--` and `/* */` comments and `{# #}` template comments.
///
/// Quoted literals are left alone. Newlines are kept.
pub fn blank_comments(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = bytes.to_vec();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                let end = sql[i..].find('\n').map_or(bytes.len(), |n| i + n);
                blank(&mut out, i..end);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = sql[i + 2..].find("*/").map_or(bytes.len(), |n| i + 2 + n + 2);
                blank(&mut out, i..end);
                i = end;
            }
            b'{' if bytes.get(i + 1) == Some(&b'#') => {
                let end = sql[i + 2..].find("#}").map_or(bytes.len(), |n| i + 2 + n + 2);
                blank(&mut out, i..end);
                i = end;
            }
            _ => i += 1,
        }
    }

    // Blanked ranges start and end on ASCII bytes and hold only spaces now
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Blank `{% ... %}` blocks, keeping byte offsets and newlines
pub fn blank_blocks(sql: &str) -> String {
    let mut out = sql.as_bytes().to_vec();
    for range in block_ranges(sql).0 {
        blank(&mut out, range);
    }
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Replace every `{% ... %}` block with [`TEMPLATE_PLACEHOLDER`].
///
/// Newlines inside a block follow its placeholder, so line numbers counted
/// in the masked text match the input.
pub fn mask_blocks(text: &str) -> MaskedText {
    let (ranges, unterminated_at) = block_ranges(text);
    let mut masked = String::with_capacity(text.len());
    let mut last = 0;

    for range in &ranges {
        masked.push_str(&text[last..range.start]);
        masked.push(' ');
        masked.push_str(TEMPLATE_PLACEHOLDER);
        masked.push(' ');
        masked.push_str(&"\n".repeat(text[range.clone()].matches('\n').count()));
        last = range.end;
    }
    masked.push_str(&text[last..]);

    // The unclosed opener lies in the verbatim tail
    let unterminated_at = unterminated_at.map(|open| masked.len() - (text.len() - open));

    MaskedText {
        text: masked,
        blocks: ranges.len(),
        unterminated_at,
    }
}

/// Trim placeholders left at either end of an expression by surrounding blocks,
/// as in `{% if x %} a as b {% endif %}`
pub fn trim_placeholders(text: &str) -> &str {
    let mut text = text.trim();
    loop {
        if let Some(rest) = text.strip_prefix(TEMPLATE_PLACEHOLDER) {
            text = rest.trim_start();
        } else if let Some(rest) = text.strip_suffix(TEMPLATE_PLACEHOLDER) {
            text = rest.trim_end();
        } else {
            return text;
        }
    }
}

/// Whether the text contains any template syntax
pub fn has_template(sql: &str) -> bool {
    sql.contains("{{") || sql.contains("{%") || sql.contains("{#")
}

/// Closed `{% ... %}` block ranges, plus the offset of an unclosed opener
fn block_ranges(text: &str) -> (Vec<std::ops::Range<usize>>, Option<usize>) {
    let mut ranges = Vec::new();
    let mut start = 0;

    while let Some(open) = text[start..].find("{%") {
        let open_pos = start + open;
        match text[open_pos + 2..].find("%}") {
            Some(close) => {
                let end = open_pos + 2 + close + 2;
                ranges.push(open_pos..end);
                start = end;
            }
            None => return (ranges, Some(open_pos)),
        }
    }

    (ranges, None)
}

/// Overwrite a range with spaces, keeping newlines
fn blank(out: &mut [u8], range: std::ops::Range<usize>) {
    for b in &mut out[range] {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blanks_line_and_block_comments() {
        let sql = "a, -- note, with comma\nb /* x, y */, c";
        let blanked = blank_comments(sql);
        assert_eq!(blanked.len(), sql.len());
        assert!(!blanked.contains("note"));
        assert!(!blanked.contains("x, y"));
        assert_eq!(blanked.lines().count(), 2);
        assert!(blanked.ends_with(", c"));
    }

    #[test]
    fn comment_markers_inside_literals_are_kept() {
        let sql = "'--not a comment' as x";
        assert_eq!(blank_comments(sql), sql);
    }

    #[test]
    fn template_comments_are_blanked() {
        let blanked = blank_comments("{# a, b #}x");
        assert_eq!(blanked.trim(), "x");
    }

    #[test]
    fn multibyte_text_survives_blanking() {
        let sql = "'café' as name -- naïve";
        let blanked = blank_comments(sql);
        assert!(blanked.starts_with("'café' as name"));
        assert_eq!(blanked.len(), sql.len());
    }

    #[test]
    fn mask_replaces_blocks() {
        let masked = mask_blocks("a,\n{% if var('x', true) %}\nb,\n{% endif %}\nc");
        assert_eq!(masked.blocks, 2);
        assert_eq!(masked.unterminated_at, None);
        assert!(!masked.text.contains("var("));
        assert_eq!(masked.text.matches(TEMPLATE_PLACEHOLDER).count(), 2);
    }

    #[test]
    fn mask_keeps_newlines_of_multiline_blocks() {
        let text = "a,\n{% set cols = [\n 'a',\n 'b'\n] %}\nb";
        let masked = mask_blocks(text);
        assert_eq!(masked.blocks, 1);
        assert_eq!(masked.text.matches('\n').count(), text.matches('\n').count());
        assert!(masked.text.ends_with("\nb"));
    }

    #[test]
    fn unterminated_block_is_reported() {
        let masked = mask_blocks("a, {% if x %} b, {% endif");
        assert_eq!(masked.blocks, 1);
        assert_eq!(masked.unterminated_at, Some(25));
        assert!(masked.text[25..].starts_with("{% endif"));
    }

    #[test]
    fn placeholders_trimmed_at_edges_only() {
        let text = " [jinja_template] a as b [jinja_template]  [jinja_template] ";
        assert_eq!(trim_placeholders(text), "a as b");
        assert_eq!(trim_placeholders("f(a [jinja_template] b) as c"), "f(a [jinja_template] b) as c");
        assert_eq!(trim_placeholders(" [jinja_template] "), "");
    }

    #[test]
    fn blank_blocks_keeps_offsets() {
        let sql = "x {% set a = (1, 2) %}\ny";
        let blanked = blank_blocks(sql);
        assert_eq!(blanked.len(), sql.len());
        assert!(!blanked.contains('('));
        assert!(blanked.ends_with("\ny"));
    }

    #[test]
    fn detects_template_syntax() {
        assert!(has_template("select * from {{ ref('t') }}"));
        assert!(has_template("{% set x = 1 %}"));
        assert!(!has_template("select 1"));
    }
}
