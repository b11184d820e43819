//! Nesting state machine for parentheses and `CASE ... END` blocks
//!
//! `CASE` blocks are not bracket-delimited, so splitting a projection list on
//! commas needs both counters. Keywords are matched case-insensitively and only
//! at word boundaries: `CASE_ID` and `ENDDATE` are plain identifiers.
//! Quoted literals are consumed as a single token so that commas, parentheses
//! and keywords inside them never change the state.

use std::ops::Range;

/// Nesting state at a scan position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Nesting {
    /// Top level: outside every parenthesis and CASE block
    #[default]
    Normal,

    /// Inside `n` parentheses, no open CASE
    InParen(usize),

    /// Inside `n` CASE blocks, no open parenthesis
    InCase(usize),

    /// Inside both
    Mixed { paren: usize, case: usize },
}

impl Nesting {
    fn from_depths(paren: usize, case: usize) -> Self {
        match (paren, case) {
            (0, 0) => Self::Normal,
            (p, 0) => Self::InParen(p),
            (0, c) => Self::InCase(c),
            (paren, case) => Self::Mixed { paren, case },
        }
    }

    pub fn paren_depth(self) -> usize {
        match self {
            Self::InParen(p) | Self::Mixed { paren: p, .. } => p,
            _ => 0,
        }
    }

    pub fn case_depth(self) -> usize {
        match self {
            Self::InCase(c) | Self::Mixed { case: c, .. } => c,
            _ => 0,
        }
    }

    pub fn is_top_level(self) -> bool {
        self == Self::Normal
    }

    pub fn open_paren(self) -> Self {
        Self::from_depths(self.paren_depth() + 1, self.case_depth())
    }

    /// A stray `)` at depth zero is tolerated
    pub fn close_paren(self) -> Self {
        Self::from_depths(self.paren_depth().saturating_sub(1), self.case_depth())
    }

    pub fn open_case(self) -> Self {
        Self::from_depths(self.paren_depth(), self.case_depth() + 1)
    }

    /// A stray `END` at depth zero is tolerated
    pub fn close_case(self) -> Self {
        Self::from_depths(self.paren_depth(), self.case_depth().saturating_sub(1))
    }

    /// Consume the token starting at byte `pos` of `text`.
    ///
    /// Returns the state after the token and the token length in bytes.
    /// `pos` must lie on a char boundary.
    pub fn step(self, text: &str, pos: usize) -> (Nesting, usize) {
        let (kind, len) = classify(text, pos);
        let next = match kind {
            TokenKind::Char('(') => self.open_paren(),
            TokenKind::Char(')') => self.close_paren(),
            TokenKind::CaseOpen => self.open_case(),
            TokenKind::CaseClose => self.close_case(),
            _ => self,
        };
        (next, len)
    }
}

/// What a scanned token is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Any single character, including `(` `)` and `,`
    Char(char),

    /// The `CASE` keyword
    CaseOpen,

    /// The `END` keyword
    CaseClose,

    /// A complete quoted literal
    Quoted,
}

/// One scanned token with the state around it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
    pub before: Nesting,
    pub after: Nesting,
}

/// Left-to-right token scanner
pub struct DepthScanner<'a> {
    text: &'a str,
    pos: usize,
    state: Nesting,
}

impl<'a> DepthScanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0, state: Nesting::Normal }
    }

    /// Start at byte `pos` in the `Normal` state. Boundary checks still see
    /// the text before `pos`.
    pub fn from_offset(text: &'a str, pos: usize) -> Self {
        Self { text, pos: pos.min(text.len()), state: Nesting::Normal }
    }

    pub fn state(&self) -> Nesting {
        self.state
    }
}

impl Iterator for DepthScanner<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.pos >= self.text.len() {
            return None;
        }

        let (kind, len) = classify(self.text, self.pos);
        let (after, _) = self.state.step(self.text, self.pos);
        let token = Token {
            kind,
            span: self.pos..self.pos + len,
            before: self.state,
            after,
        };

        self.pos += len;
        self.state = after;
        Some(token)
    }
}

fn classify(text: &str, pos: usize) -> (TokenKind, usize) {
    let bytes = text.as_bytes();
    match bytes[pos] {
        quote @ (b'\'' | b'"') => {
            if let Some(len) = quoted_len(bytes, pos, quote) {
                return (TokenKind::Quoted, len);
            }
        }
        _ if keyword_at(text, pos, "case") => return (TokenKind::CaseOpen, 4),
        _ if keyword_at(text, pos, "end") => return (TokenKind::CaseClose, 3),
        _ => {}
    }

    let ch = text[pos..].chars().next().unwrap_or('\0');
    (TokenKind::Char(ch), ch.len_utf8().max(1))
}

/// Length of the quoted literal at `pos`, honoring doubled-quote escapes
fn quoted_len(bytes: &[u8], pos: usize, quote: u8) -> Option<usize> {
    let mut i = pos + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Some(i + 1 - pos);
        }
        i += 1;
    }
    None
}

/// Identifier characters for boundary checks; non-ASCII bytes count as
/// identifier characters
fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// True when `keyword` (ASCII, any case) starts at `pos` on word boundaries
pub fn keyword_at(text: &str, pos: usize, keyword: &str) -> bool {
    let bytes = text.as_bytes();
    let end = pos + keyword.len();
    if end > bytes.len() || !bytes[pos..end].eq_ignore_ascii_case(keyword.as_bytes()) {
        return false;
    }

    let before_ok = pos == 0 || !is_word_byte(bytes[pos - 1]);
    let after_ok = end == bytes.len() || !is_word_byte(bytes[end]);
    before_ok && after_ok
}

/// Byte offsets of every occurrence of `keyword` outside quoted literals
pub fn keyword_positions(text: &str, keyword: &str) -> Vec<usize> {
    DepthScanner::new(text)
        .filter(|t| t.kind != TokenKind::Quoted && keyword_at(text, t.span.start, keyword))
        .map(|t| t.span.start)
        .collect()
}

/// True when `keyword` occurs outside quoted literals
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    DepthScanner::new(text)
        .any(|t| t.kind != TokenKind::Quoted && keyword_at(text, t.span.start, keyword))
}

/// First occurrence of `keyword` at top level, scanning from `from`
pub fn find_top_level_keyword(text: &str, keyword: &str, from: usize) -> Option<usize> {
    DepthScanner::from_offset(text, from)
        .find(|t| {
            t.before.is_top_level()
                && matches!(t.kind, TokenKind::Char(_))
                && keyword_at(text, t.span.start, keyword)
        })
        .map(|t| t.span.start)
}
