//! Token stream produced by the upstream tokenizer.
//!
//! Tokens are immutable inputs. The linker never splits, merges or retags
//! them; it only decides which of them may take part in a mention.

use serde::{Deserialize, Serialize};

use crate::error::{LinkError, Result};

/// Half-open character span `[start, end)`, serialized as a two-element array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest span covering both.
    pub fn cover(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl From<(usize, usize)> for Span {
    fn from((start, end): (usize, usize)) -> Self {
        Span::new(start, end)
    }
}

impl From<Span> for (usize, usize) {
    fn from(span: Span) -> Self {
        (span.start, span.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Word,
    Number,
    Unit,
    Punct,
    Pair,
}

impl TokenKind {
    /// Only word tokens may become (part of) a mention.
    pub fn is_linkable(self) -> bool {
        matches!(self, TokenKind::Word)
    }

    /// Numbers, units and pairs. Carried into bundles as raw text, never linked.
    pub fn is_measurement(self) -> bool {
        matches!(self, TokenKind::Number | TokenKind::Unit | TokenKind::Pair)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Word => "word",
            TokenKind::Number => "number",
            TokenKind::Unit => "unit",
            TokenKind::Punct => "punct",
            TokenKind::Pair => "pair",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    He,
    En,
    Digit,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub idx: usize,
    pub text: String,
    pub kind: TokenKind,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_surface: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

impl Token {
    pub fn word(idx: usize, text: &str, start: usize) -> Self {
        Self::new(idx, text, TokenKind::Word, start)
    }

    pub fn new(idx: usize, text: &str, kind: TokenKind, start: usize) -> Self {
        Self {
            idx,
            text: text.to_string(),
            kind,
            span: Span::new(start, start + text.chars().count()),
            script: None,
            normalized_surface: None,
            hints: Vec::new(),
        }
    }

    pub fn is_linkable(&self) -> bool {
        self.kind.is_linkable()
    }

    /// Text used for matching: the upstream normalized form when provided.
    pub fn match_text(&self) -> &str {
        self.normalized_surface.as_deref().unwrap_or(&self.text)
    }
}

/// One input line: an identifier plus its token stream.
///
/// Accepts both the flat shape `{line_id, tokens}` and the tokenizer's
/// nested shape `{id, raw, t1: {tokens}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLineRecord")]
pub struct LineRecord {
    pub line_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    pub tokens: Vec<Token>,
    /// Canonical English terms proposed upstream, used verbatim as vector queries.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub canonical_terms: Vec<String>,
}

impl LineRecord {
    pub fn new(line_id: impl Into<String>, tokens: Vec<Token>) -> Self {
        Self {
            line_id: line_id.into(),
            raw: None,
            tokens,
            canonical_terms: Vec::new(),
        }
    }

    /// Build a record by splitting `text` on whitespace and tagging each piece.
    ///
    /// Intended for tests and ad-hoc runs; real input comes pre-tokenized.
    pub fn from_tagged(line_id: impl Into<String>, pieces: &[(&str, TokenKind)]) -> Self {
        let mut pos = 0;
        let mut tokens = Vec::with_capacity(pieces.len());
        for (idx, (text, kind)) in pieces.iter().enumerate() {
            let token = Token::new(idx, text, *kind, pos);
            pos = token.span.end + 1;
            tokens.push(token);
        }
        let raw = pieces.iter().map(|(t, _)| *t).collect::<Vec<_>>().join(" ");
        Self {
            raw: Some(raw),
            ..Self::new(line_id, tokens)
        }
    }

    /// Check the tokenizer contract: sequential indices and ordered, non-overlapping spans.
    pub fn validate(&self) -> Result<()> {
        let mut prev_end = 0usize;
        for (pos, token) in self.tokens.iter().enumerate() {
            if token.idx != pos {
                return Err(LinkError::validation(
                    &self.line_id,
                    format!("token at position {pos} has idx {}", token.idx),
                ));
            }
            if token.text.is_empty() {
                return Err(LinkError::validation(
                    &self.line_id,
                    format!("token {pos} has empty text"),
                ));
            }
            if token.span.start > token.span.end {
                return Err(LinkError::validation(
                    &self.line_id,
                    format!("token {pos} has inverted span {:?}", token.span),
                ));
            }
            if pos > 0 && token.span.start < prev_end {
                return Err(LinkError::validation(
                    &self.line_id,
                    format!("token {pos} overlaps its predecessor"),
                ));
            }
            prev_end = token.span.end;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLineId {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
struct RawT1 {
    tokens: Vec<Token>,
}

#[derive(Deserialize)]
struct RawLineRecord {
    #[serde(alias = "id")]
    line_id: Option<RawLineId>,
    #[serde(default)]
    raw: Option<String>,
    #[serde(default)]
    tokens: Option<Vec<Token>>,
    #[serde(default)]
    t1: Option<RawT1>,
    #[serde(default)]
    canonical_terms: Vec<String>,
}

impl TryFrom<RawLineRecord> for LineRecord {
    type Error = String;

    fn try_from(raw: RawLineRecord) -> std::result::Result<Self, Self::Error> {
        let line_id = match raw.line_id {
            Some(RawLineId::Number(n)) => n.to_string(),
            Some(RawLineId::Text(s)) => s,
            None => return Err("record has no line_id/id".to_string()),
        };
        let tokens = raw
            .tokens
            .or_else(|| raw.t1.map(|t1| t1.tokens))
            .ok_or_else(|| format!("line {line_id} has no tokens"))?;
        Ok(Self {
            line_id,
            raw: raw.raw,
            tokens,
            canonical_terms: raw.canonical_terms,
        })
    }
}
