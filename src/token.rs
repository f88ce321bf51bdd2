use std::fmt;
use std::sync::Arc;

use crate::alignment::TextAlignment;

/// What a token matches once its leading gap has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Exact text. An empty literal is a filler that only carries a gap.
    Literal(String),
    /// A substring recognised by a configured identifier pattern.
    /// `text` is `None` once tokens with different captured texts were merged.
    Identifier {
        name: Arc<str>,
        pattern: Arc<str>,
        text: Option<String>,
        min_text_len: usize,
        max_text_len: usize,
    },
}

/// A pattern element: `[min_gap, max_gap]` arbitrary characters followed by
/// the token's text.
///
/// An open gap accepts any number of characters from `min_gap` up;
/// `max_gap` then only records the longest run observed so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    kind: TokenKind,
    min_gap: usize,
    max_gap: usize,
    open_gap: bool,
}

impl Token {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::with_gaps(TokenKind::Literal(text.into()), 0, 0)
    }

    pub fn literal_with_gaps(text: impl Into<String>, min_gap: usize, max_gap: usize) -> Self {
        Self::with_gaps(TokenKind::Literal(text.into()), min_gap, max_gap)
    }

    /// Empty trailing token standing for a run of unmatched characters.
    pub fn filler(min_gap: usize, max_gap: usize) -> Self {
        Self::literal_with_gaps(String::new(), min_gap, max_gap)
    }

    pub fn identifier(name: Arc<str>, pattern: Arc<str>, text: impl Into<String>) -> Self {
        let text = text.into();
        let len = text.chars().count();
        Self::with_gaps(
            TokenKind::Identifier { name, pattern, text: Some(text), min_text_len: len, max_text_len: len },
            0,
            0,
        )
    }

    fn with_gaps(kind: TokenKind, min_gap: usize, max_gap: usize) -> Self {
        debug_assert!(min_gap <= max_gap, "gap bounds out of order: {min_gap} > {max_gap}");
        Self { kind, min_gap, max_gap, open_gap: false }
    }

    pub fn kind(&self) -> &TokenKind {
        &self.kind
    }

    /// Literal text, or the captured identifier text (empty when generalized).
    pub fn text(&self) -> &str {
        match &self.kind {
            TokenKind::Literal(text) => text,
            TokenKind::Identifier { text, .. } => text.as_deref().unwrap_or(""),
        }
    }

    pub fn min_gap(&self) -> usize {
        self.min_gap
    }

    pub fn max_gap(&self) -> usize {
        self.max_gap
    }

    pub fn has_gap(&self) -> bool {
        self.max_gap > 0 || self.open_gap
    }

    pub fn has_open_gap(&self) -> bool {
        self.open_gap
    }

    pub fn min_text_len(&self) -> usize {
        match &self.kind {
            TokenKind::Literal(text) => text.chars().count(),
            TokenKind::Identifier { min_text_len, .. } => *min_text_len,
        }
    }

    pub fn max_text_len(&self) -> usize {
        match &self.kind {
            TokenKind::Literal(text) => text.chars().count(),
            TokenKind::Identifier { max_text_len, .. } => *max_text_len,
        }
    }

    pub fn min_len(&self) -> usize {
        self.min_text_len() + self.min_gap
    }

    pub fn max_len(&self) -> usize {
        self.max_text_len() + self.max_gap
    }

    /// An empty literal. Only valid as the last token of a cluster.
    pub fn is_filler(&self) -> bool {
        matches!(&self.kind, TokenKind::Literal(text) if text.is_empty())
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, TokenKind::Literal(_))
    }

    /// Shortest text the compiled token accepts. An identifier pattern may
    /// match shorter text than any it captured, so only its gap counts.
    pub fn accepted_min_len(&self) -> usize {
        match &self.kind {
            TokenKind::Literal(text) => self.min_gap + text.chars().count(),
            TokenKind::Identifier { .. } => self.min_gap,
        }
    }

    /// Whether [`Token::max_len`] bounds every text the token accepts.
    pub fn is_bounded(&self) -> bool {
        self.is_literal() && !self.open_gap
    }

    /// Same token with `[min, max]` more wildcard characters in front of it.
    pub fn with_extra_gap(mut self, min: usize, max: usize) -> Self {
        self.min_gap += min;
        self.max_gap += max;
        self
    }

    /// Same token, with its gap left open-ended when `open` is set.
    pub fn with_open_gap(mut self, open: bool) -> Self {
        self.open_gap |= open;
        self
    }

    /// Regex source matching this token, including its leading gap.
    pub fn to_pattern(&self) -> String {
        let body = match &self.kind {
            TokenKind::Literal(text) => regex::escape(text),
            TokenKind::Identifier { pattern, .. } => format!("(?:{pattern})"),
        };
        if self.open_gap {
            format!(".{{{},}}{}", self.min_gap, body)
        } else if self.has_gap() {
            format!(".{{{},{}}}{}", self.min_gap, self.max_gap, body)
        } else {
            body
        }
    }

    /// Similarity of this token to `other` if the pair is viable for merging
    /// at `min_similarity`.
    ///
    /// Literal pairs are pre-filtered by the cheap upper bounds before the
    /// exact ratio is computed. Identifiers are only compatible with
    /// identifiers of the same name.
    pub fn similarity(&self, other: &Token, alignment: &TextAlignment, min_similarity: f64) -> Option<f64> {
        match (&self.kind, &other.kind) {
            (TokenKind::Literal(_), TokenKind::Literal(_)) => {
                if alignment.real_quick_ratio() < min_similarity || alignment.quick_ratio() < min_similarity {
                    return None;
                }
                let ratio = alignment.ratio();
                (ratio >= min_similarity).then_some(ratio)
            }
            (TokenKind::Identifier { name: a, .. }, TokenKind::Identifier { name: b, .. }) if a == b => Some(1.0),
            _ => None,
        }
    }

    /// Merge two tokens into the token list that accepts both.
    ///
    /// `alignment` must be the alignment of `self.text()` against
    /// `other.text()`. Between two matched blocks the gap covers the
    /// characters skipped on either side; the first produced token also takes
    /// over the gap bounds of both inputs. Text left unmatched after the last
    /// block becomes a trailing filler.
    pub fn merge(&self, other: &Token, alignment: &TextAlignment) -> Vec<Token> {
        let min_gap = self.min_gap.min(other.min_gap);
        let max_gap = self.max_gap.max(other.max_gap);
        let open_gap = self.open_gap || other.open_gap;

        if let (
            TokenKind::Identifier { name, pattern, text: t1, min_text_len: min1, max_text_len: max1 },
            TokenKind::Identifier { name: other_name, text: t2, min_text_len: min2, max_text_len: max2, .. },
        ) = (&self.kind, &other.kind)
        {
            if name == other_name {
                let text = if t1 == t2 { t1.clone() } else { None };
                let kind = TokenKind::Identifier {
                    name: name.clone(),
                    pattern: pattern.clone(),
                    text,
                    min_text_len: (*min1).min(*min2),
                    max_text_len: (*max1).max(*max2),
                };
                return vec![Token::with_gaps(kind, min_gap, max_gap).with_open_gap(open_gap)];
            }
        }

        if self.kind == other.kind {
            return vec![Token::with_gaps(self.kind.clone(), min_gap, max_gap).with_open_gap(open_gap)];
        }

        let mut tokens: Vec<Token> = Vec::new();
        let (mut pos1, mut pos2) = (0, 0);
        for block in alignment.matching_blocks() {
            if block.size == 0 && block.a == pos1 && block.b == pos2 {
                continue;
            }
            let skip1 = block.a - pos1;
            let skip2 = block.b - pos2;
            let text = alignment.a_slice(block.a, block.a + block.size);
            let token = Token::literal_with_gaps(text, skip1.min(skip2), skip1.max(skip2));
            if tokens.is_empty() {
                tokens.push(token.with_extra_gap(min_gap, max_gap).with_open_gap(open_gap));
            } else {
                tokens.push(token);
            }
            pos1 = block.a + block.size;
            pos2 = block.b + block.size;
        }
        tokens
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Literal(text) => f.write_str(text),
            TokenKind::Identifier { name, min_text_len, max_text_len, .. } => {
                write!(f, "<{name}:{min_text_len}-{max_text_len}>")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge(t1: &Token, t2: &Token) -> Vec<Token> {
        t1.merge(t2, &TextAlignment::new(t1.text(), t2.text()))
    }

    #[test]
    fn lengths_include_gaps() {
        let t = Token::literal_with_gaps("abc", 5, 10);
        assert_eq!(t.min_len(), 8);
        assert_eq!(t.max_len(), 13);
    }

    #[test]
    fn identical_tokens_merge_into_one() {
        let t = merge(&Token::literal_with_gaps("abc", 5, 10), &Token::literal_with_gaps("abc", 7, 13));
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].text(), "abc");
        assert_eq!(t[0].min_len(), 8);
        assert_eq!(t[0].max_len(), 16);
    }

    #[test]
    fn different_endings_leave_trailing_filler() {
        let t = merge(&Token::literal_with_gaps("abc def", 5, 10), &Token::literal_with_gaps("abc ghi", 7, 13));
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].text(), "abc ");
        assert_eq!(t[0].min_len(), 9);
        assert_eq!(t[0].max_len(), 17);
        assert!(t[1].is_filler());
        assert_eq!(t[1].min_len(), 3);
        assert_eq!(t[1].max_len(), 3);
    }

    #[test]
    fn different_beginnings_widen_first_gap() {
        let t = merge(&Token::literal_with_gaps("def abc", 5, 10), &Token::literal_with_gaps("ghi abc", 7, 13));
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].text(), " abc");
        assert_eq!(t[0].min_len(), 12);
        assert_eq!(t[0].max_len(), 20);
    }

    #[test]
    fn gap_between_blocks_spans_both_skips() {
        let t = merge(&Token::literal("abc def ghi"), &Token::literal("abc xxx 123 123 ghi"));
        assert_eq!(t.len(), 2);
        assert_eq!((t[0].text(), t[0].min_gap(), t[0].max_gap()), ("abc ", 0, 0));
        assert_eq!((t[1].text(), t[1].min_gap(), t[1].max_gap()), (" ghi", 3, 11));
    }

    #[test]
    fn pattern_escapes_text_and_bounds_gap() {
        assert_eq!(Token::literal("a.b").to_pattern(), r"a\.b");
        assert_eq!(Token::literal_with_gaps("$x", 1, 4).to_pattern(), r".{1,4}\$x");
        assert_eq!(Token::filler(0, 3).to_pattern(), ".{0,3}");
    }

    #[test]
    fn similarity_rejects_below_floor() {
        let t1 = Token::literal("abc");
        let t2 = Token::literal("def");
        let al = TextAlignment::new(t1.text(), t2.text());
        assert_eq!(t1.similarity(&t2, &al, 0.5), None);

        let t3 = Token::literal("abd");
        let al = TextAlignment::new(t1.text(), t3.text());
        let ratio = t1.similarity(&t3, &al, 0.5).expect("similar enough");
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn identifiers_merge_by_name() {
        let name: Arc<str> = Arc::from("IP");
        let pattern: Arc<str> = Arc::from(r"\d+\.\d+\.\d+\.\d+");
        let t1 = Token::identifier(name.clone(), pattern.clone(), "10.0.0.1");
        let t2 = Token::identifier(name, pattern, "192.168.1.10");
        let al = TextAlignment::new(t1.text(), t2.text());
        assert_eq!(t1.similarity(&t2, &al, 0.9), Some(1.0));

        let merged = t1.merge(&t2, &al);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].to_string(), "<IP:8-12>");
        assert_eq!(merged[0].to_pattern(), r"(?:\d+\.\d+\.\d+\.\d+)");

        let literal = Token::literal("10.0.0.1");
        let al = TextAlignment::new(t1.text(), literal.text());
        assert_eq!(t1.similarity(&literal, &al, 0.1), None);
    }

    #[test]
    fn captured_identifier_displays_as_placeholder() {
        let t = Token::identifier(Arc::from("NUM"), Arc::from("[0-9]+"), "1234");
        assert_eq!(t.text(), "1234");
        assert_eq!(t.to_string(), "<NUM:4-4>");
        assert_eq!(t.accepted_min_len(), 0);
        assert!(!t.is_bounded());
    }

    #[test]
    fn open_gap_has_no_upper_bound() {
        let t = Token::literal_with_gaps("end", 2, 5).with_open_gap(true);
        assert!(t.has_gap());
        assert!(!t.is_bounded());
        assert_eq!(t.to_pattern(), ".{2,}end");
        assert_eq!(t.accepted_min_len(), 5);

        let merged = merge(&t, &Token::literal("end"));
        assert_eq!(merged.len(), 1);
        assert!(merged[0].has_open_gap());
        assert_eq!(merged[0].to_pattern(), ".{0,}end");
    }
}
