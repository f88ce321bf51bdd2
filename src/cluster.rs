use std::fmt::{self, Write as _};
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::cache::SimilarityCache;
use crate::merge_sequence::MergeSequence;
use crate::token::{Token, TokenKind};

// Large gap bounds expand into big automata; the default limit is too tight.
const MATCHER_SIZE_LIMIT: usize = 64 << 20;

static NEXT_CLUSTER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster pattern does not compile: {0}")]
    Pattern(#[from] regex::Error),
    #[error("merge sequence {sequence} does not align clusters {left} and {right}")]
    SequenceMismatch {
        sequence: String,
        left: ClusterId,
        right: ClusterId,
    },
}

/// Process-unique cluster identity. Never reused, so cache entries keyed by a
/// removed cluster can not be mistaken for a later cluster with equal content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(u64);

impl ClusterId {
    pub fn next() -> Self {
        Self(NEXT_CLUSTER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A generalized line pattern: tokens plus the anchored matcher compiled
/// from them.
#[derive(Debug, Clone)]
pub struct Cluster {
    id: ClusterId,
    tokens: Vec<Token>,
    matcher: Regex,
    min_len: usize,
    max_len: usize,
    last_seen_line: u64,
    match_count: u64,
}

impl Cluster {
    /// Pure literal cluster accepting exactly `line`.
    pub fn from_line(line: &str) -> Result<Self, ClusterError> {
        Self::from_tokens(vec![Token::literal(line)])
    }

    /// Build a cluster from tokens. Empty fillers in the middle are folded
    /// into the gap of the following token.
    pub fn from_tokens(tokens: Vec<Token>) -> Result<Self, ClusterError> {
        let tokens = fold_fillers(tokens);
        let matcher = compile(&tokens)?;
        Ok(Self {
            id: ClusterId::next(),
            min_len: tokens.iter().map(Token::min_len).sum(),
            max_len: tokens.iter().map(Token::max_len).sum(),
            tokens,
            matcher,
            last_seen_line: 0,
            match_count: 0,
        })
    }

    /// Materialize a merge sequence found by
    /// [`Cluster::construct_merge_sequence`] on `left` against `right`.
    ///
    /// `cache` must be the similarity cache the sequence was built with, or a
    /// fresh one for the same cluster pair.
    pub fn from_merge_sequence(
        seq: &MergeSequence,
        left: &Cluster,
        right: &Cluster,
        cache: &mut SimilarityCache,
    ) -> Result<Self, ClusterError> {
        if seq.left() != left.id || seq.right() != right.id {
            return Err(ClusterError::SequenceMismatch {
                sequence: seq.to_string(),
                left: left.id,
                right: right.id,
            });
        }

        let mut tokens = Vec::new();
        for step in seq.ordered_steps() {
            match step.pair {
                Some((i, j)) => {
                    let (t1, t2) = (&left.tokens[i], &right.tokens[j]);
                    let merged = t1.merge(t2, cache.get(i, j, t1, t2));
                    for (n, token) in merged.into_iter().enumerate() {
                        if n == 0 {
                            tokens.push(token.with_extra_gap(step.min_gap, step.max_gap).with_open_gap(step.open_gap));
                        } else {
                            tokens.push(token);
                        }
                    }
                }
                None => tokens.push(Token::filler(step.min_gap, step.max_gap).with_open_gap(step.open_gap)),
            }
        }
        Self::from_tokens(tokens)
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn last_seen_line(&self) -> u64 {
        self.last_seen_line
    }

    pub fn match_count(&self) -> u64 {
        self.match_count
    }

    /// Source of the compiled matcher, anchored to a whole line.
    pub fn pattern(&self) -> &str {
        self.matcher.as_str()
    }

    pub fn matches_line(&self, line: &str) -> bool {
        self.matcher.is_match(line)
    }

    pub fn record_match(&mut self, line_number: u64) {
        self.match_count += 1;
        self.last_seen_line = self.last_seen_line.max(line_number);
    }

    /// Take over the statistics of a cluster this one replaces.
    pub fn absorb(&mut self, other: &Cluster) {
        self.match_count += other.match_count;
        self.last_seen_line = self.last_seen_line.max(other.last_seen_line);
    }

    /// Whether this cluster accepts exactly one line.
    pub fn is_literal(&self) -> bool {
        self.literal_text().is_some()
    }

    pub fn literal_text(&self) -> Option<&str> {
        match self.tokens.as_slice() {
            [token] if token.is_literal() && !token.has_gap() => Some(token.text()),
            _ => None,
        }
    }

    /// A line built from the tokens' own text, if the cluster has no gaps
    /// and every identifier still holds the text it captured.
    pub fn sample_line(&self) -> Option<String> {
        let mut line = String::new();
        for token in &self.tokens {
            if token.has_gap() {
                return None;
            }
            match token.kind() {
                TokenKind::Literal(text) => line.push_str(text),
                TokenKind::Identifier { text: Some(text), .. } => line.push_str(text),
                TokenKind::Identifier { text: None, .. } => return None,
            }
        }
        Some(line)
    }

    /// Human readable form: literal text with `marker{min},{max}marker` in
    /// place of each wildcard gap (`marker{min},marker` when open-ended) and
    /// `<NAME:min-max>` for identifiers.
    pub fn to_text(&self, gap_marker: &str) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            if token.has_open_gap() {
                let _ = write!(out, "{gap_marker}{},{gap_marker}", token.min_gap());
            } else if token.has_gap() {
                let _ = write!(out, "{gap_marker}{},{}{gap_marker}", token.min_gap(), token.max_gap());
            }
            let _ = write!(out, "{token}");
        }
        out
    }

    /// Search the alignment of this cluster's tokens against `other`'s with
    /// the highest precision.
    ///
    /// Every viable token pair (similarity at least `min_similarity`) opens a
    /// branch; a branch that can not be extended any further is closed with a
    /// filler covering the tokens left on both sides. Among equally precise
    /// candidates the first one found wins. A closed branch is scored with
    /// its terminal filler included. Returns `None` when no token pair is
    /// viable.
    pub fn construct_merge_sequence(
        &self,
        other: &Cluster,
        min_similarity: f64,
        cache: &mut SimilarityCache,
    ) -> Option<MergeSequence> {
        let (n1, n2) = (self.tokens.len(), other.tokens.len());
        let mut work = vec![(0, 0, MergeSequence::new(self.id, other.id))];
        // Branches continuing from the same position gain the same amounts, so
        // a branch with less weight and a wider length spread can never win.
        let mut expanded: AHashMap<(usize, usize), Vec<(f64, usize)>> = AHashMap::new();
        let mut best: Option<MergeSequence> = None;
        let mut best_precision = f64::NEG_INFINITY;
        let mut states = 0usize;

        while let Some((start_i, start_j, seq)) = work.pop() {
            let spread = seq.min_len() + seq.max_len();
            let seen = expanded.entry((start_i, start_j)).or_default();
            if seen.iter().any(|&(weight, s)| weight >= seq.weight() && s <= spread) {
                continue;
            }
            seen.push((seq.weight(), spread));
            states += 1;

            let mut branched = false;
            for i in start_i..n1 {
                let t1 = &self.tokens[i];
                if t1.is_filler() {
                    continue;
                }
                for j in start_j..n2 {
                    let t2 = &other.tokens[j];
                    if t2.is_filler() {
                        continue;
                    }
                    let Some(ratio) = t1.similarity(t2, cache.get(i, j, t1, t2), min_similarity) else {
                        continue;
                    };
                    branched = true;

                    let (min_gap, max_gap, open) = gap_between(&self.tokens[start_i..i], &other.tokens[start_j..j]);
                    let weight = ratio * (t1.min_text_len() + t2.min_text_len()) as f64 / 2.0;
                    let next = seq
                        .extended(
                            Some((i, j)),
                            min_gap,
                            max_gap,
                            weight,
                            t1.min_len().min(t2.min_len()),
                            t1.max_len().max(t2.max_len()),
                        )
                        .open_last_gap(open);
                    if i + 1 < n1 || j + 1 < n2 {
                        work.push((i + 1, j + 1, next));
                    } else if next.precision() > best_precision {
                        best_precision = next.precision();
                        best = Some(next);
                    }
                }
            }

            if branched || seq.is_empty() {
                continue;
            }
            let finished = if start_i < n1 || start_j < n2 {
                let (min_gap, max_gap, open) = gap_between(&self.tokens[start_i..], &other.tokens[start_j..]);
                seq.extended(None, min_gap, max_gap, 0.0, 0, 0).open_last_gap(open)
            } else {
                seq
            };
            if finished.precision() > best_precision {
                best_precision = finished.precision();
                best = Some(finished);
            }
        }

        tracing::trace!(
            left = %self.id,
            right = %other.id,
            states,
            precision = best.as_ref().map(MergeSequence::precision),
            "merge sequence search finished"
        );
        best
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pattern())
    }
}

/// Gap bounds covering the skipped tokens of both sides. The gap is open
/// when a skipped token can accept text of any length.
fn gap_between(skipped1: &[Token], skipped2: &[Token]) -> (usize, usize, bool) {
    let min1: usize = skipped1.iter().map(Token::accepted_min_len).sum();
    let max1: usize = skipped1.iter().map(Token::max_len).sum();
    let min2: usize = skipped2.iter().map(Token::accepted_min_len).sum();
    let max2: usize = skipped2.iter().map(Token::max_len).sum();
    let open = skipped1.iter().chain(skipped2).any(|t| !t.is_bounded());
    (min1.min(min2), max1.max(max2), open)
}

fn fold_fillers(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    let (mut carry_min, mut carry_max, mut carry_open) = (0, 0, false);
    for token in tokens {
        if token.is_filler() {
            carry_min += token.min_gap();
            carry_max += token.max_gap();
            carry_open |= token.has_open_gap();
            continue;
        }
        out.push(token.with_extra_gap(carry_min, carry_max).with_open_gap(carry_open));
        carry_min = 0;
        carry_max = 0;
        carry_open = false;
    }
    if carry_max > 0 || carry_open || out.is_empty() {
        out.push(Token::filler(carry_min, carry_max).with_open_gap(carry_open));
    }
    out
}

fn compile(tokens: &[Token]) -> Result<Regex, regex::Error> {
    let mut source = String::from("^");
    for token in tokens {
        source.push_str(&token.to_pattern());
    }
    source.push('$');
    RegexBuilder::new(&source)
        .dot_matches_new_line(true)
        .size_limit(MATCHER_SIZE_LIMIT)
        .build()
}
