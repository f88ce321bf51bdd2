//! Character-level alignment between two strings.
//!
//! Lengths and positions are counted in Unicode scalar values so that gap
//! arithmetic in [`crate::token`] agrees with the `.` wildcard of the compiled
//! matcher.

use ahash::AHashMap;
use once_cell::unsync::OnceCell;

/// A run of `size` equal characters starting at `a` in the first text and at
/// `b` in the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchingBlock {
    pub a: usize,
    pub b: usize,
    pub size: usize,
}

/// Alignment of two texts by recursive longest-common-block matching.
///
/// The block decomposition is computed lazily: the two cheap ratios are
/// upper bounds of [`TextAlignment::ratio`] and are meant to reject
/// dissimilar pairs before the quadratic work happens.
#[derive(Debug)]
pub struct TextAlignment {
    a: Vec<char>,
    b: Vec<char>,
    blocks: OnceCell<Vec<MatchingBlock>>,
}

impl TextAlignment {
    pub fn new(a: &str, b: &str) -> Self {
        Self {
            a: a.chars().collect(),
            b: b.chars().collect(),
            blocks: OnceCell::new(),
        }
    }

    pub fn a_len(&self) -> usize {
        self.a.len()
    }

    pub fn b_len(&self) -> usize {
        self.b.len()
    }

    /// Characters `range` of the first text, as a string.
    pub fn a_slice(&self, start: usize, end: usize) -> String {
        self.a[start..end].iter().collect()
    }

    /// Upper bound computed from lengths only.
    pub fn real_quick_ratio(&self) -> f64 {
        let (la, lb) = (self.a.len(), self.b.len());
        calculate_ratio(la.min(lb), la + lb)
    }

    /// Upper bound computed from the character multisets, ignoring order.
    pub fn quick_ratio(&self) -> f64 {
        let mut avail: AHashMap<char, isize> = AHashMap::with_capacity(self.b.len());
        for &c in &self.b {
            *avail.entry(c).or_insert(0) += 1;
        }
        let mut matches = 0;
        for c in &self.a {
            let n = avail.entry(*c).or_insert(0);
            if *n > 0 {
                matches += 1;
            }
            *n -= 1;
        }
        calculate_ratio(matches, self.a.len() + self.b.len())
    }

    /// Exact similarity `2*M/T`, where `M` is the number of matched characters
    /// and `T` the total length of both texts. Two empty texts are identical.
    pub fn ratio(&self) -> f64 {
        let matches: usize = self.matching_blocks().iter().map(|m| m.size).sum();
        calculate_ratio(matches, self.a.len() + self.b.len())
    }

    /// Non-overlapping common blocks ordered by position, adjacent blocks
    /// coalesced. The last entry is always the empty sentinel
    /// `(a_len, b_len, 0)`.
    pub fn matching_blocks(&self) -> &[MatchingBlock] {
        self.blocks.get_or_init(|| self.compute_blocks())
    }

    fn compute_blocks(&self) -> Vec<MatchingBlock> {
        let mut b2j: AHashMap<char, Vec<usize>> = AHashMap::new();
        for (j, &c) in self.b.iter().enumerate() {
            b2j.entry(c).or_default().push(j);
        }

        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut found = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(&b2j, alo, ahi, blo, bhi);
            if m.size == 0 {
                continue;
            }
            if alo < m.a && blo < m.b {
                queue.push((alo, m.a, blo, m.b));
            }
            if m.a + m.size < ahi && m.b + m.size < bhi {
                queue.push((m.a + m.size, ahi, m.b + m.size, bhi));
            }
            found.push(m);
        }
        found.sort();

        let mut blocks: Vec<MatchingBlock> = Vec::with_capacity(found.len() + 1);
        for m in found {
            match blocks.last_mut() {
                Some(last) if last.a + last.size == m.a && last.b + last.size == m.b => {
                    last.size += m.size;
                }
                _ => blocks.push(m),
            }
        }
        blocks.push(MatchingBlock { a: la, b: lb, size: 0 });
        blocks
    }

    /// Longest block in `a[alo..ahi]` x `b[blo..bhi]`; among equally long
    /// blocks the one starting earliest in `a`, then earliest in `b`.
    fn find_longest_match(
        &self,
        b2j: &AHashMap<char, Vec<usize>>,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> MatchingBlock {
        let mut best = MatchingBlock { a: alo, b: blo, size: 0 };
        // j -> length of the block ending at (i - 1, j)
        let mut j2len: AHashMap<usize, usize> = AHashMap::new();
        for i in alo..ahi {
            let mut next: AHashMap<usize, usize> = AHashMap::new();
            if let Some(positions) = b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let prev = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0);
                    let k = prev + 1;
                    next.insert(j, k);
                    if k > best.size {
                        best = MatchingBlock { a: i + 1 - k, b: j + 1 - k, size: k };
                    }
                }
            }
            j2len = next;
        }
        best
    }
}

fn calculate_ratio(matches: usize, length: usize) -> f64 {
    if length == 0 {
        return 1.0;
    }
    2.0 * matches as f64 / length as f64
}
