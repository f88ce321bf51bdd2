use std::collections::hash_map::Entry;

use ahash::AHashMap;

use crate::alignment::TextAlignment;
use crate::cluster::{Cluster, ClusterError, ClusterId};
use crate::merge_sequence::MergeSequence;
use crate::token::Token;

/// Alignments between the tokens of one cluster pair, keyed by
/// `(index in left cluster, index in right cluster)`.
///
/// Keys are ordered: `(i, j)` and `(j, i)` name different token pairs.
#[derive(Debug, Default)]
pub struct SimilarityCache {
    alignments: AHashMap<(usize, usize), TextAlignment>,
}

impl SimilarityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alignment of `token1` (left index `i`) against `token2` (right index
    /// `j`), computed on first request.
    pub fn get(&mut self, i: usize, j: usize, token1: &Token, token2: &Token) -> &TextAlignment {
        self.alignments
            .entry((i, j))
            .or_insert_with(|| TextAlignment::new(token1.text(), token2.text()))
    }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        self.alignments.contains_key(&(i, j))
    }

    pub fn len(&self) -> usize {
        self.alignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alignments.is_empty()
    }
}

/// Unordered cluster pair, stored with the lower id first. The lower id is
/// always the left side of the cached sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ClusterPair(ClusterId, ClusterId);

impl ClusterPair {
    fn new(a: ClusterId, b: ClusterId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    fn contains(&self, id: ClusterId) -> bool {
        self.0 == id || self.1 == id
    }
}

/// Best merge sequence per cluster pair, together with the similarity cache
/// used to find it.
///
/// Entries are only valid while both clusters are in the working set; call
/// [`MergeSequenceCache::remove_cluster`] as soon as one leaves it.
#[derive(Debug)]
pub struct MergeSequenceCache {
    min_similarity: f64,
    sequences: AHashMap<ClusterPair, Option<MergeSequence>>,
    similarities: AHashMap<ClusterPair, SimilarityCache>,
}

impl MergeSequenceCache {
    pub fn new(min_similarity: f64) -> Self {
        Self {
            min_similarity,
            sequences: AHashMap::new(),
            similarities: AHashMap::new(),
        }
    }

    pub fn min_similarity(&self) -> f64 {
        self.min_similarity
    }

    /// Best merge sequence between `c1` and `c2` in either argument order.
    /// The returned sequence is oriented from the lower cluster id to the
    /// higher one.
    pub fn get_merge_sequence(&mut self, c1: &Cluster, c2: &Cluster) -> Option<&MergeSequence> {
        let key = ClusterPair::new(c1.id(), c2.id());
        match self.sequences.entry(key) {
            Entry::Occupied(entry) => entry.into_mut().as_ref(),
            Entry::Vacant(entry) => {
                let (left, right) = orient(key, c1, c2);
                let similarity = self.similarities.entry(key).or_default();
                let seq = left.construct_merge_sequence(right, self.min_similarity, similarity);
                entry.insert(seq).as_ref()
            }
        }
    }

    /// Similarity cache of the pair, created empty on first request.
    pub fn similarity_cache(&mut self, c1: &Cluster, c2: &Cluster) -> &mut SimilarityCache {
        self.similarities.entry(ClusterPair::new(c1.id(), c2.id())).or_default()
    }

    /// Materialize the cached merge of `c1` and `c2`, or `None` if the pair
    /// has no viable alignment.
    pub fn merge_clusters(&mut self, c1: &Cluster, c2: &Cluster) -> Result<Option<Cluster>, ClusterError> {
        if self.get_merge_sequence(c1, c2).is_none() {
            return Ok(None);
        }
        let key = ClusterPair::new(c1.id(), c2.id());
        let Some(Some(seq)) = self.sequences.get(&key) else {
            return Ok(None);
        };
        let (left, right) = orient(key, c1, c2);
        let similarity = self.similarities.entry(key).or_default();
        Cluster::from_merge_sequence(seq, left, right, similarity).map(Some)
    }

    /// Drop every entry of both tables that involves cluster `id`.
    pub fn remove_cluster(&mut self, id: ClusterId) {
        self.sequences.retain(|pair, _| !pair.contains(id));
        self.similarities.retain(|pair, _| !pair.contains(id));
    }

    /// Number of cached cluster pairs.
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty() && self.similarities.is_empty()
    }

    pub fn contains_pair(&self, a: ClusterId, b: ClusterId) -> bool {
        self.sequences.contains_key(&ClusterPair::new(a, b))
    }
}

fn orient<'a>(key: ClusterPair, c1: &'a Cluster, c2: &'a Cluster) -> (&'a Cluster, &'a Cluster) {
    if c1.id() == key.0 {
        (c1, c2)
    } else {
        (c2, c1)
    }
}
