use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::MergeSequenceCache;
use crate::cluster::{Cluster, ClusterError, ClusterId};
use crate::config::{AnalyzerConfig, ConfigError};
use crate::identifiers::Identifiers;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("invalid analyzer configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Serializable view of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub pattern: String,
    pub text: String,
    pub match_count: u64,
    pub last_seen_line: u64,
    pub min_len: usize,
    pub max_len: usize,
}

/// Online clustering of a line stream into a bounded set of clusters.
///
/// Every non-empty line either matches an existing cluster or becomes a new
/// one. Above the soft limit the most precise pairwise merge is applied if it
/// reaches the minimum precision; otherwise, above the hard limit, the
/// cluster matched least recently is evicted.
#[derive(Debug)]
pub struct Analyzer {
    config: AnalyzerConfig,
    identifiers: Identifiers,
    clusters: Vec<Cluster>,
    cache: MergeSequenceCache,
    line_counter: u64,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self, ConfigError> {
        Self::with_identifiers(config, Identifiers::default())
    }

    /// Analyzer that recognises `identifiers` as single tokens in new lines.
    pub fn with_identifiers(config: AnalyzerConfig, identifiers: Identifiers) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cache: MergeSequenceCache::new(config.min_similarity),
            config,
            identifiers,
            clusters: Vec::new(),
            line_counter: 0,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Working set in insertion order; merged clusters are appended.
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Number of non-empty lines analyzed so far.
    pub fn lines_seen(&self) -> u64 {
        self.line_counter
    }

    pub fn cache(&self) -> &MergeSequenceCache {
        &self.cache
    }

    /// Feed one line (without its terminator).
    ///
    /// Returns the cluster that accepts the line afterwards, or `None` for an
    /// empty line, which is ignored.
    pub fn analyze_line(&mut self, line: &str) -> Result<Option<ClusterId>, AnalyzerError> {
        if line.is_empty() {
            return Ok(None);
        }
        self.line_counter += 1;
        let line_number = self.line_counter;

        if let Some(cluster) = self.clusters.iter_mut().find(|c| c.matches_line(line)) {
            cluster.record_match(line_number);
            return Ok(Some(cluster.id()));
        }

        let mut cluster = if self.identifiers.is_empty() {
            Cluster::from_line(line)?
        } else {
            Cluster::from_tokens(self.identifiers.tokenize(line))?
        };
        cluster.record_match(line_number);
        let id = cluster.id();
        self.clusters.push(cluster);

        if self.clusters.len() > self.config.soft_limit {
            self.rebalance();
        }

        let owner = self
            .clusters
            .iter()
            .find(|c| c.id() == id)
            .or_else(|| self.clusters.iter().find(|c| c.matches_line(line)))
            .map(Cluster::id);
        Ok(owner)
    }

    /// Summaries of the working set, in working-set order.
    pub fn summaries(&self, gap_marker: &str) -> Vec<ClusterSummary> {
        self.clusters
            .iter()
            .map(|c| ClusterSummary {
                pattern: c.pattern().to_string(),
                text: c.to_text(gap_marker),
                match_count: c.match_count(),
                last_seen_line: c.last_seen_line(),
                min_len: c.min_len(),
                max_len: c.max_len(),
            })
            .collect()
    }

    fn rebalance(&mut self) {
        if let Some((i, j, precision)) = self.best_pair() {
            if precision >= self.config.min_precision {
                match self.merge_pair(i, j) {
                    Ok(true) => return,
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "abandoning merge"),
                }
            }
        }
        if self.clusters.len() > self.config.hard_limit {
            self.evict_oldest();
        }
    }

    /// Pair of working-set indices with the most precise merge sequence.
    /// Ties keep the pair met first in `(i, j)`, `i < j` order.
    fn best_pair(&mut self) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (i, j) in (0..self.clusters.len()).tuple_combinations() {
            let Some(seq) = self.cache.get_merge_sequence(&self.clusters[i], &self.clusters[j]) else {
                continue;
            };
            let precision = seq.precision();
            if best.map_or(true, |(_, _, p)| precision > p) {
                best = Some((i, j, precision));
            }
        }
        best
    }

    /// Replace clusters `i` and `j` by their merge, then absorb every
    /// gap-free cluster whose own line the merged cluster accepts.
    fn merge_pair(&mut self, i: usize, j: usize) -> Result<bool, ClusterError> {
        let Some(mut merged) = self.cache.merge_clusters(&self.clusters[i], &self.clusters[j])? else {
            return Ok(false);
        };

        // j > i, so removing j first keeps i valid
        let second = self.clusters.remove(j);
        let first = self.clusters.remove(i);
        merged.absorb(&first);
        merged.absorb(&second);
        self.cache.remove_cluster(first.id());
        self.cache.remove_cluster(second.id());

        let mut absorbed = Vec::new();
        self.clusters.retain(|c| {
            let covered = c.sample_line().is_some_and(|line| merged.matches_line(&line));
            if covered {
                merged.absorb(c);
                absorbed.push(c.id());
            }
            !covered
        });
        for id in &absorbed {
            self.cache.remove_cluster(*id);
        }

        debug!(
            first = %first.id(),
            second = %second.id(),
            merged = %merged.id(),
            absorbed = absorbed.len(),
            pattern = merged.pattern(),
            "merged clusters"
        );
        self.clusters.push(merged);
        Ok(true)
    }

    fn evict_oldest(&mut self) {
        let Some((idx, _)) = self.clusters.iter().enumerate().min_by_key(|(_, c)| c.last_seen_line()) else {
            return;
        };
        let evicted = self.clusters.remove(idx);
        self.cache.remove_cluster(evicted.id());
        debug!(
            cluster = %evicted.id(),
            last_seen_line = evicted.last_seen_line(),
            pattern = evicted.pattern(),
            "evicted cluster"
        );
    }
}
