use std::fmt;

use crate::cluster::ClusterId;

/// One aligned token pair of a [`MergeSequence`], with the gap accumulated
/// from tokens skipped on either side since the previous step.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeStep {
    /// Token indices in the left and right cluster; `None` for a terminal
    /// filler covering everything left unmatched.
    pub pair: Option<(usize, usize)>,
    pub min_gap: usize,
    pub max_gap: usize,
    /// The skipped tokens include one of unbounded length.
    pub open_gap: bool,
    pub step_weight: f64,
    pub weight: f64,
    pub min_len: usize,
    pub max_len: usize,
}

impl MergeStep {
    /// Running precision up to and including this step.
    pub fn precision(&self) -> f64 {
        precision(self.weight, self.min_len, self.max_len)
    }
}

/// A candidate token-by-token alignment between two clusters.
///
/// Steps are only ever appended; extending a sequence produces a new value
/// so branches of the alignment search never observe each other.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeSequence {
    left: ClusterId,
    right: ClusterId,
    steps: Vec<MergeStep>,
}

impl MergeSequence {
    pub fn new(left: ClusterId, right: ClusterId) -> Self {
        Self { left, right, steps: Vec::new() }
    }

    pub fn left(&self) -> ClusterId {
        self.left
    }

    pub fn right(&self) -> ClusterId {
        self.right
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn weight(&self) -> f64 {
        self.steps.last().map_or(0.0, |s| s.weight)
    }

    pub fn min_len(&self) -> usize {
        self.steps.last().map_or(0, |s| s.min_len)
    }

    pub fn max_len(&self) -> usize {
        self.steps.last().map_or(0, |s| s.max_len)
    }

    /// Expected fraction of the merged cluster's length that is literal text.
    pub fn precision(&self) -> f64 {
        precision(self.weight(), self.min_len(), self.max_len())
    }

    /// Whether the last step is a terminal filler.
    pub fn is_terminated(&self) -> bool {
        matches!(self.steps.last(), Some(MergeStep { pair: None, .. }))
    }

    /// Copy of this sequence with one more step.
    ///
    /// `min_len`/`max_len` are the length bounds contributed by the pair
    /// itself (shortest and longest of the two tokens), excluding the gap.
    pub fn extended(
        &self,
        pair: Option<(usize, usize)>,
        min_gap: usize,
        max_gap: usize,
        step_weight: f64,
        min_len: usize,
        max_len: usize,
    ) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.extend_from_slice(&self.steps);
        steps.push(MergeStep {
            pair,
            min_gap,
            max_gap,
            open_gap: false,
            step_weight,
            weight: self.weight() + step_weight,
            min_len: self.min_len() + min_gap + min_len,
            max_len: self.max_len() + max_gap + max_len,
        });
        Self { left: self.left, right: self.right, steps }
    }

    /// Leave the gap of the last step open-ended when `open` is set.
    pub fn open_last_gap(mut self, open: bool) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.open_gap |= open;
        }
        self
    }

    /// Steps from the first aligned pair to the last.
    pub fn ordered_steps(&self) -> &[MergeStep] {
        &self.steps
    }
}

impl fmt::Display for MergeSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{} [", self.left, self.right)?;
        for (n, step) in self.steps.iter().enumerate() {
            if n > 0 {
                f.write_str(", ")?;
            }
            match step.pair {
                Some((i, j)) => write!(f, "{i}~{j}")?,
                None => f.write_str("end")?,
            }
            if step.open_gap {
                write!(f, "@{},", step.min_gap)?;
            } else if step.max_gap > 0 {
                write!(f, "@{},{}", step.min_gap, step.max_gap)?;
            }
        }
        write!(f, "] precision={:.3}", self.precision())
    }
}

fn precision(weight: f64, min_len: usize, max_len: usize) -> f64 {
    let mean = (min_len + max_len) as f64 / 2.0;
    if mean == 0.0 {
        return 1.0;
    }
    weight / mean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_step_has_full_precision() {
        let seq = MergeSequence::new(ClusterId::next(), ClusterId::next()).extended(Some((0, 0)), 0, 0, 3.0, 3, 3);
        assert_eq!(seq.precision(), 1.0);
        assert_eq!(seq.len(), 1);
        assert!(!seq.is_terminated());
    }

    #[test]
    fn gaps_lower_precision() {
        let seq = MergeSequence::new(ClusterId::next(), ClusterId::next())
            .extended(Some((0, 0)), 0, 0, 4.0, 4, 4)
            .extended(Some((1, 1)), 3, 11, 4.0, 4, 4)
            .extended(None, 0, 2, 0.0, 0, 0);
        assert_eq!(seq.weight(), 8.0);
        assert_eq!(seq.min_len(), 11);
        assert_eq!(seq.max_len(), 21);
        assert!((seq.precision() - 0.5).abs() < 1e-9);
        assert!(seq.is_terminated());
        assert!(seq.ordered_steps()[1].precision() > seq.precision());
    }

    #[test]
    fn extension_leaves_original_untouched() {
        let base = MergeSequence::new(ClusterId::next(), ClusterId::next()).extended(Some((0, 0)), 0, 0, 2.0, 2, 2);
        let longer = base.extended(Some((1, 1)), 1, 1, 1.0, 1, 1);
        assert_eq!(base.len(), 1);
        assert_eq!(longer.len(), 2);
    }

    #[test]
    fn open_gap_marks_only_last_step() {
        let seq = MergeSequence::new(ClusterId::next(), ClusterId::next())
            .extended(Some((0, 0)), 0, 0, 2.0, 2, 2)
            .extended(None, 1, 4, 0.0, 0, 0)
            .open_last_gap(true);
        let steps = seq.ordered_steps();
        assert!(!steps[0].open_gap);
        assert!(steps[1].open_gap);
        assert!(seq.to_string().contains("end@1,]"));
    }
}
