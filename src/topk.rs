//! Top-k selection over plaintext scores.
//!
//! Ordering is by score descending; equal scores keep the smaller index first.
//! NaN scores sort below every number.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Fixed-capacity buffer of result indices, `-1` marking an empty slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopK(Vec<i64>);

impl TopK {
    /// Buffer of capacity `k`, all slots empty
    pub fn new(k: usize) -> Self {
        Self(vec![-1; k])
    }

    /// Capacity
    pub fn k(&self) -> usize {
        self.0.len()
    }

    /// Raw slots including empty ones
    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    /// Filled slots, best first
    pub fn indices(&self) -> Vec<usize> {
        self.0
            .iter()
            .take_while(|&&i| i >= 0)
            .map(|&i| i as usize)
            .collect()
    }

    /// Number of filled slots
    pub fn filled(&self) -> usize {
        self.0.iter().take_while(|&&i| i >= 0).count()
    }

    /// Empties every slot
    pub fn clear(&mut self) {
        self.0.fill(-1);
    }

    /// Refills the buffer from `scores`; slots beyond `scores.len()` stay empty.
    pub fn fill_from(&mut self, scores: &[f64]) {
        self.clear();
        for (slot, idx) in self.0.iter_mut().zip(get_top_k_indices(scores, scores.len())) {
            *slot = idx as i64;
        }
    }
}

fn by_score_desc(scores: &[f64]) -> impl Fn(&usize, &usize) -> Ordering + '_ {
    move |&a, &b| {
        let (x, y) = (scores[a], scores[b]);
        match (x.is_nan(), y.is_nan()) {
            (true, true) => a.cmp(&b),
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => y.total_cmp(&x).then(a.cmp(&b)),
        }
    }
}

/// Indices of the `k` largest scores, best first.
///
/// `k = 0` yields an empty vector, `k > scores.len()` every index.
pub fn get_top_k_indices(scores: &[f64], k: usize) -> Vec<usize> {
    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..scores.len()).collect();
    let cmp = by_score_desc(scores);
    if k < order.len() {
        order.select_nth_unstable_by(k - 1, &cmp);
        order.truncate(k);
    }
    order.sort_by(&cmp);
    order
}

/// `(index, score)` pairs of the `k` best candidates.
pub fn top_k_with_scores(scores: &[f64], k: usize) -> Vec<(usize, f64)> {
    get_top_k_indices(scores, k)
        .into_iter()
        .map(|i| (i, scores[i]))
        .collect()
}
