//! Cosine ranking over the whole vocabulary

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::models::table::VectorLookup;

/// A neighbour returned by a similarity query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarWord {
    pub word: String,
    pub similarity: f32,
}

/// Cosine similarity given precomputed norms; 0.0 when either norm is zero
pub fn cosine_with_norms(a: ArrayView1<f32>, a_norm: f32, b: ArrayView1<f32>, b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    (a.dot(&b) / (a_norm * b_norm)).clamp(-1.0, 1.0)
}

/// Ranking key: higher score first, then lexicographically smaller word
#[derive(Debug)]
struct Ranked<'a> {
    score: f32,
    word: &'a str,
}

impl Ord for Ranked<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.word.cmp(self.word))
    }
}

impl PartialOrd for Ranked<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked<'_> {}

/// The `top_n` rows most similar to the row at `query_index`, best first
///
/// The query row itself is never returned. Equal scores are ordered by word.
pub fn most_similar<T>(table: &T, query_index: usize, top_n: usize) -> Vec<SimilarWord>
where
    T: VectorLookup + ?Sized,
{
    // Never more than every other row, whatever the caller asked for.
    let top_n = top_n.min(table.len().saturating_sub(1));
    if top_n == 0 {
        return Vec::new();
    }

    let query = table.vector_at(query_index);
    let query_norm = table.norm_at(query_index);

    // Min-heap of the best `top_n` seen so far; the root is the weakest entry.
    let mut heap: BinaryHeap<Reverse<Ranked<'_>>> = BinaryHeap::with_capacity(top_n + 1);

    for index in 0..table.len() {
        if index == query_index {
            continue;
        }

        let candidate = Ranked {
            score: cosine_with_norms(query, query_norm, table.vector_at(index), table.norm_at(index)),
            word: table.word_at(index),
        };

        if heap.len() < top_n {
            heap.push(Reverse(candidate));
        } else if let Some(Reverse(weakest)) = heap.peek() {
            if candidate > *weakest {
                heap.pop();
                heap.push(Reverse(candidate));
            }
        }
    }

    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(ranked)| SimilarWord {
            word: ranked.word.to_string(),
            similarity: ranked.score,
        })
        .collect()
}
