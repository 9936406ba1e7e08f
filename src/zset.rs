//! Sorted set storage (§4.D): `(member, score)` pairs ordered by
//! `(score asc, member lex asc)`.
//!
//! Backed by a `HashMap<Bytes, f64>` for O(1) score lookup/update plus a
//! `BTreeSet<(OrderedFloat<f64>, Bytes)>` for the ordered index, which is
//! the order-statistic-tree alternative §4.D explicitly allows in place of
//! a hand-linked skip list.

use bytes::Bytes;
use ordered_float::OrderedFloat;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug, Default)]
pub struct SortedSet {
    scores: HashMap<Bytes, f64>,
    index: BTreeSet<(OrderedFloat<f64>, Bytes)>,
}

/// A score range bound, as used by ZRANGEBYSCORE: inclusive unless the
/// value was prefixed with `(` on the wire.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bound {
    Inclusive(f64),
    Exclusive(f64),
    NegInf,
    PosInf,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Inserts or updates a member's score. Returns `true` if the member
    /// was newly added (as opposed to an existing member re-scored).
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        if let Some(&old) = self.scores.get(&member) {
            self.index.remove(&(OrderedFloat(old), member.clone()));
            self.index.insert((OrderedFloat(score), member.clone()));
            self.scores.insert(member, score);
            false
        } else {
            self.index.insert((OrderedFloat(score), member.clone()));
            self.scores.insert(member, score);
            true
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        if let Some(score) = self.scores.remove(member) {
            self.index.remove(&(OrderedFloat(score), Bytes::copy_from_slice(member)));
            true
        } else {
            false
        }
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.scores.contains_key(member)
    }

    /// ZINCRBY: adds `delta` to the member's score (defaulting to 0),
    /// returning the new score.
    pub fn incr_by(&mut self, member: Bytes, delta: f64) -> f64 {
        let base = self.scores.get(&member).copied().unwrap_or(0.0);
        let new_score = base + delta;
        self.insert(member, new_score);
        new_score
    }

    /// Rank-based range, inclusive both ends, negative indices counted
    /// from the tail (ZRANGE semantics). `rev` iterates highest-score
    /// first (ZREVRANGE).
    pub fn range_by_rank(&self, start: i64, stop: i64, rev: bool) -> Vec<(Bytes, f64)> {
        let len = self.index.len() as i64;
        if len == 0 {
            return Vec::new();
        }
        let norm = |i: i64| -> i64 { if i < 0 { len + i } else { i } };

        let start_raw = norm(start);
        let stop_raw = norm(stop);
        // start past the end, or stop still negative after normalizing
        // against the tail, both mean the requested range misses the set
        // entirely — caught before clamping, or clamping would silently
        // rescue them into a bogus single-member range.
        if start_raw >= len || stop_raw < 0 {
            return Vec::new();
        }

        let start = start_raw.max(0);
        let stop = stop_raw.min(len - 1);
        if stop < start {
            return Vec::new();
        }
        let items: Vec<(Bytes, f64)> = if rev {
            self.index
                .iter()
                .rev()
                .map(|(s, m)| (m.clone(), s.0))
                .collect()
        } else {
            self.index.iter().map(|(s, m)| (m.clone(), s.0)).collect()
        };
        items[(start as usize)..=(stop as usize)].to_vec()
    }

    /// Score-range query, inclusive unless a bound is `Exclusive`.
    pub fn range_by_score(&self, min: Bound, max: Bound) -> Vec<(Bytes, f64)> {
        self.index
            .iter()
            .filter(|(s, _)| bound_allows_low(min, s.0) && bound_allows_high(max, s.0))
            .map(|(s, m)| (m.clone(), s.0))
            .collect()
    }

    pub fn remove_range_by_score(&mut self, min: Bound, max: Bound) -> usize {
        let doomed: Vec<Bytes> = self
            .range_by_score(min, max)
            .into_iter()
            .map(|(m, _)| m)
            .collect();
        for m in &doomed {
            self.remove(m);
        }
        doomed.len()
    }
}

fn bound_allows_low(b: Bound, score: f64) -> bool {
    match b {
        Bound::Inclusive(v) => score >= v,
        Bound::Exclusive(v) => score > v,
        Bound::NegInf => true,
        Bound::PosInf => false,
    }
}

fn bound_allows_high(b: Bound, score: f64) -> bool {
    match b {
        Bound::Inclusive(v) => score <= v,
        Bound::Exclusive(v) => score < v,
        Bound::PosInf => true,
        Bound::NegInf => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn orders_by_score_then_member() {
        let mut z = SortedSet::new();
        z.insert(b("b"), 1.0);
        z.insert(b("a"), 1.0);
        z.insert(b("c"), 0.5);
        let all = z.range_by_rank(0, -1, false);
        assert_eq!(
            all.iter().map(|(m, _)| m.clone()).collect::<Vec<_>>(),
            vec![b("c"), b("a"), b("b")]
        );
    }

    #[test]
    fn incr_by_creates_and_accumulates() {
        let mut z = SortedSet::new();
        assert_eq!(z.incr_by(b("x"), 5.0), 5.0);
        assert_eq!(z.incr_by(b("x"), -2.0), 3.0);
        assert_eq!(z.score(b"x"), Some(3.0));
    }

    #[test]
    fn score_range_respects_exclusivity() {
        let mut z = SortedSet::new();
        for i in 0..5 {
            z.insert(Bytes::from(i.to_string()), i as f64);
        }
        let r = z.range_by_score(Bound::Exclusive(1.0), Bound::Inclusive(3.0));
        assert_eq!(r.len(), 2); // scores 2, 3
    }

    #[test]
    fn negative_rank_indices_count_from_tail() {
        let mut z = SortedSet::new();
        for i in 0..5 {
            z.insert(Bytes::from(i.to_string()), i as f64);
        }
        let last_two = z.range_by_rank(-2, -1, false);
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[1].1, 4.0);
    }
}
