//! Capacity ranking index.
//!
//! An ordered set of `(score, key)` pairs backed by a `BTreeSet`. Items
//! order by score, then by key, so iteration is a total order and ties
//! resolve the same way on every run. The index stores no records: the
//! owner keeps the key → record map and must remove the old
//! `(score, key)` pair before inserting a changed score.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Direction in which top-K selection walks the index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    /// Lowest score first, ties by ascending key.
    #[default]
    Ascending,
    /// Highest score first, ties by descending key (exact reverse of
    /// `Ascending`).
    Descending,
}

impl fmt::Display for RankOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => f.write_str("ascending"),
            Self::Descending => f.write_str("descending"),
        }
    }
}

impl FromStr for RankOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascending" | "asc" => Ok(Self::Ascending),
            "descending" | "desc" => Ok(Self::Descending),
            other => Err(format!("unknown rank order {other:?} (expected ascending or descending)")),
        }
    }
}

/// Totally ordered `f64` score.
#[derive(Debug, Clone, Copy)]
pub struct Score(pub f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One entry of the index. Field order drives the derived ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankItem<K> {
    pub score: Score,
    pub key: K,
}

/// Ordered `(score, key)` index.
#[derive(Debug, Clone)]
pub struct RankIndex<K> {
    items: BTreeSet<RankItem<K>>,
}

impl<K: Ord + Clone> RankIndex<K> {
    pub fn new() -> Self {
        Self {
            items: BTreeSet::new(),
        }
    }

    /// Insert `(score, key)`. Returns false if the exact pair was present.
    pub fn insert(&mut self, key: K, score: f64) -> bool {
        self.items.insert(RankItem {
            score: Score(score),
            key,
        })
    }

    /// Remove the pair inserted with `old_score`. Returns false if absent.
    pub fn remove(&mut self, key: &K, old_score: f64) -> bool {
        self.items.remove(&RankItem {
            score: Score(old_score),
            key: key.clone(),
        })
    }

    /// Whether the exact pair is present.
    pub fn contains(&self, key: &K, score: f64) -> bool {
        self.items.contains(&RankItem {
            score: Score(score),
            key: key.clone(),
        })
    }

    /// Iterate items in the given direction.
    pub fn iter(&self, order: RankOrder) -> Box<dyn Iterator<Item = &RankItem<K>> + '_> {
        match order {
            RankOrder::Ascending => Box::new(self.items.iter()),
            RankOrder::Descending => Box::new(self.items.iter().rev()),
        }
    }

    /// The first `k` keys in the given direction.
    pub fn top_k(&self, k: usize, order: RankOrder) -> Vec<K> {
        self.iter(order).take(k).map(|item| item.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: Ord + Clone> Default for RankIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}
