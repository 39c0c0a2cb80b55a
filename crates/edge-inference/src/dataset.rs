use serde::{Deserialize, Serialize};

use crate::RetentionFlags;

/// How evictable rows are dropped when a `make_forget` row arrives.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetentionPolicy {
    #[default]
    KeepAll,
    /// Drop evictable rows within Euclidean `radius` of the new input.
    NeighborErasing { radius: f64 },
    /// Keep at most `capacity` rows, dropping the oldest evictable ones first.
    SlidingWindow { capacity: usize },
}

/// One training pair with its retention tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub input: Vec<f64>,
    pub target: f64,
    pub flags: RetentionFlags,
}

/// Ordered training rows, oldest first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingSet {
    rows: Vec<TrainingRow>,
}

impl TrainingSet {
    pub fn from_rows(rows: Vec<TrainingRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[TrainingRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Adds a row without applying any retention policy.
    pub fn push(&mut self, row: TrainingRow) {
        self.rows.push(row);
    }

    /// Adds `row` and applies `policy` when the row is tagged `make_forget`.
    /// Returns the number of evicted rows. The appended row itself is never evicted.
    pub fn append(&mut self, row: TrainingRow, policy: &RetentionPolicy) -> usize {
        let before = self.rows.len();
        if !row.flags.make_forget {
            self.rows.push(row);
            return 0;
        }

        match policy {
            RetentionPolicy::KeepAll => self.rows.push(row),
            RetentionPolicy::NeighborErasing { radius } => {
                self.rows.retain(|existing| {
                    !(existing.flags.is_evictable()
                        && euclidean(&existing.input, &row.input) <= *radius)
                });
                self.rows.push(row);
            }
            RetentionPolicy::SlidingWindow { capacity } => {
                self.rows.push(row);
                while self.rows.len() > *capacity {
                    let last = self.rows.len() - 1;
                    let Some(oldest) = self.rows[..last]
                        .iter()
                        .position(|existing| existing.flags.is_evictable())
                    else {
                        break;
                    };
                    self.rows.remove(oldest);
                }
            }
        }
        (before + 1).saturating_sub(self.rows.len())
    }
}

fn euclidean(left: &[f64], right: &[f64]) -> f64 {
    left.iter()
        .zip(right)
        .map(|(left, right)| (left - right) * (left - right))
        .sum::<f64>()
        .sqrt()
}
