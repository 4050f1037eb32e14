use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::primitives::{DetectionResult, LandmarkSets};

pub const DEFAULT_HISTORY_CAPACITY: usize = 30;
pub const DEFAULT_RECENT_COUNT: usize = 10;

/// One remembered detection, shaped for `landmarks_history` replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LandmarkSnapshot {
    pub frame_id: u64,
    pub timestamp: i64,
    #[serde(flatten)]
    pub sets: LandmarkSets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f32>,
}

impl LandmarkSnapshot {
    pub fn from_result(result: &DetectionResult, timestamp: i64) -> Self {
        Self {
            frame_id: result.frame_id,
            timestamp,
            sets: result.sets.clone(),
            quality_score: result.quality_score,
        }
    }
}

/// Fixed-capacity ring of recent detections, append-only from the pipeline
/// and read-only to clients. Holds roughly one second of frames at the
/// default capacity.
pub struct LandmarksHistory {
    capacity: usize,
    entries: VecDeque<LandmarkSnapshot>,
}

impl LandmarksHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, snapshot: LandmarkSnapshot) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    /// The most recent `n` snapshots in chronological order.
    pub fn recent(&self, n: usize) -> Vec<LandmarkSnapshot> {
        let start = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LandmarksHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(frame_id: u64) -> LandmarkSnapshot {
        LandmarkSnapshot {
            frame_id,
            timestamp: frame_id as i64 * 33,
            sets: LandmarkSets::default(),
            quality_score: None,
        }
    }

    #[test]
    fn test_ring_never_exceeds_capacity() {
        let mut history = LandmarksHistory::new(30);
        for id in 1..=40u64 {
            history.push(snapshot(id));
            assert!(history.len() <= 30);
        }
        assert_eq!(history.len(), 30);
    }

    #[test]
    fn test_recent_is_chronological_tail() {
        let mut history = LandmarksHistory::new(30);
        for id in 1..=40u64 {
            history.push(snapshot(id));
        }
        let ids: Vec<u64> = history.recent(5).iter().map(|s| s.frame_id).collect();
        assert_eq!(ids, vec![36, 37, 38, 39, 40]);
    }

    #[test]
    fn test_recent_clamps_to_contents() {
        let mut history = LandmarksHistory::new(30);
        for id in 1..=3u64 {
            history.push(snapshot(id));
        }
        let ids: Vec<u64> = history.recent(10).iter().map(|s| s.frame_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(LandmarksHistory::default().recent(5).is_empty());
    }

    #[test]
    fn test_snapshot_flattens_result_fields() {
        let value = serde_json::to_value(snapshot(7)).unwrap();
        assert_eq!(value["frame_id"], 7);
        assert!(value.get("multiHandLandmarks").is_some());
        assert!(value.get("sets").is_none());
    }
}
