use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// FIFO queue of pilot ids. Enqueue at the tail, dequeue from the head; the
/// longest-waiting pilots always leave first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PilotQueue(VecDeque<String>);

impl PilotQueue {
    pub fn new() -> Self {
        PilotQueue::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queue = PilotQueue::new();
        for id in ids {
            queue.enqueue(id);
        }
        queue
    }

    /// Appends to the tail. A pilot already queued keeps their place.
    pub fn enqueue(&mut self, pilot_id: impl Into<String>) -> bool {
        let pilot_id = pilot_id.into();
        if self.contains(&pilot_id) {
            return false;
        }
        self.0.push_back(pilot_id);
        true
    }

    /// Removes up to `count` ids from the head, oldest first.
    pub fn dequeue_front(&mut self, count: usize) -> Vec<String> {
        let take = count.min(self.0.len());
        self.0.drain(..take).collect()
    }

    pub fn remove(&mut self, pilot_id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|id| id != pilot_id);
        before != self.0.len()
    }

    pub fn contains(&self, pilot_id: &str) -> bool {
        self.0.iter().any(|id| id == pilot_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

/// Insert-only set of eliminated pilots, kept in elimination order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EliminatedSet(Vec<String>);

impl EliminatedSet {
    pub fn new() -> Self {
        EliminatedSet::default()
    }

    pub fn insert(&mut self, pilot_id: impl Into<String>) -> bool {
        let pilot_id = pilot_id.into();
        if self.contains(&pilot_id) {
            return false;
        }
        self.0.push(pilot_id);
        true
    }

    pub fn contains(&self, pilot_id: &str) -> bool {
        self.0.iter().any(|id| id == pilot_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}
