//! Barrier - sequence-numbered acknowledgement barrier

use tracing::{debug, error, instrument, warn};

use crate::response::{Acknowledgement, SeqNum};

/// Barrier state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    /// No cycle in progress
    Idle,
    /// Collecting responses for `seq_num`
    Accumulating { seq_num: SeqNum, received: usize },
}

/// Cycle in progress
#[derive(Debug)]
enum Cycle<R> {
    Idle,
    Accumulating {
        seq_num: SeqNum,
        received: usize,
        aggregate: R,
    },
}

/// Collects one response per node and releases their merge
///
/// Zero or mismatched sequence numbers are protocol violations: they are
/// logged and dropped without touching the cycle.
#[derive(Debug)]
pub struct Barrier<R> {
    key: String,
    node_count: usize,
    cycle: Cycle<R>,
    releases: u64,
    violations: u64,
}

impl<R: Acknowledgement> Barrier<R> {
    /// Create a barrier over `node_count` nodes
    ///
    /// A node count of zero is treated as one.
    pub fn new(key: impl Into<String>, node_count: usize) -> Self {
        let key = key.into();
        if node_count == 0 {
            warn!(segment = %key, "barrier node count is zero, using one");
        }
        Self {
            key,
            node_count: node_count.max(1),
            cycle: Cycle::Idle,
            releases: 0,
            violations: 0,
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn state(&self) -> BarrierState {
        match &self.cycle {
            Cycle::Idle => BarrierState::Idle,
            Cycle::Accumulating { seq_num, received, .. } => BarrierState::Accumulating {
                seq_num: *seq_num,
                received: *received,
            },
        }
    }

    /// Released cycles so far
    pub fn releases(&self) -> u64 {
        self.releases
    }

    /// Dropped protocol violations so far
    pub fn violations(&self) -> u64 {
        self.violations
    }

    /// Push a response into the barrier
    ///
    /// Returns the merged response when this completes a cycle, or the
    /// response itself when it bypasses the barrier.
    #[instrument(
        level = "trace",
        name = "barrier_push",
        skip(self, response),
        fields(segment = %self.key, seq_num = response.seq_num())
    )]
    pub fn push(&mut self, response: R) -> Option<R> {
        let seq_num = response.seq_num();
        if seq_num == 0 {
            self.violation("zero_seq_num");
            error!(segment = %self.key, "response with zero sequence number, dropped");
            return None;
        }
        if !response.is_barrier() {
            return Some(response);
        }

        match std::mem::replace(&mut self.cycle, Cycle::Idle) {
            Cycle::Idle => self.advance(seq_num, 1, response),
            Cycle::Accumulating {
                seq_num: expected,
                received,
                mut aggregate,
            } => {
                if seq_num != expected {
                    self.violation("out_of_order");
                    error!(
                        segment = %self.key,
                        expected,
                        received = seq_num,
                        "response sequence number does not match cycle, dropped"
                    );
                    self.cycle = Cycle::Accumulating {
                        seq_num: expected,
                        received,
                        aggregate,
                    };
                    return None;
                }
                aggregate.merge(response);
                self.advance(expected, received + 1, aggregate)
            }
        }
    }

    fn advance(&mut self, seq_num: SeqNum, received: usize, aggregate: R) -> Option<R> {
        if received < self.node_count {
            self.cycle = Cycle::Accumulating {
                seq_num,
                received,
                aggregate,
            };
            return None;
        }
        self.releases += 1;
        let acked = aggregate.acked();
        debug!(segment = %self.key, seq_num, acked, nodes = self.node_count, "barrier released");
        observability::record_barrier_release(&self.key, acked);
        Some(aggregate)
    }

    fn violation(&mut self, kind: &str) {
        self.violations += 1;
        observability::record_barrier_violation(&self.key, kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{IteratorResponse, WriterResponse};
    use rand::seq::SliceRandom;

    fn writer(seq_num: SeqNum, node: u32, authorized: bool, end: i64) -> WriterResponse {
        WriterResponse::new(seq_num, node, authorized).with_end(end)
    }

    #[test]
    fn test_quorum_releases_once_per_cycle() {
        let mut barrier = Barrier::new("writer", 3);
        assert!(barrier.push(WriterResponse::new(1, 1, true)).is_none());
        assert_eq!(
            barrier.state(),
            BarrierState::Accumulating { seq_num: 1, received: 1 }
        );
        assert!(barrier.push(WriterResponse::new(1, 2, true)).is_none());
        let released = barrier.push(WriterResponse::new(1, 3, true)).unwrap();
        assert!(released.authorized);
        assert_eq!(barrier.state(), BarrierState::Idle);

        // The next three responses form an independent cycle
        assert!(barrier.push(WriterResponse::new(2, 1, false)).is_none());
        assert!(barrier.push(WriterResponse::new(2, 2, true)).is_none());
        let released = barrier.push(WriterResponse::new(2, 3, true)).unwrap();
        assert_eq!(released.seq_num, 2);
        assert!(!released.authorized);
        assert_eq!(barrier.releases(), 2);
    }

    #[test]
    fn test_any_negative_ack_makes_cycle_negative() {
        for nack in 0..4 {
            let mut barrier = Barrier::new("iterator", 4);
            let mut released = None;
            for node in 0..4 {
                let response = IteratorResponse::<()>::ack(9, node, node != nack);
                released = barrier.push(response);
            }
            assert!(!released.unwrap().ack, "node {nack} nack lost");
        }
    }

    #[test]
    fn test_commit_scenario_in_any_order() {
        for _ in 0..20 {
            let mut responses = vec![
                writer(7, 1, true, 100),
                writer(7, 2, true, 120),
                writer(7, 3, false, 90),
            ];
            responses.shuffle(&mut rand::rng());

            let mut barrier = Barrier::new("writer", 3);
            let released: Vec<_> = responses.into_iter().filter_map(|r| barrier.push(r)).collect();
            assert_eq!(released.len(), 1);
            assert!(!released[0].authorized);
            assert_eq!(released[0].end, Some(120));
        }
    }

    #[test]
    fn test_out_of_order_response_is_dropped() {
        let mut barrier = Barrier::new("writer", 2);
        assert!(barrier.push(WriterResponse::new(7, 1, true)).is_none());
        assert!(barrier.push(WriterResponse::new(8, 2, false)).is_none());
        assert_eq!(barrier.violations(), 1);
        assert_eq!(
            barrier.state(),
            BarrierState::Accumulating { seq_num: 7, received: 1 }
        );

        let released = barrier.push(WriterResponse::new(7, 2, true)).unwrap();
        assert_eq!(released.seq_num, 7);
        assert!(released.authorized);
    }

    #[test]
    fn test_zero_seq_num_is_dropped() {
        let mut barrier = Barrier::new("writer", 1);
        assert!(barrier.push(WriterResponse::new(0, 1, true)).is_none());
        assert_eq!(barrier.violations(), 1);
        assert_eq!(barrier.state(), BarrierState::Idle);
        assert_eq!(barrier.releases(), 0);
    }

    #[test]
    fn test_data_passes_through_without_slot() {
        let mut barrier = Barrier::new("iterator", 2);
        assert!(barrier.push(IteratorResponse::ack(4, 1, true)).is_none());

        let data = barrier.push(IteratorResponse::data(4, 1, "frame")).unwrap();
        assert_eq!(data.frame, Some("frame"));
        assert_eq!(
            barrier.state(),
            BarrierState::Accumulating { seq_num: 4, received: 1 }
        );

        assert!(barrier.push(IteratorResponse::ack(4, 2, true)).is_some());
    }

    #[test]
    fn test_zero_node_count_treated_as_one() {
        let mut barrier = Barrier::new("writer", 0);
        assert_eq!(barrier.node_count(), 1);
        assert!(barrier.push(WriterResponse::new(5, 1, true)).is_some());
    }
}
