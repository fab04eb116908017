//! Responses aggregated by the barrier

use serde::{Deserialize, Serialize};

/// Sequence number shared by every node's response to one logical operation
///
/// Zero is never a valid sequence number.
pub type SeqNum = u64;

/// Nanosecond timestamp
pub type TimeStamp = i64;

/// Cluster node identifier
pub type NodeKey = u32;

/// A value the barrier can count and combine
pub trait Acknowledgement: Send + 'static {
    /// Sequence number of the operation this answers
    fn seq_num(&self) -> SeqNum;

    /// False for data payloads that bypass the barrier
    fn is_barrier(&self) -> bool {
        true
    }

    /// Whether this response is positive
    fn acked(&self) -> bool;

    /// Fold another node's response for the same operation into this one
    fn merge(&mut self, other: Self)
    where
        Self: Sized;
}

/// Kind of an iterator response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IteratorVariant {
    /// Acknowledges a command; counted by the barrier
    Ack,
    /// Carries a data frame; forwarded immediately
    Data,
}

/// Per-node response to an iterator command (seek, next, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IteratorResponse<D> {
    pub variant: IteratorVariant,
    pub seq_num: SeqNum,
    pub node: NodeKey,
    pub ack: bool,
    pub frame: Option<D>,
}

impl<D> IteratorResponse<D> {
    pub fn ack(seq_num: SeqNum, node: NodeKey, ack: bool) -> Self {
        Self {
            variant: IteratorVariant::Ack,
            seq_num,
            node,
            ack,
            frame: None,
        }
    }

    pub fn data(seq_num: SeqNum, node: NodeKey, frame: D) -> Self {
        Self {
            variant: IteratorVariant::Data,
            seq_num,
            node,
            ack: true,
            frame: Some(frame),
        }
    }
}

impl<D: Send + 'static> Acknowledgement for IteratorResponse<D> {
    fn seq_num(&self) -> SeqNum {
        self.seq_num
    }

    fn is_barrier(&self) -> bool {
        self.variant == IteratorVariant::Ack
    }

    fn acked(&self) -> bool {
        self.ack
    }

    fn merge(&mut self, other: Self) {
        self.ack &= other.ack;
    }
}

/// Per-node response to a writer command (open, commit, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterResponse {
    pub seq_num: SeqNum,
    pub node: NodeKey,
    pub authorized: bool,
    /// Commit point reached by the node, if the command commits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<TimeStamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriterResponse {
    pub fn new(seq_num: SeqNum, node: NodeKey, authorized: bool) -> Self {
        Self {
            seq_num,
            node,
            authorized,
            end: None,
            error: None,
        }
    }

    pub fn with_end(mut self, end: TimeStamp) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

impl Acknowledgement for WriterResponse {
    fn seq_num(&self) -> SeqNum {
        self.seq_num
    }

    fn acked(&self) -> bool {
        self.authorized
    }

    /// Authorization is AND-ed, the commit point is the latest of all nodes
    /// and the first error is kept
    fn merge(&mut self, other: Self) {
        self.authorized &= other.authorized;
        self.end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        if self.error.is_none() {
            self.error = other.error;
        }
    }
}
