//! # Sync Engine
//!
//! 跨节点确认同步屏障。
//!
//! 负责：
//! - 按序号 (SeqNum) 收集每个节点的响应
//! - 合并响应（确认取 AND，提交点取 MAX）
//! - 每个周期只向下游释放一个合并结果
//! - 数据响应直接透传，不占用屏障名额
//!
//! ## 使用示例
//!
//! ```ignore
//! use sync_engine::{Barrier, WriterResponse};
//!
//! let mut barrier = Barrier::new("writer", 3);
//!
//! // Push responses as they arrive
//! if let Some(merged) = barrier.push(response) {
//!     // One merged response per cycle
//! }
//! ```

mod barrier;
mod response;
mod synchronizer;

// Re-exports
pub use barrier::{Barrier, BarrierState};
pub use contracts::BarrierConfig;
pub use response::{
    Acknowledgement, IteratorResponse, IteratorVariant, NodeKey, SeqNum, TimeStamp, WriterResponse,
};
pub use synchronizer::Synchronizer;
