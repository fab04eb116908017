//! # Dispatcher
//!
//! 数据分发模块。
//!
//! 负责：
//! - 按地址分发 (Switch / BatchSwitch)
//! - 固定 fan-out 复制 (Delta / DeltaTransform)
//! - 动态订阅者广播，隔离慢订阅者，不阻塞主链路 (DynamicDeltaMultiplier)

pub mod delta;
pub mod metrics;
pub mod multiplier;
pub mod switch;

pub use delta::{Delta, DeltaTransform};
pub use metrics::{MetricsSnapshot, MultiplierMetrics};
pub use multiplier::{DynamicDeltaMultiplier, MultiplierHandle};
pub use switch::{BatchSwitch, BatchSwitchFn, Switch, SwitchFn};
