//! 数据流引擎指标收集模块
//!
//! 记录广播分发 (multiplier) 与屏障同步 (barrier) 的运行指标。

use metrics::{counter, gauge, histogram};

/// 记录一轮广播
///
/// 每个输入值广播完成后调用，`timed_out` 为本轮超时的订阅者数量。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_multiplier_round;
///
/// record_multiplier_round("telemetry", subscribers.len(), timed_out.len());
/// ```
pub fn record_multiplier_round(segment: &str, subscribers: usize, timed_out: usize) {
    counter!("flow_multiplier_rounds_total", "segment" => segment.to_string()).increment(1);

    let delivered = subscribers.saturating_sub(timed_out);
    if delivered > 0 {
        counter!("flow_multiplier_deliveries_total", "segment" => segment.to_string())
            .increment(delivered as u64);
    }
    if timed_out > 0 {
        counter!("flow_multiplier_timeouts_total", "segment" => segment.to_string())
            .increment(timed_out as u64);
    }
}

/// 记录单个订阅者超时 (该订阅者本轮的值被丢弃)
pub fn record_subscriber_timeout(segment: &str, subscriber: &str) {
    counter!(
        "flow_multiplier_subscriber_timeouts_total",
        "segment" => segment.to_string(),
        "subscriber" => subscriber.to_string()
    )
    .increment(1);
}

/// 记录当前订阅者数量
pub fn record_subscriber_count(segment: &str, count: usize) {
    gauge!("flow_multiplier_subscribers", "segment" => segment.to_string()).set(count as f64);
}

/// 记录屏障释放
pub fn record_barrier_release(segment: &str, acked: bool) {
    let status = if acked { "ack" } else { "nack" };
    counter!(
        "flow_barrier_releases_total",
        "segment" => segment.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录屏障协议违规 (零序号或乱序)
pub fn record_barrier_violation(segment: &str, kind: &str) {
    counter!(
        "flow_barrier_violations_total",
        "segment" => segment.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// 记录端到端投递延迟
pub fn record_delivery_latency_ms(latency_ms: f64) {
    histogram!("flow_delivery_latency_ms").record(latency_ms);
}

/// 数据流指标聚合器
///
/// 在内存中聚合指标，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct FlowMetricsAggregator {
    /// 广播轮数
    pub total_rounds: u64,

    /// 成功投递次数
    pub total_deliveries: u64,

    /// 超时丢弃次数
    pub total_timeouts: u64,

    /// 屏障释放次数
    pub barrier_releases: u64,

    /// 否定结果的屏障释放次数
    pub barrier_nacks: u64,

    /// 协议违规次数
    pub barrier_violations: u64,

    /// 投递延迟统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 各订阅者超时次数
    pub timeout_counts: std::collections::HashMap<String, u64>,
}

impl FlowMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新广播统计
    pub fn update_round(&mut self, subscribers: usize, timed_out: &[String]) {
        self.total_rounds += 1;
        self.total_deliveries += subscribers.saturating_sub(timed_out.len()) as u64;
        self.total_timeouts += timed_out.len() as u64;
        for subscriber in timed_out {
            *self.timeout_counts.entry(subscriber.clone()).or_insert(0) += 1;
        }
    }

    /// 更新屏障统计
    pub fn update_release(&mut self, acked: bool) {
        self.barrier_releases += 1;
        if !acked {
            self.barrier_nacks += 1;
        }
    }

    /// 记录协议违规
    pub fn update_violation(&mut self) {
        self.barrier_violations += 1;
    }

    /// 记录投递延迟
    pub fn update_latency(&mut self, latency_ms: f64) {
        self.latency_stats.push(latency_ms);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let attempts = self.total_deliveries + self.total_timeouts;
        MetricsSummary {
            total_rounds: self.total_rounds,
            total_deliveries: self.total_deliveries,
            total_timeouts: self.total_timeouts,
            timeout_rate: if attempts > 0 {
                self.total_timeouts as f64 / attempts as f64 * 100.0
            } else {
                0.0
            },
            barrier_releases: self.barrier_releases,
            barrier_nacks: self.barrier_nacks,
            barrier_violations: self.barrier_violations,
            latency_ms: StatsSummary::from(&self.latency_stats),
            subscriber_timeout_counts: self.timeout_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_rounds: u64,
    pub total_deliveries: u64,
    pub total_timeouts: u64,
    pub timeout_rate: f64,
    pub barrier_releases: u64,
    pub barrier_nacks: u64,
    pub barrier_violations: u64,
    pub latency_ms: StatsSummary,
    pub subscriber_timeout_counts: std::collections::HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Flow Metrics Summary ===")?;
        writeln!(f, "Broadcast rounds: {}", self.total_rounds)?;
        writeln!(f, "Deliveries: {}", self.total_deliveries)?;
        writeln!(
            f,
            "Timeouts: {} ({:.2}%)",
            self.total_timeouts, self.timeout_rate
        )?;
        writeln!(
            f,
            "Barrier releases: {} (nack: {})",
            self.barrier_releases, self.barrier_nacks
        )?;
        writeln!(f, "Barrier violations: {}", self.barrier_violations)?;
        writeln!(f, "Delivery latency (ms): {}", self.latency_ms)?;

        if !self.subscriber_timeout_counts.is_empty() {
            writeln!(f, "Subscriber timeouts:")?;
            let mut counts: Vec<_> = self.subscriber_timeout_counts.iter().collect();
            counts.sort();
            for (subscriber, count) in counts {
                writeln!(f, "  {}: {}", subscriber, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_rounds() {
        let mut aggregator = FlowMetricsAggregator::new();
        aggregator.update_round(3, &[]);
        aggregator.update_round(3, &["slow".to_string()]);
        aggregator.update_round(3, &["slow".to_string()]);

        let summary = aggregator.summary();
        assert_eq!(summary.total_rounds, 3);
        assert_eq!(summary.total_deliveries, 7);
        assert_eq!(summary.total_timeouts, 2);
        assert!((summary.timeout_rate - 22.222).abs() < 0.01);
        assert_eq!(summary.subscriber_timeout_counts.get("slow"), Some(&2));
    }

    #[test]
    fn test_aggregator_barrier() {
        let mut aggregator = FlowMetricsAggregator::new();
        aggregator.update_release(true);
        aggregator.update_release(false);
        aggregator.update_violation();

        let summary = aggregator.summary();
        assert_eq!(summary.barrier_releases, 2);
        assert_eq!(summary.barrier_nacks, 1);
        assert_eq!(summary.barrier_violations, 1);
        assert!(summary.to_string().contains("Barrier releases: 2 (nack: 1)"));
    }

    #[test]
    fn test_aggregator_reset() {
        let mut aggregator = FlowMetricsAggregator::new();
        aggregator.update_latency(1.5);
        aggregator.update_round(1, &[]);
        aggregator.reset();
        assert_eq!(aggregator.summary().total_rounds, 0);
        assert_eq!(aggregator.summary().latency_ms.count, 0);
    }

    #[test]
    fn test_recorders_without_installed_recorder() {
        record_multiplier_round("m", 2, 1);
        record_subscriber_timeout("m", "slow");
        record_subscriber_count("m", 2);
        record_barrier_release("b", false);
        record_barrier_violation("b", "zero_seq_num");
        record_delivery_latency_ms(0.5);
    }
}
