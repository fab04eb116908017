//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出
//! - 广播分发与屏障同步指标收集与统计
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::{init_tracing, LogFormat, TracingConfig};
//!
//! init_tracing(&TracingConfig::new(LogFormat::Compact, "debug"))?;
//!
//! // 记录屏障释放
//! if let Some(released) = barrier.push(response) {
//!     observability::record_barrier_release("writer", released.acked());
//! }
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

// Re-exports
pub use crate::metrics::{
    record_barrier_release, record_barrier_violation, record_delivery_latency_ms,
    record_multiplier_round, record_subscriber_count, record_subscriber_timeout,
    FlowMetricsAggregator, MetricsSummary, RunningStats, StatsSummary,
};

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON 结构化日志
    Json,
    /// 人类可读格式
    #[default]
    Pretty,
    /// 紧凑单行格式
    Compact,
}

/// Tracing 配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub format: LogFormat,
    /// 默认过滤指令，例如 `info` 或 `dispatcher=debug`
    pub directive: String,
    /// 为 true 时 `RUST_LOG` 优先于 `directive`
    pub env_override: bool,
}

impl TracingConfig {
    pub fn new(format: LogFormat, directive: impl Into<String>) -> Self {
        Self {
            format,
            directive: directive.into(),
            env_override: true,
        }
    }

    /// 忽略 `RUST_LOG`，固定使用 `directive`
    pub fn fixed(mut self) -> Self {
        self.env_override = false;
        self
    }

    fn filter(&self) -> EnvFilter {
        if self.env_override {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.directive))
        } else {
            EnvFilter::new(&self.directive)
        }
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        match self.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            LogFormat::Pretty => fmt::layer().pretty().boxed(),
            LogFormat::Compact => fmt::layer().compact().boxed(),
        }
    }
}

/// 安装全局 tracing subscriber
///
/// 每个进程只能成功调用一次。
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(config.layer())
        .with(config.filter())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::debug!(format = ?config.format, directive = %config.directive, "tracing initialized");
    Ok(())
}

/// 仅初始化 Prometheus 指标（不初始化 Tracing）
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
