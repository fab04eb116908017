//! Demo run statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::FlowMetricsAggregator;
use sync_engine::WriterResponse;

/// Statistics from a demo run
#[derive(Debug, Clone)]
pub struct DemoStats {
    /// Frames emitted by the ticker
    pub ticks: u64,

    /// Subscriber nodes behind the barrier
    pub nodes: usize,

    /// Total duration of the run
    pub duration: Duration,

    /// Broadcast counters of the fanout stage
    pub multiplier: MetricsSnapshot,

    /// Aggregated flow metrics (broadcast, barrier, latency)
    pub flow: FlowMetricsAggregator,

    /// Merged commit released by the barrier, if every node reported
    pub commit: Option<WriterResponse>,
}

impl DemoStats {
    /// Broadcast rounds per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.multiplier.round_count as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Demo Statistics ===\n");

        println!("Overview");
        println!("   Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   Frames emitted: {}", self.ticks);
        println!("   Nodes: {}", self.nodes);
        println!("   Rounds/s: {:.2}", self.throughput());
        println!("   Closed subscriber sends: {}", self.multiplier.closed_count);

        println!("\nCommit");
        match &self.commit {
            Some(commit) => {
                println!("   Authorized: {}", commit.authorized);
                println!("   Commit point: {:?}", commit.end);
                if let Some(ref error) = commit.error {
                    println!("   Error: {}", error);
                }
            }
            None => println!("   Not released"),
        }

        println!("\n{}", self.flow.summary());
    }
}
