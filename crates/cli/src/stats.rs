//! Run statistics.

use std::time::Duration;

use dispatcher::ShutdownReport;
use observability::ShipperMetricsAggregator;

/// Statistics from a shipping run
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Wall time from engine start to the end of shutdown
    pub duration: Duration,

    /// Engine accounting at shutdown
    pub report: ShutdownReport,

    /// Producer side: lines read, accepted, rejected, append wait
    pub producer: ShipperMetricsAggregator,

    /// Whether the run ended on a signal rather than EOF
    pub interrupted: bool,
}

impl RunStats {
    /// Records delivered per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.report.delivered as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Run Statistics ===\n");
        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Ended by: {}", if self.interrupted { "signal" } else { "EOF" });
        println!("   └─ Throughput: {:.2} records/s", self.throughput());

        println!("\nDelivery");
        println!("   ├─ Delivered: {}", self.report.delivered);
        println!("   ├─ Failed: {}", self.report.failed);
        println!("   ├─ Dequeued: {}", self.report.dequeued);
        println!("   ├─ Residual (never sent): {}", self.report.residual);
        println!("   ├─ In flight (abandoned): {}", self.report.in_flight);
        println!(
            "   └─ Drain: {} in {:.2}s",
            if self.report.timed_out { "timed out" } else { "complete" },
            self.report.elapsed.as_secs_f64()
        );

        println!("\n{}", self.producer.summary());
    }
}
