//! 投递指标收集模块
//!
//! 记录 append / publish / shutdown 各阶段的 Prometheus 指标，
//! 并提供内存聚合器用于运行结束时输出摘要。

use metrics::{counter, gauge, histogram};

/// 记录一条记录被接受入队
pub fn record_appended(stream: &str) {
    counter!(
        "shipper_records_appended_total",
        "stream" => stream.to_string()
    )
    .increment(1);
}

/// 记录一次投递结果
pub fn record_published(stream: &str, success: bool, latency_ms: f64) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "shipper_records_published_total",
        "stream" => stream.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "shipper_publish_latency_ms",
        "stream" => stream.to_string()
    )
    .record(latency_ms);
}

/// 记录提交被拒绝
pub fn record_rejected(stream: &str, reason: &'static str) {
    counter!(
        "shipper_records_rejected_total",
        "stream" => stream.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// 记录格式化失败
pub fn record_format_error(stream: &str) {
    counter!(
        "shipper_format_errors_total",
        "stream" => stream.to_string()
    )
    .increment(1);
}

/// 记录队列深度
pub fn record_queue_depth(stream: &str, depth: usize) {
    gauge!(
        "shipper_queue_depth",
        "stream" => stream.to_string()
    )
    .set(depth as f64);
}

/// 记录关闭时未投递的记录数
pub fn record_shutdown(stream: &str, residual: usize, in_flight: usize) {
    gauge!(
        "shipper_shutdown_residual",
        "stream" => stream.to_string()
    )
    .set(residual as f64);

    gauge!(
        "shipper_shutdown_in_flight",
        "stream" => stream.to_string()
    )
    .set(in_flight as f64);

    if residual + in_flight > 0 {
        counter!(
            "shipper_shutdown_incomplete_total",
            "stream" => stream.to_string()
        )
        .increment(1);
    }
}

/// 生产端指标聚合器
///
/// 在内存中聚合 append 结果与等待时间，便于输出摘要。
#[derive(Debug, Clone, Default)]
pub struct ShipperMetricsAggregator {
    /// 读取的行数
    pub lines_read: u64,

    /// 成功入队
    pub accepted: u64,

    /// 被拒绝
    pub rejected: u64,

    /// append 等待时间 (毫秒)，反映背压
    pub append_wait_ms: RunningStats,
}

impl ShipperMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次 append
    pub fn update(&mut self, accepted: bool, wait_ms: f64) {
        self.lines_read += 1;
        if accepted {
            self.accepted += 1;
        } else {
            self.rejected += 1;
        }
        self.append_wait_ms.push(wait_ms);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            lines_read: self.lines_read,
            accepted: self.accepted,
            rejected: self.rejected,
            reject_rate: if self.lines_read > 0 {
                self.rejected as f64 / self.lines_read as f64 * 100.0
            } else {
                0.0
            },
            append_wait_ms: StatsSummary::from(&self.append_wait_ms),
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
    pub lines_read: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub reject_rate: f64,
    pub append_wait_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Producer Summary ===")?;
        writeln!(f, "Lines read: {}", self.lines_read)?;
        writeln!(f, "Accepted: {}", self.accepted)?;
        writeln!(
            f,
            "Rejected: {} ({:.2}%)",
            self.rejected, self.reject_rate
        )?;
        writeln!(f, "Append wait (ms): {}", self.append_wait_ms)?;
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

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

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
    fn test_aggregator_reject_rate() {
        let mut aggregator = ShipperMetricsAggregator::new();
        aggregator.update(true, 0.1);
        aggregator.update(true, 0.2);
        aggregator.update(true, 3.0);
        aggregator.update(false, 0.0);

        let summary = aggregator.summary();
        assert_eq!(summary.lines_read, 4);
        assert_eq!(summary.accepted, 3);
        assert_eq!(summary.rejected, 1);
        assert!((summary.reject_rate - 25.0).abs() < 1e-10);
        assert_eq!(summary.append_wait_ms.count, 4);
    }

    #[test]
    fn test_summary_display() {
        let summary = MetricsSummary {
            lines_read: 200,
            accepted: 190,
            rejected: 10,
            reject_rate: 5.0,
            append_wait_ms: StatsSummary::default(),
        };

        let output = format!("{}", summary);
        assert!(output.contains("Lines read: 200"));
        assert!(output.contains("5.00%"));
        assert!(output.contains("Append wait (ms): N/A"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_appended("s");
        record_published("s", false, 1.0);
        record_rejected("s", "queue_full");
        record_shutdown("s", 1, 0);
    }
}
