//! # Dispatcher
//!
//! 日志记录投递引擎。
//!
//! 负责：
//! - 接收任意生产者的 append 调用，经有界队列背压
//! - 固定数量的 worker 将记录发送到 `StreamSink`
//! - 生命周期状态机与带截止时间的优雅关闭（丢失计数）

pub mod engine;
pub mod error;
pub mod pool;
pub mod queue;
pub mod report;
pub mod sinks;
pub mod state;
pub mod stats;
pub mod task;

pub use contracts::{EventFormatter, StreamSink};
pub use engine::{DispatchEngine, ShutdownReport};
pub use error::{EngineError, ErrorKind, RejectReason};
pub use pool::WorkerPool;
pub use queue::{BackpressurePolicy, BoundedTaskQueue};
pub use report::{CollectingReporter, ErrorReporter, ReportedError, TracingReporter};
pub use sinks::{
    create_sink, ConfiguredSink, FileSink, LogSink, MemorySink, MemoryStream, NetworkSink,
};
pub use state::EngineState;
pub use stats::{StatsCollector, StatsSnapshot};
pub use task::PublishTask;
