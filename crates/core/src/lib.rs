//! Core library for sim-image-bench ─ camera frame-rate benchmarking against a simulator RPC server.

pub mod config;
pub mod frame;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod sink;
pub mod strategy;

pub use config::BenchConfig;
pub use frame::{FrameShape, ImageSample};
pub use metrics::Metrics;
pub use report::{BenchmarkReport, ReportFormat};
pub use runner::{BenchmarkRunner, RunnerOptions};
pub use sink::{FrameSink, NpyFrameSink, NullSink};
pub use strategy::{build_strategy, CameraTarget, SampleError, SamplingStrategy, StrategyKind};
