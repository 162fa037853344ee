// crates/core/src/report.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::strategy::StrategyKind;

/// Identity of one benchmark run, fixed when the runner is built.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub strategy: StrategyKind,
    pub camera_name: String,
    pub started_at: Option<DateTime<Utc>>,
}

impl RunInfo {
    pub fn new(strategy: StrategyKind, camera_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            strategy,
            camera_name: camera_name.into(),
            started_at: None,
        }
    }
}

/// Final result of a benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub run_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub strategy: StrategyKind,
    pub camera_name: String,
    pub image_count: u64,
    pub failures: u64,
    pub total_elapsed_secs: f64,
    /// `None` when no image was ever sampled.
    pub average_fps: Option<f64>,
    pub sim_image_bench_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(anyhow::anyhow!("Unsupported format '{}'. Use 'text', 'json' or 'csv'", other)),
        }
    }
}

impl BenchmarkReport {
    pub fn from_metrics(metrics: &Metrics, info: &RunInfo) -> Self {
        Self {
            run_id: info.run_id,
            started_at: info.started_at,
            strategy: info.strategy,
            camera_name: info.camera_name.clone(),
            image_count: metrics.image_count(),
            failures: metrics.failures(),
            total_elapsed_secs: metrics.total_elapsed().as_secs_f64(),
            average_fps: metrics.average_fps(),
            sim_image_bench_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.average_fps.is_some()
    }

    /// The one-line result, same wording as the per-sample log line.
    pub fn result_line(&self) -> String {
        match self.average_fps {
            Some(fps) => format!("result: {} avg_fps for {} num of images", fps, self.image_count),
            None => format!("result: no data ({} images sampled)", self.image_count),
        }
    }

    pub fn print_summary(&self) {
        print!("{}", self.to_text());
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("\n=== Image Benchmark Results ===\n");
        out.push_str(&format!("Strategy: {}\n", self.strategy));
        out.push_str(&format!("Camera: {}\n", self.camera_name));
        out.push_str(&format!("Images: {}\n", self.image_count));
        if self.failures > 0 {
            out.push_str(&format!("Failed polls: {}\n", self.failures));
        }
        out.push_str(&format!("Time in RPC + decode: {:.3}s\n", self.total_elapsed_secs));
        out.push_str(&self.result_line());
        out.push('\n');
        out.push_str("===============================\n");
        out
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .context("Failed to serialize benchmark report to JSON")
    }

    pub fn to_csv_header() -> String {
        "run_id,started_at,strategy,camera_name,image_count,failures,total_elapsed_secs,average_fps".to_string()
    }

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{:.6},{}",
            self.run_id,
            self.started_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            self.strategy,
            self.camera_name,
            self.image_count,
            self.failures,
            self.total_elapsed_secs,
            self.average_fps.map(|fps| format!("{:.3}", fps)).unwrap_or_default(),
        )
    }

    pub fn render(&self, format: ReportFormat) -> Result<String> {
        Ok(match format {
            ReportFormat::Text => self.to_text(),
            ReportFormat::Json => self.to_json()?,
            ReportFormat::Csv => format!("{}\n{}\n", Self::to_csv_header(), self.to_csv_row()),
        })
    }
}
