// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use simbench_rpc::SimulatorClient;

use crate::config::BenchConfig;
use crate::metrics::Metrics;
use crate::report::{BenchmarkReport, RunInfo};
use crate::sink::{FrameSink, NpyFrameSink, NullSink};
use crate::strategy::{build_strategy, CameraTarget, FailureAction, SamplingStrategy, StrategyKind};

/// Cadence settings for the poll loop.
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    /// Sleep between polls. Fixed: time spent sampling is not subtracted.
    pub period: Duration,
    /// Stop after this many attempted polls, successful or not.
    pub max_images: Option<u64>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self { period: Duration::from_millis(50), max_images: None }
    }
}

/// State moved onto the poller thread and handed back on join.
struct PollLoop {
    strategy: Box<dyn SamplingStrategy>,
    sink: Box<dyn FrameSink>,
    metrics: Arc<Mutex<Metrics>>,
    running: Arc<AtomicBool>,
    options: RunnerOptions,
}

impl PollLoop {
    fn run(mut self) -> Self {
        let kind = self.strategy.kind();
        let mut attempts: u64 = 0;

        while self.running.load(Ordering::Acquire) {
            attempts += 1;
            let started = Instant::now();
            match self.strategy.sample() {
                Ok(frame) => {
                    let elapsed = started.elapsed();
                    let (count, fps) = {
                        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
                        metrics.record_sample(elapsed);
                        (metrics.image_count(), metrics.average_fps())
                    };
                    match fps {
                        Some(fps) => info!("result: {} avg_fps for {} num of images", fps, count),
                        None => info!("result: no data yet for {} num of images", count),
                    }
                    if let Err(e) = self.sink.show(&frame) {
                        warn!("frame sink failed: {:#}", e);
                    }
                }
                Err(err) => {
                    self.metrics.lock().unwrap_or_else(PoisonError::into_inner).record_failure();
                    if self.strategy.on_failure(&err) == FailureAction::Abort {
                        error!("{} poll failed, stopping image callback thread: {}", kind, err);
                        break;
                    }
                }
            }

            if self.options.max_images.map_or(false, |max| attempts >= max) {
                info!("Reached {} polls, ending benchmark", attempts);
                break;
            }
            thread::sleep(self.options.period);
        }

        debug!("{} poll loop exiting after {} polls", kind, attempts);
        self
    }
}

/// Drives one sampling strategy on a background thread and keeps its counters.
pub struct BenchmarkRunner {
    idle: Option<PollLoop>,
    handle: Option<JoinHandle<PollLoop>>,
    metrics: Arc<Mutex<Metrics>>,
    running: Arc<AtomicBool>,
    info: RunInfo,
}

impl BenchmarkRunner {
    pub fn new(
        strategy: Box<dyn SamplingStrategy>,
        sink: Box<dyn FrameSink>,
        options: RunnerOptions,
    ) -> Self {
        let info = RunInfo::new(strategy.kind(), strategy.camera_name());
        let metrics = Arc::new(Mutex::new(Metrics::new()));
        let running = Arc::new(AtomicBool::new(false));
        let idle = PollLoop {
            strategy,
            sink,
            metrics: Arc::clone(&metrics),
            running: Arc::clone(&running),
            options,
        };
        Self { idle: Some(idle), handle: None, metrics, running, info }
    }

    /// Confirm the connection, then bind the configured strategy and frame sink.
    pub fn from_config<C>(config: &BenchConfig, mut client: C) -> Result<Self>
    where
        C: SimulatorClient + 'static,
    {
        client
            .confirm_connection()
            .context("Failed to confirm connection to simulator")?;

        let target = CameraTarget {
            camera_name: config.camera_name().to_string(),
            vehicle_name: config.vehicle_name().to_string(),
            image_type: config.image_type()?,
        };
        let strategy = build_strategy(config.strategy(), client, target, config.single_image_shape());

        let sink: Box<dyn FrameSink> = if config.viz_enabled() {
            let sink = NpyFrameSink::new(config.viz_dir())?;
            info!("Writing latest frame to {:?}", sink.path());
            Box::new(sink)
        } else {
            Box::new(NullSink)
        };

        let options = RunnerOptions { period: config.period(), max_images: config.max_images() };
        Ok(Self::new(strategy, sink, options))
    }

    pub fn strategy(&self) -> StrategyKind {
        self.info.strategy
    }

    /// Launch the poll loop. A no-op while a loop is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            debug!("image callback thread already started");
            return Ok(());
        }
        let poll = self
            .idle
            .take()
            .ok_or_else(|| anyhow!("image poller state lost after a panicked run"))?;

        self.running.store(true, Ordering::Release);
        if self.info.started_at.is_none() {
            self.info.started_at = Some(Utc::now());
        }
        let handle = thread::Builder::new()
            .name("image-poller".to_string())
            .spawn(move || poll.run())
            .context("Failed to spawn image callback thread")?;
        self.handle = Some(handle);
        info!("Started image callback thread ({})", self.info.strategy);
        Ok(())
    }

    /// Ask the loop to stop and wait for its current poll to finish. A no-op when not started.
    pub fn stop(&mut self) -> Result<()> {
        if self.handle.is_none() {
            return Ok(());
        }
        self.running.store(false, Ordering::Release);
        self.join()?;
        info!("Stopped image callback thread.");
        Ok(())
    }

    /// Block until the loop ends on its own (poll cap or fatal failure).
    /// Never returns for an uncapped loop that keeps succeeding; use [`stop`](Self::stop) for that.
    pub fn wait(&mut self) -> Result<()> {
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let poll = handle
            .join()
            .map_err(|_| anyhow!("image callback thread panicked"))?;
        self.idle = Some(poll);
        Ok(())
    }

    /// True while a poll loop thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn report(&self) -> BenchmarkReport {
        BenchmarkReport::from_metrics(&self.metrics(), &self.info)
    }
}

impl Drop for BenchmarkRunner {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("failed to stop image callback thread: {:#}", e);
        }
    }
}
