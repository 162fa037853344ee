// SPDX-FileCopyrightText: 2025 Russ Fellows <russ.fellows@gmail.com>
// SPDX-License-Identifier: GPL-3.0-or-later

// crates/core/src/config/bench_config.rs
use serde::{Deserialize, Serialize};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use simbench_rpc::{ImageType, DEFAULT_PORT};

use crate::frame::FrameShape;
use crate::strategy::StrategyKind;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_CAMERA: &str = "fpv_cam";
pub const DEFAULT_TIMEOUT_SECS: u64 = 3600;
pub const DEFAULT_DURATION_SECS: u64 = 30;
pub const DEFAULT_PERIOD_MS: u64 = 50;
pub const DEFAULT_VIZ_DIR: &str = "frames";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BenchConfig {
    pub simulator: Option<Simulator>, // host/port/timeout of the RPC server
    pub camera: Option<Camera>,       // which camera to pull and how to shape it
    pub run: Option<Run>,             // strategy, cadence, duration
    pub viz: Option<Viz>,             // optional frame dumping
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Simulator {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Camera {
    #[serde(alias = "camera_name")]
    pub name: Option<String>,
    pub vehicle_name: Option<String>,
    pub image_type: Option<String>,     // "scene" | "depth_planar" | ...
    pub single_image_shape: Option<FrameShape>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Run {
    #[serde(alias = "img_benchmark_type")]
    pub strategy: Option<StrategyKind>,
    pub duration_secs: Option<u64>,
    pub period_ms: Option<u64>,
    pub max_images: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Viz {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
}

impl BenchConfig {
    /// Parse config from JSON string
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|e| anyhow::anyhow!("Failed to parse benchmark JSON config: {}", e))
    }

    /// Parse config from YAML string by converting to JSON first
    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        let yaml_value: serde_yaml::Value =
            serde_yaml::from_str(yaml_str).map_err(|e| anyhow::anyhow!("Failed to parse YAML: {}", e))?;

        // An empty document is a valid "all defaults" config
        if yaml_value.is_null() {
            return Ok(Self::default());
        }

        let json_str =
            serde_json::to_string(&yaml_value).map_err(|e| anyhow::anyhow!("Failed to convert YAML to JSON: {}", e))?;

        Self::from_json(&json_str)
    }

    /// Load config from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;
        Self::from_yaml(&text)
    }

    pub fn host(&self) -> &str {
        self.simulator.as_ref().and_then(|s| s.host.as_deref()).unwrap_or(DEFAULT_HOST)
    }

    pub fn port(&self) -> u16 {
        self.simulator.as_ref().and_then(|s| s.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(
            self.simulator.as_ref().and_then(|s| s.timeout_secs).unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn camera_name(&self) -> &str {
        self.camera.as_ref().and_then(|c| c.name.as_deref()).unwrap_or(DEFAULT_CAMERA)
    }

    pub fn vehicle_name(&self) -> &str {
        self.camera.as_ref().and_then(|c| c.vehicle_name.as_deref()).unwrap_or("")
    }

    /// Resolve the configured image type name, defaulting to Scene.
    pub fn image_type(&self) -> Result<ImageType> {
        match self.camera.as_ref().and_then(|c| c.image_type.as_deref()) {
            None => Ok(ImageType::Scene),
            Some(name) => ImageType::from_name(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown image type '{}'", name)),
        }
    }

    /// Frame shape assumed for `simGetImage` buffers, which carry no dimensions.
    pub fn single_image_shape(&self) -> FrameShape {
        self.camera
            .as_ref()
            .and_then(|c| c.single_image_shape)
            .unwrap_or_default()
    }

    pub fn strategy(&self) -> StrategyKind {
        self.run.as_ref().and_then(|r| r.strategy).unwrap_or_default()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.run.as_ref().and_then(|r| r.duration_secs).unwrap_or(DEFAULT_DURATION_SECS))
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.run.as_ref().and_then(|r| r.period_ms).unwrap_or(DEFAULT_PERIOD_MS))
    }

    pub fn max_images(&self) -> Option<u64> {
        self.run.as_ref().and_then(|r| r.max_images)
    }

    pub fn viz_enabled(&self) -> bool {
        self.viz.as_ref().map_or(false, |v| v.enabled.unwrap_or(false))
    }

    pub fn viz_dir(&self) -> PathBuf {
        self.viz
            .as_ref()
            .and_then(|v| v.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VIZ_DIR))
    }

    pub fn simulator_mut(&mut self) -> &mut Simulator {
        self.simulator.get_or_insert_with(Simulator::default)
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        self.camera.get_or_insert_with(Camera::default)
    }

    pub fn run_mut(&mut self) -> &mut Run {
        self.run.get_or_insert_with(Run::default)
    }

    pub fn viz_mut(&mut self) -> &mut Viz {
        self.viz.get_or_insert_with(Viz::default)
    }

    /// Reject settings the runner cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.host().is_empty() {
            bail!("simulator.host must not be empty");
        }
        if self.port() == 0 {
            bail!("simulator.port must be non-zero");
        }
        if self.rpc_timeout().is_zero() {
            bail!("simulator.timeout_secs must be non-zero");
        }
        if self.camera_name().is_empty() {
            bail!("camera.name must not be empty");
        }
        self.image_type()?;
        let shape = self.single_image_shape();
        if shape.is_empty() {
            bail!("camera.single_image_shape must have non-zero dimensions, got {}", shape);
        }
        if self.duration().is_zero() {
            bail!("run.duration_secs must be non-zero");
        }
        if self.max_images() == Some(0) {
            bail!("run.max_images must be non-zero when set");
        }
        Ok(())
    }
}
