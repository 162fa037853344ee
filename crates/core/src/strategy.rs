use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use simbench_rpc::{ImageRequest, ImageType, RpcError, SimulatorClient};

use crate::frame::{FrameShape, ImageSample, ShapeMismatch};

/// Channels in an uncompressed `simGetImages` frame.
const BATCH_CHANNELS: usize = 4;

/// Which simulator call the benchmark hammers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StrategyKind {
    /// `simGetImage`: one camera, raw buffer, shape taken from config.
    #[serde(rename = "simGetImage")]
    SimGetImage,
    /// `simGetImages`: batch request, shape read from the response.
    #[default]
    #[serde(rename = "simGetImages")]
    SimGetImages,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SimGetImage => "simGetImage",
            StrategyKind::SimGetImages => "simGetImages",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "simGetImage" => Ok(StrategyKind::SimGetImage),
            "simGetImages" => Ok(StrategyKind::SimGetImages),
            other => Err(anyhow::anyhow!(
                "Unsupported benchmark type '{}'. Use 'simGetImage' or 'simGetImages'",
                other
            )),
        }
    }
}

#[derive(Error, Debug)]
pub enum SampleError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),
    #[error("simGetImages returned no responses")]
    EmptyBatch,
}

/// What the poll loop does after a failed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Continue,
    Abort,
}

/// Where to point the camera calls.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraTarget {
    pub camera_name: String,
    pub vehicle_name: String,
    pub image_type: ImageType,
}

impl CameraTarget {
    pub fn new(camera_name: impl Into<String>) -> Self {
        Self {
            camera_name: camera_name.into(),
            vehicle_name: String::new(),
            image_type: ImageType::Scene,
        }
    }
}

/// One way of pulling a frame from the simulator.
pub trait SamplingStrategy: Send {
    fn kind(&self) -> StrategyKind;

    fn camera_name(&self) -> &str;

    /// Issue one RPC call and decode its reply.
    fn sample(&mut self) -> Result<ImageSample, SampleError>;

    /// Decide whether the poll loop survives `err`. Failures are fatal unless overridden.
    fn on_failure(&mut self, _err: &SampleError) -> FailureAction {
        FailureAction::Abort
    }
}

/// `simGetImage` against a camera whose frame shape is known up front.
pub struct SingleImageFetch<C> {
    client: C,
    target: CameraTarget,
    shape: FrameShape,
}

impl<C: SimulatorClient> SingleImageFetch<C> {
    pub fn new(client: C, target: CameraTarget, shape: FrameShape) -> Self {
        Self { client, target, shape }
    }
}

impl<C: SimulatorClient> SamplingStrategy for SingleImageFetch<C> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SimGetImage
    }

    fn camera_name(&self) -> &str {
        &self.target.camera_name
    }

    fn sample(&mut self) -> Result<ImageSample, SampleError> {
        let bytes = self.client.sim_get_image(
            &self.target.camera_name,
            self.target.image_type,
            &self.target.vehicle_name,
        )?;
        Ok(ImageSample::from_raw(&self.target.camera_name, bytes, self.shape)?)
    }
}

/// `simGetImages` with a single uncompressed request.
pub struct BatchImageFetch<C> {
    client: C,
    target: CameraTarget,
    requests: [ImageRequest; 1],
}

impl<C: SimulatorClient> BatchImageFetch<C> {
    pub fn new(client: C, target: CameraTarget) -> Self {
        let requests = [ImageRequest::uncompressed(&target.camera_name, target.image_type)];
        Self { client, target, requests }
    }
}

impl<C: SimulatorClient> SamplingStrategy for BatchImageFetch<C> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SimGetImages
    }

    fn camera_name(&self) -> &str {
        &self.target.camera_name
    }

    fn sample(&mut self) -> Result<ImageSample, SampleError> {
        let mut responses = self.client.sim_get_images(&self.requests, &self.target.vehicle_name)?;
        if responses.is_empty() {
            return Err(SampleError::EmptyBatch);
        }
        let response = responses.swap_remove(0);
        let shape = FrameShape::new(response.height as usize, response.width as usize, BATCH_CHANNELS);
        Ok(ImageSample::from_raw(&self.target.camera_name, response.image_data_uint8, shape)?)
    }

    fn on_failure(&mut self, err: &SampleError) -> FailureAction {
        match err {
            SampleError::Rpc(e) => {
                warn!("{}", e);
                warn!("Are your camera name & vehicle name correct?");
                FailureAction::Continue
            }
            _ => FailureAction::Abort,
        }
    }
}

/// Bind `kind` to a concrete strategy over `client`.
pub fn build_strategy<C>(
    kind: StrategyKind,
    client: C,
    target: CameraTarget,
    single_image_shape: FrameShape,
) -> Box<dyn SamplingStrategy>
where
    C: SimulatorClient + 'static,
{
    match kind {
        StrategyKind::SimGetImage => Box::new(SingleImageFetch::new(client, target, single_image_shape)),
        StrategyKind::SimGetImages => Box::new(BatchImageFetch::new(client, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simbench_rpc::ImageResponse;

    struct StubClient {
        image: Result<Vec<u8>, String>,
        batch: Vec<ImageResponse>,
        last_requests: Vec<ImageRequest>,
    }

    impl StubClient {
        fn new() -> Self {
            Self { image: Ok(Vec::new()), batch: Vec::new(), last_requests: Vec::new() }
        }
    }

    impl SimulatorClient for StubClient {
        fn confirm_connection(&mut self) -> Result<(), RpcError> {
            Ok(())
        }

        fn sim_get_image(&mut self, _: &str, _: ImageType, _: &str) -> Result<Vec<u8>, RpcError> {
            self.image.clone().map_err(RpcError::Remote)
        }

        fn sim_get_images(
            &mut self,
            requests: &[ImageRequest],
            _: &str,
        ) -> Result<Vec<ImageResponse>, RpcError> {
            self.last_requests = requests.to_vec();
            Ok(self.batch.clone())
        }
    }

    #[test]
    fn strategy_kind_parses_cli_names() {
        assert_eq!("simGetImage".parse::<StrategyKind>().unwrap(), StrategyKind::SimGetImage);
        assert_eq!("simGetImages".parse::<StrategyKind>().unwrap(), StrategyKind::SimGetImages);
        assert!("simgetimages".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::default().to_string(), "simGetImages");
    }

    #[test]
    fn single_image_uses_configured_shape() {
        let mut client = StubClient::new();
        client.image = Ok(vec![9u8; 2 * 2 * 3]);
        let mut strategy =
            SingleImageFetch::new(client, CameraTarget::new("fpv_cam"), FrameShape::new(2, 2, 3));
        let sample = strategy.sample().unwrap();
        assert_eq!(sample.shape(), FrameShape::new(2, 2, 3));
        assert_eq!(sample.camera_name, "fpv_cam");
    }

    #[test]
    fn single_image_failures_are_fatal() {
        let mut client = StubClient::new();
        client.image = Err("connection reset".to_string());
        let mut strategy = SingleImageFetch::new(client, CameraTarget::new("fpv_cam"), FrameShape::default());
        let err = strategy.sample().unwrap_err();
        assert!(matches!(err, SampleError::Rpc(_)));
        assert_eq!(strategy.on_failure(&err), FailureAction::Abort);
    }

    #[test]
    fn batch_reads_shape_from_response() {
        let mut client = StubClient::new();
        client.batch = vec![ImageResponse {
            image_data_uint8: vec![1u8; 480 * 640 * 4],
            height: 480,
            width: 640,
            ..Default::default()
        }];
        let mut strategy = BatchImageFetch::new(client, CameraTarget::new("front_center"));
        let sample = strategy.sample().unwrap();
        assert_eq!(sample.shape(), FrameShape::new(480, 640, 4));

        let sent = &strategy.client.last_requests;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].camera_name, "front_center");
        assert!(!sent[0].compress);
        assert!(!sent[0].pixels_as_float);
    }

    #[test]
    fn batch_tolerates_rpc_errors_only() {
        let mut strategy = BatchImageFetch::new(StubClient::new(), CameraTarget::new("fpv_cam"));
        let rpc = SampleError::Rpc(RpcError::Remote("no camera".to_string()));
        assert_eq!(strategy.on_failure(&rpc), FailureAction::Continue);

        let err = strategy.sample().unwrap_err();
        assert!(matches!(err, SampleError::EmptyBatch));
        assert_eq!(strategy.on_failure(&err), FailureAction::Abort);
    }

    #[test]
    fn build_strategy_binds_kind() {
        let s = build_strategy(StrategyKind::SimGetImage, StubClient::new(), CameraTarget::new("a"), FrameShape::default());
        assert_eq!(s.kind(), StrategyKind::SimGetImage);
        let s = build_strategy(StrategyKind::SimGetImages, StubClient::new(), CameraTarget::new("b"), FrameShape::default());
        assert_eq!(s.kind(), StrategyKind::SimGetImages);
        assert_eq!(s.camera_name(), "b");
    }
}
