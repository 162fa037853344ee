//! Client side of the simulator image RPC surface.
//!
//! The benchmark only ever talks to the simulator through [`SimulatorClient`],
//! so tests can swap the TCP client for a scripted fake.

pub mod msgpack;
pub use msgpack::MsgpackRpcClient;

use thiserror::Error;

/// Default port the simulator's RPC server listens on.
pub const DEFAULT_PORT: u16 = 41451;

/// Camera image kinds understood by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ImageType {
    #[default]
    Scene = 0,
    DepthPlanar = 1,
    DepthPerspective = 2,
    DepthVis = 3,
    DisparityNormalized = 4,
    Segmentation = 5,
    SurfaceNormals = 6,
    Infrared = 7,
    OpticalFlow = 8,
    OpticalFlowVis = 9,
}

impl ImageType {
    pub fn from_i64(value: i64) -> Option<Self> {
        Some(match value {
            0 => ImageType::Scene,
            1 => ImageType::DepthPlanar,
            2 => ImageType::DepthPerspective,
            3 => ImageType::DepthVis,
            4 => ImageType::DisparityNormalized,
            5 => ImageType::Segmentation,
            6 => ImageType::SurfaceNormals,
            7 => ImageType::Infrared,
            8 => ImageType::OpticalFlow,
            9 => ImageType::OpticalFlowVis,
            _ => return None,
        })
    }

    /// Parse the names used in config files ("scene", "depth_planar", ...).
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "scene" => ImageType::Scene,
            "depth_planar" => ImageType::DepthPlanar,
            "depth_perspective" => ImageType::DepthPerspective,
            "depth_vis" => ImageType::DepthVis,
            "disparity_normalized" => ImageType::DisparityNormalized,
            "segmentation" => ImageType::Segmentation,
            "surface_normals" => ImageType::SurfaceNormals,
            "infrared" => ImageType::Infrared,
            "optical_flow" => ImageType::OpticalFlow,
            "optical_flow_vis" => ImageType::OpticalFlowVis,
            _ => return None,
        })
    }
}

/// One entry of a `simGetImages` batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub camera_name: String,
    pub image_type: ImageType,
    pub pixels_as_float: bool,
    pub compress: bool,
}

impl ImageRequest {
    /// Uncompressed, 8-bit request for `camera_name`.
    pub fn uncompressed(camera_name: impl Into<String>, image_type: ImageType) -> Self {
        Self {
            camera_name: camera_name.into(),
            image_type,
            pixels_as_float: false,
            compress: false,
        }
    }
}

/// One entry of a `simGetImages` reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageResponse {
    pub image_data_uint8: Vec<u8>,
    pub image_data_float: Vec<f32>,
    pub camera_name: String,
    pub image_type: ImageType,
    pub width: u32,
    pub height: u32,
    pub time_stamp: u64,
    pub message: String,
    pub pixels_as_float: bool,
    pub compress: bool,
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("io error, {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode request, {0}")]
    Encode(String),
    #[error("failed to decode reply, {0}")]
    Decode(String),
    #[error("protocol error, {0}")]
    Protocol(String),
    #[error("{0}")]
    Remote(String),
    #[error("simulator returned an empty image for camera '{0}'")]
    EmptyImage(String),
}

/// The subset of the simulator RPC API the image benchmark calls.
pub trait SimulatorClient: Send {
    /// Handshake performed once before sampling starts.
    fn confirm_connection(&mut self) -> Result<(), RpcError>;

    /// Fetch one image as the raw byte buffer the simulator returns.
    fn sim_get_image(
        &mut self,
        camera_name: &str,
        image_type: ImageType,
        vehicle_name: &str,
    ) -> Result<Vec<u8>, RpcError>;

    /// Fetch a batch of images described by `requests`.
    fn sim_get_images(
        &mut self,
        requests: &[ImageRequest],
        vehicle_name: &str,
    ) -> Result<Vec<ImageResponse>, RpcError>;
}
