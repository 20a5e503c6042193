//! facecheck-hw — V4L2 camera capture.
//!
//! Opens the kiosk webcam, negotiates a pixel format that converts cheaply
//! to grayscale, and hands out [`Frame`]s for the recognition pipeline.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraOptions, Capture, DeviceInfo, FrameSource};
pub use frame::{Frame, PixelFormat};
