//! Immutable captured images and the decoded matrices derived from them.
//!
//! Mirrors `daq_core::data::Frame`: pixel data lives in `bytes::Bytes` so
//! cloning a [`Frame`] or a [`Matrix`] derived from it is O(1), and the
//! backing buffer is released once the last reader drops it.

use bytes::Bytes;
use std::sync::Arc;

/// Pixel encoding of a raw [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// YUV 4:2:2 packed, 2 bytes/pixel.
    Yuyv,
    /// 24-bit BGR, 3 bytes/pixel.
    Bgr888,
    /// 8-bit greyscale, 1 byte/pixel.
    Gray8,
}

/// A single captured image from the device layer.
///
/// Immutable after construction; ownership is shared via `Arc` and the
/// backing buffer is released when the last reference drops.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Bytes,
    /// Monotonically increasing sequence number. 16-bit wrap-around is
    /// expected and must not be treated as an error by consumers.
    pub frame_id: u16,
    /// Capture timestamp in 10-microsecond units (device power-on counter).
    pub timestamp: u32,
    /// Exposure time in 10-microsecond units.
    pub exposure_time: u16,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Bytes,
        frame_id: u16,
        timestamp: u32,
        exposure_time: u16,
    ) -> Self {
        Self {
            width,
            height,
            format,
            data,
            frame_id,
            timestamp,
            exposure_time,
        }
    }

    /// Number of channels implied by `format` (used to size a decoded [`Matrix`]).
    pub fn channels(&self) -> u32 {
        match self.format {
            PixelFormat::Yuyv => 2,
            PixelFormat::Bgr888 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// A decoded height x width x channels image, logically derived from a
/// [`Frame`] by format-specific conversion (YUYV -> BGR, BGR888/GRAY8
/// passthrough). May share storage with its source frame.
#[derive(Debug, Clone)]
pub struct Matrix {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
    pub data: Bytes,
}

impl Matrix {
    pub fn new(height: u32, width: u32, channels: u32, data: Bytes) -> Self {
        Self {
            height,
            width,
            channels,
            data,
        }
    }

    /// Decode a BGR888 or GRAY8 frame as a passthrough view (shares storage).
    /// YUYV frames require an external conversion kernel and are not handled
    /// here; see `kernels::ConvertFn`.
    pub fn passthrough_from_frame(frame: &Frame) -> Option<Self> {
        match frame.format {
            PixelFormat::Bgr888 | PixelFormat::Gray8 => Some(Self {
                height: frame.height,
                width: frame.width,
                channels: frame.channels(),
                data: frame.data.clone(),
            }),
            PixelFormat::Yuyv => None,
        }
    }
}

/// Extra per-frame acquisition metadata carried alongside a matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageMetadata {
    pub exposure_time: Option<u16>,
    pub timestamp: Option<u32>,
}

/// The external delivery record handed to stream listeners/callbacks and
/// returned from `Pipeline::get_stream_data`.
#[derive(Debug, Clone)]
pub struct StreamData {
    pub metadata: Option<ImageMetadata>,
    pub matrix: Option<Matrix>,
    pub source_frame: Option<Arc<Frame>>,
    pub frame_id: u16,
}

impl StreamData {
    /// The empty sentinel returned for unknown, disabled, or not-yet-ready streams.
    pub fn empty() -> Self {
        Self {
            metadata: None,
            matrix: None,
            source_frame: None,
            frame_id: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_none()
    }
}
