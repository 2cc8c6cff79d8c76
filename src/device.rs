//! External collaborator traits the dispatcher and pipeline consume, plus
//! a deterministic mock implementation of each for tests — grounded on the
//! `MockStage` pattern (RwLock-guarded state, no factory wiring needed).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::PipelineResult;
use crate::frame::StreamData;
use crate::kernels::{Extrinsics, Intrinsics};
use crate::stream::Stream;

/// The capture device: produces native frames, answers capability queries,
/// and owns start/stop of physical acquisition.
#[async_trait]
pub trait Device: Send + Sync {
    fn supports(&self, stream: Stream) -> bool;

    /// Register (or replace, if `replace`) the callback invoked for each
    /// native frame on `stream`. Returns `false` if a callback already
    /// exists and `replace` is `false`.
    fn set_stream_callback(&self, stream: Stream, callback: Arc<dyn Fn(StreamData) + Send + Sync>, replace: bool) -> bool;

    /// Remove whatever callback is installed for `stream`, if any. Used by
    /// `Pipeline::stop_video_streaming` to tear down the callbacks
    /// `start_video_streaming` installed.
    fn clear_stream_callback(&self, stream: Stream);

    fn get_stream_data(&self, stream: Stream) -> StreamData;

    fn get_stream_datas(&self, stream: Stream) -> Vec<StreamData>;

    async fn start(&self, source: Stream) -> PipelineResult<()>;

    async fn stop(&self, source: Stream) -> PipelineResult<()>;

    async fn wait_for_streams(&self);
}

/// Calibration data source, consulted by `Pipeline::notify_calibration_changed`.
pub trait Calibration: Send + Sync {
    fn get_intrinsics(&self, stream: Stream) -> Intrinsics;
    fn get_extrinsics(&self, from: Stream, to: Stream) -> Extrinsics;
}

struct MockDeviceState {
    supported: Vec<Stream>,
    callbacks: HashMap<Stream, Arc<dyn Fn(StreamData) + Send + Sync>>,
    latest: HashMap<Stream, StreamData>,
    started: Vec<Stream>,
}

/// Deterministic test double: reports a fixed set of natively-supported
/// streams, records installed callbacks, and serves canned `StreamData`
/// from `push_frame` for `get_stream_data`/`get_stream_datas`.
pub struct MockDevice {
    state: RwLock<MockDeviceState>,
}

impl MockDevice {
    pub fn new(supported: Vec<Stream>) -> Self {
        Self {
            state: RwLock::new(MockDeviceState {
                supported,
                callbacks: HashMap::new(),
                latest: HashMap::new(),
                started: Vec::new(),
            }),
        }
    }

    /// Simulate a native frame arriving: records it for `get_stream_data`
    /// and invokes any installed callback, as the real device would.
    pub fn push_frame(&self, stream: Stream, data: StreamData) {
        let callback = {
            let mut state = self.state.write();
            state.latest.insert(stream, data.clone());
            state.callbacks.get(&stream).cloned()
        };
        if let Some(callback) = callback {
            callback(data);
        }
    }

    pub fn is_started(&self, stream: Stream) -> bool {
        self.state.read().started.contains(&stream)
    }

    pub fn has_callback(&self, stream: Stream) -> bool {
        self.state.read().callbacks.contains_key(&stream)
    }
}

#[async_trait]
impl Device for MockDevice {
    fn supports(&self, stream: Stream) -> bool {
        self.state.read().supported.contains(&stream)
    }

    fn set_stream_callback(&self, stream: Stream, callback: Arc<dyn Fn(StreamData) + Send + Sync>, replace: bool) -> bool {
        let mut state = self.state.write();
        if state.callbacks.contains_key(&stream) && !replace {
            return false;
        }
        state.callbacks.insert(stream, callback);
        true
    }

    fn clear_stream_callback(&self, stream: Stream) {
        self.state.write().callbacks.remove(&stream);
    }

    fn get_stream_data(&self, stream: Stream) -> StreamData {
        self.state.read().latest.get(&stream).cloned().unwrap_or_else(StreamData::empty)
    }

    fn get_stream_datas(&self, stream: Stream) -> Vec<StreamData> {
        match self.state.read().latest.get(&stream) {
            Some(data) => vec![data.clone()],
            None => Vec::new(),
        }
    }

    async fn start(&self, source: Stream) -> PipelineResult<()> {
        let mut state = self.state.write();
        if !state.started.contains(&source) {
            state.started.push(source);
        }
        Ok(())
    }

    async fn stop(&self, source: Stream) -> PipelineResult<()> {
        self.state.write().started.retain(|s| *s != source);
        Ok(())
    }

    async fn wait_for_streams(&self) {}
}

/// Deterministic calibration double; returns whatever was seeded, defaulting
/// to `Default::default()` for unseeded streams/pairs.
pub struct MockCalibration {
    intrinsics: RwLock<HashMap<Stream, Intrinsics>>,
    extrinsics: RwLock<HashMap<(Stream, Stream), Extrinsics>>,
}

impl MockCalibration {
    pub fn new() -> Self {
        Self {
            intrinsics: RwLock::new(HashMap::new()),
            extrinsics: RwLock::new(HashMap::new()),
        }
    }

    pub fn seed_intrinsics(&self, stream: Stream, intrinsics: Intrinsics) {
        self.intrinsics.write().insert(stream, intrinsics);
    }

    pub fn seed_extrinsics(&self, from: Stream, to: Stream, extrinsics: Extrinsics) {
        self.extrinsics.write().insert((from, to), extrinsics);
    }
}

impl Default for MockCalibration {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibration for MockCalibration {
    fn get_intrinsics(&self, stream: Stream) -> Intrinsics {
        self.intrinsics.read().get(&stream).cloned().unwrap_or_default()
    }

    fn get_extrinsics(&self, from: Stream, to: Stream) -> Extrinsics {
        self.extrinsics.read().get(&(from, to)).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Matrix;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn data(frame_id: u16) -> StreamData {
        StreamData {
            metadata: None,
            matrix: Some(Matrix::new(1, 1, 1, Bytes::from_static(&[0]))),
            source_frame: None,
            frame_id,
        }
    }

    #[test]
    fn supports_reflects_seeded_set() {
        let device = MockDevice::new(vec![Stream::Left, Stream::Right]);
        assert!(device.supports(Stream::Left));
        assert!(!device.supports(Stream::Depth));
    }

    #[test]
    fn get_stream_data_is_empty_until_a_frame_is_pushed() {
        let device = MockDevice::new(vec![Stream::Left]);
        assert!(device.get_stream_data(Stream::Left).is_empty());
        device.push_frame(Stream::Left, data(1));
        assert_eq!(device.get_stream_data(Stream::Left).frame_id, 1);
    }

    #[test]
    fn callback_replace_policy_is_honored() {
        let device = MockDevice::new(vec![Stream::Left]);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        assert!(device.set_stream_callback(Stream::Left, Arc::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }), false));

        let count_clone2 = Arc::clone(&count);
        assert!(!device.set_stream_callback(Stream::Left, Arc::new(move |_| {
            count_clone2.fetch_add(100, Ordering::SeqCst);
        }), false));

        device.push_frame(Stream::Left, data(1));
        assert_eq!(count.load(Ordering::SeqCst), 1, "the second (non-replacing) callback must not have installed");
    }

    #[test]
    fn clear_stream_callback_removes_it() {
        let device = MockDevice::new(vec![Stream::Left]);
        device.set_stream_callback(Stream::Left, Arc::new(|_| {}), false);
        assert!(device.has_callback(Stream::Left));
        device.clear_stream_callback(Stream::Left);
        assert!(!device.has_callback(Stream::Left));
    }

    #[tokio::test]
    async fn start_stop_tracks_started_sources() {
        let device = MockDevice::new(vec![Stream::Left]);
        device.start(Stream::Left).await.unwrap();
        assert!(device.is_started(Stream::Left));
        device.stop(Stream::Left).await.unwrap();
        assert!(!device.is_started(Stream::Left));
    }

    #[test]
    fn calibration_defaults_when_unseeded() {
        let calibration = MockCalibration::new();
        assert_eq!(calibration.get_intrinsics(Stream::Left).focal_length, (0.0, 0.0));
    }
}
