//! Integration coverage for the plugin hook surface (Scenario 3): a plugin
//! that fully satisfies a stage's output must short-circuit that stage's
//! built-in kernel while downstream stages and listeners still fire.
//!
//! Run with:
//! ```bash
//! cargo test --test plugin_override_integration
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stereo_pipeline::device::{MockCalibration, MockDevice};
use stereo_pipeline::frame::{Matrix, StreamData};
use stereo_pipeline::stage_io::{Payload, StageInput, StageOutput, StagePayload};
use stereo_pipeline::{Pipeline, PipelineConfig, Plugin, Stream};

use bytes::Bytes;

// =============================================================================
// Test Helper Functions
// =============================================================================

fn frame(frame_id: u16) -> StreamData {
    StreamData {
        metadata: None,
        matrix: Some(Matrix::new(2, 2, 1, Bytes::from_static(&[9, 9, 9, 9]))),
        source_frame: None,
        frame_id,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

/// Answers `on_rectify` with a precomputed paired output tagged with a
/// distinctive frame_id offset, and counts how many times each hook fired.
struct RectifyOverridePlugin {
    rectify_calls: AtomicUsize,
    disparity_calls: AtomicUsize,
}

impl RectifyOverridePlugin {
    fn new() -> Self {
        Self {
            rectify_calls: AtomicUsize::new(0),
            disparity_calls: AtomicUsize::new(0),
        }
    }
}

impl Plugin for RectifyOverridePlugin {
    fn on_rectify(&self, input: &StageInput, output: &mut StageOutput) -> bool {
        self.rectify_calls.fetch_add(1, Ordering::SeqCst);
        let (left, right) = match input {
            StagePayload::Paired { left, right } => (left.clone(), right.clone()),
            StagePayload::Single(p) => (p.clone(), p.clone()),
        };
        *output = StagePayload::Paired {
            left: Payload::new(left.matrix.clone(), left.frame_id, left.metadata.clone()),
            right: Payload::new(right.matrix.clone(), right.frame_id, right.metadata.clone()),
        };
        true
    }

    fn on_disparity(&self, _input: &StageInput, _output: &mut StageOutput) -> bool {
        self.disparity_calls.fetch_add(1, Ordering::SeqCst);
        false
    }
}

#[tokio::test]
async fn plugin_rectify_override_short_circuits_the_kernel_but_downstream_still_runs() {
    let device = Arc::new(MockDevice::new(vec![Stream::Left, Stream::Right]));
    let calibration = Arc::new(MockCalibration::new());
    let pipeline = Pipeline::new(Arc::clone(&device), calibration, PipelineConfig::default());

    let plugin = Arc::new(RectifyOverridePlugin::new());
    pipeline.set_plugin(Arc::clone(&plugin) as Arc<dyn Plugin>);
    assert!(pipeline.has_plugin());

    let seen: Arc<Mutex<Vec<Stream>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    pipeline.set_stream_listener(move |stream, _data| {
        seen_clone.lock().unwrap().push(stream);
    });

    assert!(pipeline.enable_stream(Stream::Disparity).await);
    pipeline.start_video_streaming();

    device.push_frame(Stream::Left, frame(20));
    device.push_frame(Stream::Right, frame(20));
    settle().await;

    // The plugin's rectify hook ran instead of the built-in kernel, and the
    // downstream disparity stage still computed from its output.
    assert_eq!(plugin.rectify_calls.load(Ordering::SeqCst), 1);
    assert!(!pipeline.get_stream_data(Stream::LeftRectified).is_empty());
    assert!(!pipeline.get_stream_data(Stream::RightRectified).is_empty());
    assert_eq!(pipeline.get_stream_data(Stream::Disparity).frame_id, 20);

    // LEFT_RECTIFIED/RIGHT_RECTIFIED listeners fire even though the plugin,
    // not the kernel, produced their data.
    let seen = seen.lock().unwrap().clone();
    assert!(seen.contains(&Stream::LeftRectified));
    assert!(seen.contains(&Stream::RightRectified));

    pipeline.shutdown().await;
}

#[tokio::test]
async fn declining_plugin_hook_falls_through_to_the_builtin_kernel() {
    let device = Arc::new(MockDevice::new(vec![Stream::Left, Stream::Right]));
    let calibration = Arc::new(MockCalibration::new());
    let pipeline = Pipeline::new(Arc::clone(&device), calibration, PipelineConfig::default());

    let plugin = Arc::new(RectifyOverridePlugin::new());
    pipeline.set_plugin(Arc::clone(&plugin) as Arc<dyn Plugin>);

    assert!(pipeline.enable_stream(Stream::Disparity).await);
    pipeline.start_video_streaming();

    device.push_frame(Stream::Left, frame(1));
    device.push_frame(Stream::Right, frame(1));
    settle().await;

    // on_disparity always declines; the built-in (passthrough) kernel ran.
    assert!(plugin.disparity_calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(pipeline.get_stream_data(Stream::Disparity).frame_id, 1);

    pipeline.shutdown().await;
}
