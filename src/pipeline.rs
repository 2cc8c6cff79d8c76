//! Public SDK surface: wires the graph, registry, dispatcher and plugin
//! cell together and exposes the operations an application calls.
//!
//! Errors never cross this boundary as `Err`: every public method logs
//! through [`PipelineError`] and returns the documented sentinel (empty
//! `StreamData`, `false`, or a no-op), matching §7's error-handling design.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::{Calibration, Device};
use crate::dispatcher::Dispatcher;
use crate::error::PipelineError;
use crate::frame::StreamData;
use crate::graph::{Graph, Kernels};
use crate::kernels::{CalibrationState, DisparityMethod};
use crate::plugin::Plugin;
use crate::registry::{OnChangeFn, StreamRegistry};
use crate::stream::{Mode, Side, Stream};
use crate::config::PipelineConfig;

type PluginCell = Arc<RwLock<Option<Arc<dyn Plugin>>>>;

pub struct Pipeline<D: Device, C: Calibration> {
    graph: Arc<Graph>,
    registry: StreamRegistry,
    dispatcher: Arc<Dispatcher>,
    device: Arc<D>,
    calibration: Arc<C>,
    plugin: PluginCell,
    calibration_defaulted: bool,
    streaming: AtomicBool,
}

impl<D: Device + 'static, C: Calibration + 'static> Pipeline<D, C> {
    pub fn new(device: Arc<D>, calibration: Arc<C>, config: PipelineConfig) -> Arc<Self> {
        let (model, config_defaulted) = config.resolve_calibration_model();
        if config_defaulted {
            log_pipeline_error(&PipelineError::UnknownCalibrationModel(config.calibration_model.clone()));
        }

        let initial_calibration = CalibrationState {
            intrinsics_left: calibration.get_intrinsics(Stream::Left),
            intrinsics_right: calibration.get_intrinsics(Stream::Right),
            extrinsics: calibration.get_extrinsics(Stream::Left, Stream::Right),
        };

        let graph = Arc::new(Graph::build_with_defaulted(
            model,
            initial_calibration,
            Kernels::default(),
            config_defaulted,
            &config.stage_periods,
        ));

        // Stream-support initializer (§4.3): any stream the device produces
        // natively upgrades its owning stage's target to NATIVE, making the
        // synthetic producer inert for that stream.
        for stream in Stream::ALL {
            if device.supports(stream) {
                if let Some(stage) = graph.stage_for_stream(stream) {
                    stage.set_native(stream);
                }
            }
        }

        let plugin: PluginCell = Arc::new(RwLock::new(None));
        install_plugin_hooks(&graph, &plugin);

        let registry = StreamRegistry::new(Arc::clone(&graph));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&graph)));
        install_notify_hooks(&graph, &dispatcher);

        Arc::new(Self {
            graph,
            registry,
            dispatcher,
            device,
            calibration,
            plugin,
            calibration_defaulted: config_defaulted,
            streaming: AtomicBool::new(false),
        })
    }

    pub fn set_stream_listener<F>(&self, listener: F)
    where
        F: Fn(Stream, &StreamData) + Send + Sync + 'static,
    {
        self.dispatcher.set_listener(Some(Arc::new(listener)));
    }

    pub async fn enable_stream(&self, stream: Stream) -> bool {
        self.enable_stream_with(stream, None, false).await
    }

    pub async fn enable_stream_with(&self, stream: Stream, on_change: Option<OnChangeFn<'_>>, dry_run: bool) -> bool {
        match self.registry.enable(stream, on_change, dry_run).await {
            Ok(()) => true,
            Err(e) => {
                self.log_error(&e);
                false
            }
        }
    }

    pub async fn disable_stream(&self, stream: Stream) -> bool {
        self.disable_stream_with(stream, None, false).await
    }

    pub async fn disable_stream_with(&self, stream: Stream, on_change: Option<OnChangeFn<'_>>, dry_run: bool) -> bool {
        match self.registry.disable(stream, on_change, dry_run).await {
            Ok(()) => true,
            Err(e) => {
                self.log_error(&e);
                false
            }
        }
    }

    pub fn is_stream_enabled(&self, stream: Stream) -> bool {
        self.registry.is_enabled(stream)
    }

    pub fn supports(&self, stream: Stream) -> bool {
        self.registry.supports(stream)
    }

    pub fn supports_mode(&self, stream: Stream) -> Mode {
        self.registry.supports_mode(stream)
    }

    pub fn set_stream_callback<F>(&self, stream: Stream, callback: F) -> bool
    where
        F: Fn(&StreamData) + Send + Sync + 'static,
    {
        self.registry.set_callback(stream, Some(Arc::new(callback)))
    }

    pub fn has_stream_callback(&self, stream: Stream) -> bool {
        self.registry.has_callback(stream)
    }

    /// For NATIVE streams, delegates to the device. For SYNTHETIC, reads the
    /// owning stage's most recent output and extracts the matching half for
    /// paired outputs. For disabled or unknown streams, returns an empty
    /// [`StreamData`].
    pub fn get_stream_data(&self, stream: Stream) -> StreamData {
        match self.supports_mode(stream) {
            Mode::Native => self.device.get_stream_data(stream),
            Mode::Synthetic => self.read_synthetic(stream),
            Mode::None => {
                if self.registry.supports(stream) {
                    self.log_error(&PipelineError::StreamDisabled(stream));
                } else {
                    self.log_error(&PipelineError::UnknownStream(stream));
                }
                StreamData::empty()
            }
        }
    }

    /// NATIVE delegates to the device's full history; SYNTHETIC returns a
    /// single-element sequence built from the latest output.
    pub fn get_stream_datas(&self, stream: Stream) -> Vec<StreamData> {
        match self.supports_mode(stream) {
            Mode::Native => self.device.get_stream_datas(stream),
            Mode::Synthetic => {
                let data = self.read_synthetic(stream);
                if data.is_empty() {
                    Vec::new()
                } else {
                    vec![data]
                }
            }
            Mode::None => Vec::new(),
        }
    }

    fn read_synthetic(&self, stream: Stream) -> StreamData {
        if !self.registry.is_enabled(stream) {
            self.log_error(&PipelineError::StreamDisabled(stream));
            return StreamData::empty();
        }
        let stage = match self.graph.stage_for_stream(stream) {
            Some(stage) => stage,
            None => {
                self.log_error(&PipelineError::UnknownStream(stream));
                return StreamData::empty();
            }
        };
        match stage.latest_output() {
            Some(output) => {
                let side = stage.target_side(stream).unwrap_or(Side::Left);
                let payload = output.side(side);
                StreamData {
                    metadata: payload.metadata.clone(),
                    matrix: Some(payload.matrix.clone()),
                    source_frame: None,
                    frame_id: payload.frame_id,
                }
            }
            None => {
                self.log_error(&PipelineError::PairedOutputNotReady(stream));
                StreamData::empty()
            }
        }
    }

    /// Installs device callbacks for every NATIVE-support stream, wiring
    /// each native arrival into the dispatcher. Idempotent: already-started
    /// streams are left untouched.
    pub fn start_video_streaming(&self) {
        if self.streaming.swap(true, Ordering::AcqRel) {
            return;
        }
        for stream in Stream::ALL {
            if self.supports_mode(stream) == Mode::Native {
                let dispatcher = Arc::clone(&self.dispatcher);
                self.device.set_stream_callback(
                    stream,
                    Arc::new(move |data| dispatcher.dispatch_native(stream, data)),
                    true,
                );
            }
        }
    }

    /// Removes the device callbacks `start_video_streaming` installed. A
    /// no-op if streaming was never started.
    pub fn stop_video_streaming(&self) {
        if !self.streaming.swap(false, Ordering::AcqRel) {
            return;
        }
        for stream in Stream::ALL {
            if self.supports_mode(stream) == Mode::Native {
                self.device.clear_stream_callback(stream);
            }
        }
    }

    pub fn set_plugin(&self, plugin: Arc<dyn Plugin>) {
        *self.plugin.write() = Some(plugin);
    }

    pub fn has_plugin(&self) -> bool {
        self.plugin.read().is_some()
    }

    pub fn set_disparity_method(&self, method: DisparityMethod) {
        self.graph.disparity.set_disparity_method(method);
    }

    /// Refreshes intrinsics/extrinsics from the calibration collaborator and
    /// reloads them into the rectify stage, recomputing derived Points/Depth
    /// parameters. A no-op when calibration defaulting is in effect (the
    /// model was unknown at construction).
    pub async fn notify_calibration_changed(&self) {
        if self.calibration_defaulted {
            tracing::warn!("calibration reload skipped: defaulted calibration model is in effect");
            return;
        }

        let new_state = CalibrationState {
            intrinsics_left: self.calibration.get_intrinsics(Stream::Left),
            intrinsics_right: self.calibration.get_intrinsics(Stream::Right),
            extrinsics: self.calibration.get_extrinsics(Stream::Left, Stream::Right),
        };

        let was_active = self.graph.rectify.is_activated();
        if was_active {
            self.graph.rectify.deactivate(true).await;
        }
        self.graph.rectify.set_calibration(new_state);
        self.graph.recompute_derived_params();
        if was_active {
            self.graph.rectify.activate().await;
        }
    }

    /// Deactivates every stage with `wait=true`, per the teardown contract in §5.
    pub async fn shutdown(&self) {
        for stage in self.graph.stages() {
            stage.deactivate(true).await;
        }
    }

    fn log_error(&self, error: &PipelineError) {
        log_pipeline_error(error);
    }
}

/// Logs a [`PipelineError`] at the level §7 assigns its kind. A free function
/// (rather than a `Pipeline` method) so it's callable from `Pipeline::new`
/// before `Self` exists, and from the `Pipeline` methods that already have one.
fn log_pipeline_error(error: &PipelineError) {
    match error {
        PipelineError::PairedOutputNotReady(_) => {
            tracing::debug!(error = %error, "paired output not ready yet");
        }
        PipelineError::UnknownCalibrationModel(_) => {
            tracing::warn!(error = %error, "unknown calibration model, falling back to pinhole");
        }
        PipelineError::UnknownStream(_) | PipelineError::StreamDisabled(_) | PipelineError::ComputeFailed { .. } => {
            tracing::error!(error = %error, "pipeline operation failed");
        }
    }
}

fn install_plugin_hooks(graph: &Arc<Graph>, plugin: &PluginCell) {
    macro_rules! install {
        ($stage:expr, $method:ident) => {{
            let cell = Arc::clone(plugin);
            $stage.set_process_hook(Arc::new(move |input, output| {
                match cell.read().clone() {
                    Some(p) => p.$method(input, output),
                    None => false,
                }
            }));
        }};
    }
    install!(graph.rectify, on_rectify);
    install!(graph.disparity, on_disparity);
    install!(graph.disparity_normalized, on_disparity_normalized);
    install!(graph.points, on_points);
    install!(graph.depth, on_depth);
}

/// Wires a post-process hook per non-root stage that, on every successful
/// output, notifies each currently-SYNTHETIC target stream's per-stream
/// callback and the pipeline's global listener (§2, §4.1). Targets that are
/// NONE (nobody asked for them) or NATIVE (the device already notified the
/// listener for them in `Dispatcher::dispatch_native`) are skipped.
fn install_notify_hooks(graph: &Arc<Graph>, dispatcher: &Arc<Dispatcher>) {
    for stage in graph.stages() {
        let targets = stage.target_streams();
        if targets.is_empty() {
            continue;
        }
        let stage = Arc::clone(stage);
        let dispatcher = Arc::clone(dispatcher);
        stage.set_post_process_hook(Arc::new(move |output| {
            for stream in &targets {
                let stream = *stream;
                let enabled_mode = stage.target_mode(stream).map(|(_, enabled)| enabled).unwrap_or(Mode::None);
                if enabled_mode != Mode::Synthetic {
                    continue;
                }
                let side = stage.target_side(stream).unwrap_or(Side::Left);
                let payload = output.side(side);
                let data = StreamData {
                    metadata: payload.metadata.clone(),
                    matrix: Some(payload.matrix.clone()),
                    source_frame: None,
                    frame_id: payload.frame_id,
                };
                if let Some(cb) = stage.callback(stream) {
                    cb(&data);
                }
                dispatcher.notify_listener(stream, &data);
            }
        }));
    }
}
