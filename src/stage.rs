//! A node in the pipeline DAG: activation, single-slot mailbox, child
//! fan-out and the process/post-process hook pair.
//!
//! The mailbox is a `tokio::sync::watch` channel rather than a bounded
//! `mpsc`: a `watch` sender always holds exactly the most recently sent
//! value, which is precisely the "new input replaces any queued input"
//! semantics §5 calls for, with none of the bookkeeping a hand-rolled
//! single-slot exchange would need.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::error::{PipelineError, PipelineResult};
use crate::frame::StreamData;
use crate::kernels::{
    CalibrationState, DepthFn, DepthParams, DisparityFn, DisparityMethod, NormalizeFn, PointsFn,
    PointsParams, RectifyFn,
};
use crate::stage_io::{Payload, StageInput, StageOutput, StagePayload};
use crate::stream::{Mode, Side, Stream};

pub type StageId = u32;

/// Which kind of node this is. Used by the graph builder and the plugin
/// wiring to dispatch without a trait-object-per-stage indirection; the
/// topology builder is the only other site that cares about concrete kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Root,
    Rectify,
    Disparity,
    DisparityNormalized,
    Points,
    Depth,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Root => "root",
            StageKind::Rectify => "rectify",
            StageKind::Disparity => "disparity",
            StageKind::DisparityNormalized => "disparity_normalized",
            StageKind::Points => "points",
            StageKind::Depth => "depth",
        }
    }
}

/// A produced stream's registration on a stage: support/enabled mode, the
/// side it extracts from a paired output (if any), and an optional per-stream
/// delivery callback.
pub struct TargetStream {
    pub stream: Stream,
    pub support_mode: Mode,
    pub enabled_mode: Mode,
    pub side: Option<Side>,
    pub callback: Option<Arc<dyn Fn(&StreamData) + Send + Sync>>,
}

impl TargetStream {
    pub fn new(stream: Stream, support_mode: Mode, enabled_mode: Mode) -> Self {
        Self {
            stream,
            support_mode,
            enabled_mode,
            side: None,
            callback: None,
        }
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }
}

pub type ProcessHookFn = Arc<dyn Fn(&StageInput, &mut StageOutput) -> bool + Send + Sync>;
pub type PostProcessHookFn = Arc<dyn Fn(&StageOutput) + Send + Sync>;

/// The kernel(s) a stage invokes when no process hook short-circuits it,
/// plus whatever calibration-derived state that kernel reads. Tagged by
/// kind rather than stored behind one generic trait object, per the
/// "tagged variant over known stage kinds" design note.
pub enum StageCompute {
    /// Topology-only; the dispatcher routes around Root in normal operation,
    /// but a direct `submit` still has defined (identity) behavior.
    Root,
    Rectify {
        kernel: RectifyFn,
        calibration: Arc<RwLock<CalibrationState>>,
    },
    Disparity {
        kernel: DisparityFn,
        method: Arc<RwLock<DisparityMethod>>,
    },
    DisparityNormalized {
        kernel: NormalizeFn,
    },
    Points {
        kernel: PointsFn,
        params: Arc<RwLock<PointsParams>>,
    },
    Depth {
        kernel: DepthFn,
        params: Arc<RwLock<DepthParams>>,
    },
}

pub struct Stage {
    pub id: StageId,
    pub name: &'static str,
    pub kind: StageKind,
    period: u32,
    targets: RwLock<Vec<TargetStream>>,
    children: RwLock<Vec<Arc<Stage>>>,
    active: AtomicBool,
    compute: StageCompute,
    process_hook: RwLock<Option<ProcessHookFn>>,
    post_process_hook: RwLock<Option<PostProcessHookFn>>,
    latest_output: RwLock<Option<StageOutput>>,
    input_counter: AtomicU64,
    mailbox_tx: watch::Sender<Option<StageInput>>,
    mailbox_rx: watch::Receiver<Option<StageInput>>,
    stop_notify: Notify,
    worker_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Stage {
    pub fn new(id: StageId, name: &'static str, kind: StageKind, period: u32, compute: StageCompute) -> Arc<Self> {
        let (tx, rx) = watch::channel(None);
        Arc::new(Self {
            id,
            name,
            kind,
            period,
            targets: RwLock::new(Vec::new()),
            children: RwLock::new(Vec::new()),
            active: AtomicBool::new(false),
            compute,
            process_hook: RwLock::new(None),
            post_process_hook: RwLock::new(None),
            latest_output: RwLock::new(None),
            input_counter: AtomicU64::new(0),
            mailbox_tx: tx,
            mailbox_rx: rx,
            stop_notify: Notify::new(),
            worker_handle: AsyncMutex::new(None),
        })
    }

    // -- construction-time contract (must be called before first activation) --

    pub fn add_child(&self, child: Arc<Stage>) {
        self.children.write().push(child);
    }

    pub fn add_target_stream(&self, target: TargetStream) {
        self.targets.write().push(target);
    }

    pub fn children(&self) -> Vec<Arc<Stage>> {
        self.children.read().clone()
    }

    pub fn set_process_hook(&self, f: ProcessHookFn) {
        *self.process_hook.write() = Some(f);
    }

    pub fn set_post_process_hook(&self, f: PostProcessHookFn) {
        *self.post_process_hook.write() = Some(f);
    }

    // -- target stream bookkeeping (registry support) --

    pub fn target_mode(&self, stream: Stream) -> Option<(Mode, Mode)> {
        self.targets
            .read()
            .iter()
            .find(|t| t.stream == stream)
            .map(|t| (t.support_mode, t.enabled_mode))
    }

    pub fn target_side(&self, stream: Stream) -> Option<Side> {
        self.targets.read().iter().find(|t| t.stream == stream).and_then(|t| t.side)
    }

    pub fn has_any_enabled_target(&self) -> bool {
        self.targets.read().iter().any(|t| t.enabled_mode != Mode::None)
    }

    pub fn target_streams(&self) -> Vec<Stream> {
        self.targets.read().iter().map(|t| t.stream).collect()
    }

    /// Streams currently at `mode`, without mutating anything (the `dry_run` peek).
    pub fn targets_with_mode(&self, mode: Mode) -> Vec<Stream> {
        self.targets.read().iter().filter(|t| t.enabled_mode == mode).map(|t| t.stream).collect()
    }

    /// Upgrade a target to device-native production: both `support_mode`
    /// and `enabled_mode` become `NATIVE`, making the synthetic producer
    /// inert for that stream. Used once by the stream-support initializer.
    pub fn set_native(&self, stream: Stream) {
        let mut targets = self.targets.write();
        if let Some(t) = targets.iter_mut().find(|t| t.stream == stream) {
            t.support_mode = Mode::Native;
            t.enabled_mode = Mode::Native;
        }
    }

    /// Flip every target whose `enabled_mode` is currently `from` to `to`.
    /// Returns the streams that were actually changed.
    pub fn flip_targets(&self, from: Mode, to: Mode) -> Vec<Stream> {
        let mut changed = Vec::new();
        let mut targets = self.targets.write();
        for t in targets.iter_mut() {
            if t.enabled_mode == from {
                t.enabled_mode = to;
                changed.push(t.stream);
            }
        }
        changed
    }

    pub fn set_callback(&self, stream: Stream, callback: Option<Arc<dyn Fn(&StreamData) + Send + Sync>>) -> bool {
        let mut targets = self.targets.write();
        if let Some(t) = targets.iter_mut().find(|t| t.stream == stream) {
            t.callback = callback;
            true
        } else {
            false
        }
    }

    pub fn has_callback(&self, stream: Stream) -> bool {
        self.targets
            .read()
            .iter()
            .find(|t| t.stream == stream)
            .map(|t| t.callback.is_some())
            .unwrap_or(false)
    }

    pub fn callback(&self, stream: Stream) -> Option<Arc<dyn Fn(&StreamData) + Send + Sync>> {
        self.targets
            .read()
            .iter()
            .find(|t| t.stream == stream)
            .and_then(|t| t.callback.clone())
    }

    // -- latest output (for SYNTHETIC stream_data reads) --

    pub fn latest_output(&self) -> Option<StageOutput> {
        self.latest_output.read().clone()
    }

    // -- lifecycle --

    pub fn is_activated(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub async fn activate(self: &Arc<Self>) {
        if self.active.swap(true, Ordering::AcqRel) {
            return;
        }
        // A prior wait=false deactivate may still be winding down; let it
        // finish before spawning a replacement worker on the same mailbox.
        let prev = self.worker_handle.lock().await.take();
        if let Some(handle) = prev {
            let _ = handle.await;
        }
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.worker_handle.lock().await = Some(handle);
    }

    pub async fn deactivate(self: &Arc<Self>, wait: bool) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.stop_notify.notify_one();
        if wait {
            let handle = self.worker_handle.lock().await.take();
            if let Some(handle) = handle {
                let _ = handle.await;
            }
        }
    }

    pub fn submit(&self, input: StageInput) {
        if !self.is_activated() {
            tracing::debug!(stage = self.name, "submit dropped: stage deactivated");
            return;
        }
        let _ = self.mailbox_tx.send(Some(input));
    }

    async fn run(self: Arc<Self>) {
        let mut rx = self.mailbox_rx.clone();
        loop {
            tokio::select! {
                _ = self.stop_notify.notified() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let input = rx.borrow_and_update().clone();
                    if let Some(input) = input {
                        self.process_one(input).await;
                    }
                }
            }
        }
    }

    async fn process_one(self: &Arc<Self>, input: StageInput) {
        let count = self.input_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if self.period > 0 && count % self.period as u64 != 0 {
            tracing::debug!(stage = self.name, count, period = self.period, "input dropped by period filter");
            return;
        }

        let hook = self.process_hook.read().clone();
        let output = if let Some(hook) = hook {
            let mut output = input.clone();
            if hook(&input, &mut output) {
                output
            } else {
                match self.compute(&input) {
                    Ok(o) => o,
                    Err(e) => {
                        tracing::error!(stage = self.name, error = %e, "kernel compute failed, dropping frame");
                        return;
                    }
                }
            }
        } else {
            match self.compute(&input) {
                Ok(o) => o,
                Err(e) => {
                    tracing::error!(stage = self.name, error = %e, "kernel compute failed, dropping frame");
                    return;
                }
            }
        };

        *self.latest_output.write() = Some(output.clone());

        if let Some(post) = self.post_process_hook.read().clone() {
            post(&output);
        }

        for child in self.children.read().iter() {
            child.submit(output.clone());
        }
    }

    fn compute(&self, input: &StageInput) -> PipelineResult<StageOutput> {
        match &self.compute {
            StageCompute::Root => Ok(input.clone()),
            StageCompute::Rectify { kernel, calibration } => {
                let (left, right) = paired(input, self.name)?;
                let calibration = calibration.read().clone();
                let (left_out, right_out) = kernel(&left.matrix, &right.matrix, &calibration)
                    .map_err(|e| wrap(self.name, e))?;
                Ok(StagePayload::Paired {
                    left: Payload::new(left_out, left.frame_id, left.metadata.clone()),
                    right: Payload::new(right_out, right.frame_id, right.metadata.clone()),
                })
            }
            StageCompute::Disparity { kernel, method } => {
                let (left, right) = paired(input, self.name)?;
                let method = *method.read();
                let disparity = kernel(&left.matrix, &right.matrix, method).map_err(|e| wrap(self.name, e))?;
                Ok(StagePayload::Single(Payload::new(disparity, left.frame_id, None)))
            }
            StageCompute::DisparityNormalized { kernel } => {
                let p = single(input, self.name)?;
                let out = kernel(&p.matrix).map_err(|e| wrap(self.name, e))?;
                Ok(StagePayload::Single(Payload::new(out, p.frame_id, p.metadata.clone())))
            }
            StageCompute::Points { kernel, params } => {
                let p = single(input, self.name)?;
                let params = params.read().clone();
                let out = kernel(&p.matrix, &params).map_err(|e| wrap(self.name, e))?;
                Ok(StagePayload::Single(Payload::new(out, p.frame_id, p.metadata.clone())))
            }
            StageCompute::Depth { kernel, params } => {
                let p = single(input, self.name)?;
                let params = params.read().clone();
                let out = kernel(&p.matrix, &params).map_err(|e| wrap(self.name, e))?;
                Ok(StagePayload::Single(Payload::new(out, p.frame_id, p.metadata.clone())))
            }
        }
    }

    /// Swap this stage's calibration state. Only meaningful on a Rectify
    /// stage; a no-op elsewhere (see `pipeline::Pipeline::notify_calibration_changed`
    /// for the defaulting-inhibits-reload rule and the pause/resume dance).
    pub fn set_calibration(&self, new_state: CalibrationState) {
        if let StageCompute::Rectify { calibration, .. } = &self.compute {
            *calibration.write() = new_state;
        }
    }

    pub fn calibration(&self) -> Option<CalibrationState> {
        match &self.compute {
            StageCompute::Rectify { calibration, .. } => Some(calibration.read().clone()),
            _ => None,
        }
    }

    pub fn set_points_params(&self, params: PointsParams) {
        if let StageCompute::Points { params: p, .. } = &self.compute {
            *p.write() = params;
        }
    }

    pub fn set_depth_params(&self, params: DepthParams) {
        if let StageCompute::Depth { params: p, .. } = &self.compute {
            *p.write() = params;
        }
    }

    pub fn set_disparity_method(&self, method: DisparityMethod) {
        if let StageCompute::Disparity { method: m, .. } = &self.compute {
            *m.write() = method;
        }
    }
}

fn paired<'a>(input: &'a StageInput, stage: &'static str) -> PipelineResult<(&'a Payload, &'a Payload)> {
    match input {
        StagePayload::Paired { left, right } => Ok((left, right)),
        StagePayload::Single(_) => Err(PipelineError::ComputeFailed {
            stage,
            message: "expected paired input, got single".to_string(),
        }),
    }
}

fn single<'a>(input: &'a StageInput, stage: &'static str) -> PipelineResult<&'a Payload> {
    match input {
        StagePayload::Single(p) => Ok(p),
        StagePayload::Paired { .. } => Err(PipelineError::ComputeFailed {
            stage,
            message: "expected single input, got paired".to_string(),
        }),
    }
}

fn wrap(stage: &'static str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::ComputeFailed { message, .. } => PipelineError::ComputeFailed { stage, message },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Matrix;
    use crate::kernels::passthrough;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    fn sample_payload(frame_id: u16) -> Payload {
        Payload::new(Matrix::new(2, 2, 1, Bytes::from_static(&[0, 0, 0, 0])), frame_id, None)
    }

    fn leaf(id: StageId, name: &'static str) -> Arc<Stage> {
        Stage::new(id, name, StageKind::DisparityNormalized, 0, StageCompute::DisparityNormalized {
            kernel: passthrough::normalize(),
        })
    }

    #[tokio::test]
    async fn activation_gate_drops_submits_when_inactive() {
        let stage = leaf(0, "leaf");
        stage.submit(StagePayload::Single(sample_payload(1)));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(stage.latest_output().is_none());
    }

    #[tokio::test]
    async fn latest_wins_mailbox_processes_only_the_newest_input() {
        let stage = leaf(0, "leaf");
        let processed: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        let processed_clone = processed.clone();
        stage.set_post_process_hook(Arc::new(move |_out| {
            processed_clone.fetch_add(1, Ordering::SeqCst);
        }));
        stage.activate().await;

        // Submit two inputs back-to-back before the worker can drain either;
        // the mailbox coalesces to the latest ("second") submission only.
        stage.submit(StagePayload::Single(sample_payload(42)));
        stage.submit(StagePayload::Single(sample_payload(43)));

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stage.deactivate(true).await;

        assert_eq!(stage.latest_output().unwrap().frame_id(), 43);
        assert!(processed.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn period_filter_keeps_every_pth_input() {
        let stage = Stage::new(0, "leaf", StageKind::DisparityNormalized, 2, StageCompute::DisparityNormalized {
            kernel: passthrough::normalize(),
        });
        stage.activate().await;

        stage.submit(StagePayload::Single(sample_payload(1)));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(stage.latest_output().is_none(), "first input should be dropped by period=2");

        stage.submit(StagePayload::Single(sample_payload(2)));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(stage.latest_output().unwrap().frame_id(), 2);

        stage.deactivate(true).await;
    }

    #[tokio::test]
    async fn process_hook_true_skips_builtin_compute_but_still_runs_post_hook() {
        let stage = leaf(0, "leaf");
        let post_ran = Arc::new(AtomicBool::new(false));
        let post_ran_clone = post_ran.clone();
        stage.set_post_process_hook(Arc::new(move |_out| {
            post_ran_clone.store(true, Ordering::SeqCst);
        }));
        stage.set_process_hook(Arc::new(|_in, out| {
            if let StagePayload::Single(p) = out {
                p.frame_id = 99;
            }
            true
        }));
        stage.activate().await;
        stage.submit(StagePayload::Single(sample_payload(1)));
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        stage.deactivate(true).await;

        assert_eq!(stage.latest_output().unwrap().frame_id(), 99);
        assert!(post_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn deactivate_wait_true_drains_pending_and_finishes_inflight() {
        let stage = leaf(0, "leaf");
        stage.activate().await;
        stage.submit(StagePayload::Single(sample_payload(5)));
        stage.deactivate(true).await;
        assert!(!stage.is_activated());
    }

    #[tokio::test]
    async fn reactivate_after_deactivate_wait_false_does_not_double_spawn() {
        let stage = leaf(0, "leaf");
        stage.activate().await;
        stage.submit(StagePayload::Single(sample_payload(1)));
        stage.deactivate(false).await;
        stage.activate().await;
        stage.submit(StagePayload::Single(sample_payload(2)));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        stage.deactivate(true).await;
        assert_eq!(stage.latest_output().unwrap().frame_id(), 2);
    }
}
