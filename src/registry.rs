//! Per-stream support/enabled-mode bookkeeping and the enable/disable
//! traversal described in §4.4: enabling walks toward the root turning on
//! every idle upstream producer, disabling walks toward the leaves turning
//! off everything that is no longer needed.

use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::frame::StreamData;
use crate::graph::Graph;
use crate::stream::{Mode, Stream};

pub type OnChangeFn<'a> = &'a (dyn Fn(Stream) + Send + Sync);

pub struct StreamRegistry {
    graph: Arc<Graph>,
}

impl StreamRegistry {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }

    pub fn supports(&self, stream: Stream) -> bool {
        self.graph.stage_for_stream(stream).is_some()
    }

    pub fn supports_mode(&self, stream: Stream) -> Mode {
        self.graph
            .stage_for_stream(stream)
            .and_then(|s| s.target_mode(stream))
            .map(|(support, _)| support)
            .unwrap_or(Mode::None)
    }

    pub fn enabled_mode(&self, stream: Stream) -> Mode {
        self.graph
            .stage_for_stream(stream)
            .and_then(|s| s.target_mode(stream))
            .map(|(_, enabled)| enabled)
            .unwrap_or(Mode::None)
    }

    pub fn is_enabled(&self, stream: Stream) -> bool {
        self.enabled_mode(stream) != Mode::None
    }

    pub fn set_callback(&self, stream: Stream, callback: Option<Arc<dyn Fn(&StreamData) + Send + Sync>>) -> bool {
        match self.graph.stage_for_stream(stream) {
            Some(stage) => stage.set_callback(stream, callback),
            None => false,
        }
    }

    pub fn has_callback(&self, stream: Stream) -> bool {
        self.graph.stage_for_stream(stream).map(|s| s.has_callback(stream)).unwrap_or(false)
    }

    /// Walk from `stream`'s owning stage toward the root, flipping every
    /// `NONE` target to `SYNTHETIC` and activating any stage that changed.
    /// A stream natively produced by the device is untouched — it is owned
    /// by the device, not the synthetic producer.
    pub async fn enable(&self, stream: Stream, on_change: Option<OnChangeFn<'_>>, dry_run: bool) -> PipelineResult<()> {
        let stage = self
            .graph
            .stage_for_stream(stream)
            .ok_or(PipelineError::UnknownStream(stream))?;

        if self.supports_mode(stream) == Mode::Native {
            // A NATIVE stream has no idle upstream producer to turn on, but a
            // dry-run attempt still reports through the callback without
            // mutating anything.
            if dry_run {
                if let Some(cb) = on_change {
                    cb(stream);
                }
            }
            return Ok(());
        }

        let mut chain = vec![Arc::clone(stage)];
        chain.extend(self.graph.ancestors(stage.id));

        for s in &chain {
            let changed = if dry_run {
                s.targets_with_mode(Mode::None)
            } else {
                s.flip_targets(Mode::None, Mode::Synthetic)
            };
            if let Some(cb) = on_change {
                for changed_stream in &changed {
                    cb(*changed_stream);
                }
            }
            if !dry_run && !changed.is_empty() {
                s.activate().await;
            }
            // This stage already satisfied demand (native, or already running
            // from a previous enable) — nothing further upstream needs to change.
            if changed.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// Walk from `stream`'s owning stage toward its leaves, flipping every
    /// `SYNTHETIC` target back to `NONE` and deactivating any stage left
    /// with no enabled targets. The graph branches below Disparity (into
    /// DisparityNormalized and the Points/Depth chain), so this is a tree
    /// walk, not a flat list: each branch stops descending as soon as it
    /// reaches a stage that needed no change (native, or already off).
    pub async fn disable(&self, stream: Stream, on_change: Option<OnChangeFn<'_>>, dry_run: bool) -> PipelineResult<()> {
        let stage = self
            .graph
            .stage_for_stream(stream)
            .ok_or(PipelineError::UnknownStream(stream))?;

        if self.supports_mode(stream) == Mode::Native {
            if dry_run {
                if let Some(cb) = on_change {
                    cb(stream);
                }
            }
            return Ok(());
        }

        self.disable_subtree(Arc::clone(stage), on_change, dry_run).await;
        Ok(())
    }

    fn disable_subtree<'a>(
        &'a self,
        stage: Arc<crate::stage::Stage>,
        on_change: Option<OnChangeFn<'a>>,
        dry_run: bool,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let changed = if dry_run {
                stage.targets_with_mode(Mode::Synthetic)
            } else {
                stage.flip_targets(Mode::Synthetic, Mode::None)
            };
            if let Some(cb) = on_change {
                for changed_stream in &changed {
                    cb(*changed_stream);
                }
            }
            if !dry_run && !changed.is_empty() && !stage.has_any_enabled_target() {
                stage.deactivate(true).await;
            }
            if changed.is_empty() {
                return;
            }
            for child in stage.children() {
                self.disable_subtree(child, on_change, dry_run).await;
            }
        })
    }
}
