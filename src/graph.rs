//! Builds the fixed six-stage DAG at construction time, parameterized by
//! [`CalibrationModel`], and exposes the lookup tables the registry and
//! dispatcher need (by name, by stream, and the parent map used only for
//! upward enable-traversal).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::kernels::{
    derive_depth_params, derive_points_params, passthrough, CalibrationModel, CalibrationState,
    DepthFn, DepthParams, DisparityFn, DisparityMethod, NormalizeFn, PointsFn, PointsParams,
    RectifyFn,
};
use crate::stage::{Stage, StageCompute, StageId, StageKind, TargetStream};
use crate::stream::{Mode, Side, Stream};

/// Kernel implementations to wire into a freshly built graph. Defaults to
/// the passthrough kernels; a real deployment supplies numeric kernels here,
/// or leaves these as passthrough and overrides behavior through the plugin
/// hook instead (both are supported, per §4.6).
pub struct Kernels {
    pub rectify: RectifyFn,
    pub disparity: DisparityFn,
    pub normalize: NormalizeFn,
    pub points: PointsFn,
    pub depth: DepthFn,
}

impl Default for Kernels {
    fn default() -> Self {
        Self {
            rectify: passthrough::rectify(),
            disparity: passthrough::disparity(),
            normalize: passthrough::normalize(),
            points: passthrough::points(),
            depth: passthrough::depth(),
        }
    }
}

pub struct Graph {
    pub root: Arc<Stage>,
    pub rectify: Arc<Stage>,
    pub disparity: Arc<Stage>,
    pub disparity_normalized: Arc<Stage>,
    pub points: Arc<Stage>,
    pub depth: Arc<Stage>,
    pub model: CalibrationModel,
    pub calibration_defaulted: bool,
    stages_by_id: HashMap<StageId, Arc<Stage>>,
    stages_by_kind: HashMap<StageKind, Arc<Stage>>,
    /// Stage that owns (is the source of) the given stream.
    stream_owner: HashMap<Stream, Arc<Stage>>,
    /// Upward edges, used only by the registry's enable-toward-root walk.
    parent: HashMap<StageId, StageId>,
}

impl Graph {
    pub fn build(model: CalibrationModel, calibration: CalibrationState, kernels: Kernels) -> Self {
        Self::build_with_defaulted(model, calibration, kernels, false, &HashMap::new())
    }

    pub fn build_with_defaulted(
        model: CalibrationModel,
        calibration: CalibrationState,
        kernels: Kernels,
        calibration_defaulted: bool,
        periods: &HashMap<String, u32>,
    ) -> Self {
        let period_for = |name: &str| periods.get(name).copied().unwrap_or(0);
        let mut next_id: StageId = 0;
        let mut alloc = || {
            let id = next_id;
            next_id += 1;
            id
        };

        let calibration = Arc::new(RwLock::new(calibration));
        let points_params = Arc::new(RwLock::new(derive_points_params(model, &calibration.read())));
        let depth_params = Arc::new(RwLock::new(derive_depth_params(model, &calibration.read())));
        let disparity_method = Arc::new(RwLock::new(DisparityMethod::BlockMatching));

        let root = Stage::new(alloc(), "root", StageKind::Root, period_for("root"), StageCompute::Root);
        root.add_target_stream(TargetStream::new(Stream::Left, Mode::Native, Mode::Native).with_side(Side::Left));
        root.add_target_stream(TargetStream::new(Stream::Right, Mode::Native, Mode::Native).with_side(Side::Right));

        let rectify = Stage::new(
            alloc(),
            "rectify",
            StageKind::Rectify,
            period_for("rectify"),
            StageCompute::Rectify {
                kernel: kernels.rectify,
                calibration: Arc::clone(&calibration),
            },
        );
        rectify.add_target_stream(
            TargetStream::new(Stream::LeftRectified, Mode::Synthetic, Mode::None).with_side(Side::Left),
        );
        rectify.add_target_stream(
            TargetStream::new(Stream::RightRectified, Mode::Synthetic, Mode::None).with_side(Side::Right),
        );
        root.add_child(Arc::clone(&rectify));

        let disparity = Stage::new(
            alloc(),
            "disparity",
            StageKind::Disparity,
            period_for("disparity"),
            StageCompute::Disparity {
                kernel: kernels.disparity,
                method: disparity_method,
            },
        );
        disparity.add_target_stream(TargetStream::new(Stream::Disparity, Mode::Synthetic, Mode::None));
        rectify.add_child(Arc::clone(&disparity));

        let disparity_normalized = Stage::new(
            alloc(),
            "disparity_normalized",
            StageKind::DisparityNormalized,
            period_for("disparity_normalized"),
            StageCompute::DisparityNormalized { kernel: kernels.normalize },
        );
        disparity_normalized.add_target_stream(TargetStream::new(
            Stream::DisparityNormalized,
            Mode::Synthetic,
            Mode::None,
        ));
        disparity.add_child(Arc::clone(&disparity_normalized));

        let points = Stage::new(
            alloc(),
            "points",
            StageKind::Points,
            period_for("points"),
            StageCompute::Points {
                kernel: kernels.points,
                params: points_params,
            },
        );
        points.add_target_stream(TargetStream::new(Stream::Points, Mode::Synthetic, Mode::None));

        let depth = Stage::new(
            alloc(),
            "depth",
            StageKind::Depth,
            period_for("depth"),
            StageCompute::Depth {
                kernel: kernels.depth,
                params: depth_params,
            },
        );
        depth.add_target_stream(TargetStream::new(Stream::Depth, Mode::Synthetic, Mode::None));

        match model {
            CalibrationModel::Pinhole => {
                disparity.add_child(Arc::clone(&points));
                points.add_child(Arc::clone(&depth));
            }
            CalibrationModel::KannalaBrandt => {
                disparity.add_child(Arc::clone(&depth));
                depth.add_child(Arc::clone(&points));
            }
        }

        let mut stages_by_id = HashMap::new();
        let mut stages_by_kind = HashMap::new();
        let mut stream_owner = HashMap::new();
        let mut parent = HashMap::new();

        for stage in [&root, &rectify, &disparity, &disparity_normalized, &points, &depth] {
            stages_by_id.insert(stage.id, Arc::clone(stage));
            stages_by_kind.insert(stage.kind, Arc::clone(stage));
            for stream in stage.target_streams() {
                stream_owner.insert(stream, Arc::clone(stage));
            }
        }

        parent.insert(rectify.id, root.id);
        parent.insert(disparity.id, rectify.id);
        parent.insert(disparity_normalized.id, disparity.id);
        match model {
            CalibrationModel::Pinhole => {
                parent.insert(points.id, disparity.id);
                parent.insert(depth.id, points.id);
            }
            CalibrationModel::KannalaBrandt => {
                parent.insert(depth.id, disparity.id);
                parent.insert(points.id, depth.id);
            }
        }

        Self {
            root,
            rectify,
            disparity,
            disparity_normalized,
            points,
            depth,
            model,
            calibration_defaulted,
            stages_by_id,
            stages_by_kind,
            stream_owner,
            parent,
        }
    }

    pub fn stage_for_stream(&self, stream: Stream) -> Option<&Arc<Stage>> {
        self.stream_owner.get(&stream)
    }

    pub fn stage_by_kind(&self, kind: StageKind) -> Option<&Arc<Stage>> {
        self.stages_by_kind.get(&kind)
    }

    pub fn stage_by_name(&self, name: &str) -> Option<&Arc<Stage>> {
        self.stages_by_id.values().find(|s| s.name == name)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Arc<Stage>> {
        self.stages_by_id.values()
    }

    /// Ancestors of `stage_id`, nearest first, walking parent links toward the root.
    pub fn ancestors(&self, stage_id: StageId) -> Vec<Arc<Stage>> {
        let mut out = Vec::new();
        let mut current = stage_id;
        while let Some(&p) = self.parent.get(&current) {
            if let Some(stage) = self.stages_by_id.get(&p) {
                out.push(Arc::clone(stage));
            }
            current = p;
        }
        out
    }

    /// Every stage reachable by walking child edges from `stage_id`, excluding itself.
    pub fn descendants(&self, stage_id: StageId) -> Vec<Arc<Stage>> {
        let mut out = Vec::new();
        if let Some(root) = self.stages_by_id.get(&stage_id) {
            let mut stack = root.children();
            while let Some(s) = stack.pop() {
                stack.extend(s.children());
                out.push(s);
            }
        }
        out
    }

    pub fn recompute_derived_params(&self) {
        let calibration = match self.rectify.calibration() {
            Some(c) => c,
            None => return,
        };
        self.points.set_points_params(derive_points_params(self.model, &calibration));
        self.depth.set_depth_params(derive_depth_params(self.model, &calibration));
    }
}
