//! Stage kernels: signatures only. Specific numeric behavior (rectify maps,
//! block-matching disparity, reprojection-to-3D, depth-from-disparity) is an
//! external collaborator's concern; the core depends only on these shapes.

use crate::error::PipelineResult;
use crate::frame::Matrix;
use std::sync::Arc;

/// Calibration model, chosen at construction; determines which kernels are
/// instantiated and the DAG shape downstream of disparity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationModel {
    Pinhole,
    KannalaBrandt,
}

impl CalibrationModel {
    /// Parse a model name, falling back to `Pinhole` for anything unrecognized
    /// (logged by the caller per the error-handling design).
    pub fn parse_or_default(name: &str) -> (Self, bool) {
        match name.to_ascii_lowercase().as_str() {
            "pinhole" => (CalibrationModel::Pinhole, false),
            "kannala_brandt" | "kannala-brandt" => (CalibrationModel::KannalaBrandt, false),
            _ => (CalibrationModel::Pinhole, true),
        }
    }
}

/// Block-matching method selector, forwarded from `Pipeline::set_disparity_method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisparityMethod {
    BlockMatching,
    SemiGlobalBlockMatching,
}

/// Camera intrinsics, opaque beyond the pipeline's need to pass them through.
#[derive(Debug, Clone, Default)]
pub struct Intrinsics {
    pub focal_length: (f64, f64),
    pub principal_point: (f64, f64),
    pub distortion: Vec<f64>,
}

/// Stereo extrinsics between the left and right sensors.
#[derive(Debug, Clone, Default)]
pub struct Extrinsics {
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

/// Calibration state a Rectify kernel reads; replaced wholesale (pointer
/// swap) by `reload_calibration`.
#[derive(Debug, Clone, Default)]
pub struct CalibrationState {
    pub intrinsics_left: Intrinsics,
    pub intrinsics_right: Intrinsics,
    pub extrinsics: Extrinsics,
}

/// Reprojection matrix for the PINHOLE Points kernel, derived from calibration.
#[derive(Debug, Clone, Default)]
pub struct ReprojectionMatrix(pub [[f64; 4]; 4]);

/// Calibration pair for the KANNALA_BRANDT Points/Depth kernels.
#[derive(Debug, Clone, Default)]
pub struct CalibrationPair {
    pub left: Intrinsics,
    pub right: Intrinsics,
}

/// Derived parameters a Points kernel reads; shape depends on calibration model.
#[derive(Debug, Clone)]
pub enum PointsParams {
    Pinhole(ReprojectionMatrix),
    KannalaBrandt(CalibrationPair),
}

/// Derived parameters a Depth kernel reads; shape depends on calibration model.
#[derive(Debug, Clone)]
pub enum DepthParams {
    Pinhole(ReprojectionMatrix),
    KannalaBrandt(CalibrationPair),
}

/// Rectify: (left, right) + calibration -> (left_rectified, right_rectified).
pub type RectifyFn =
    Arc<dyn Fn(&Matrix, &Matrix, &CalibrationState) -> PipelineResult<(Matrix, Matrix)> + Send + Sync>;

/// Disparity: (left_rectified, right_rectified) + method -> disparity.
pub type DisparityFn = Arc<dyn Fn(&Matrix, &Matrix, DisparityMethod) -> PipelineResult<Matrix> + Send + Sync>;

/// DisparityNormalized: disparity -> display-normalized disparity.
pub type NormalizeFn = Arc<dyn Fn(&Matrix) -> PipelineResult<Matrix> + Send + Sync>;

/// Points: disparity + derived params -> 3D point matrix.
pub type PointsFn = Arc<dyn Fn(&Matrix, &PointsParams) -> PipelineResult<Matrix> + Send + Sync>;

/// Depth: disparity + derived params -> depth map.
pub type DepthFn = Arc<dyn Fn(&Matrix, &DepthParams) -> PipelineResult<Matrix> + Send + Sync>;

/// Derive Points/Depth params from the shared calibration state for the given model.
pub fn derive_points_params(model: CalibrationModel, calibration: &CalibrationState) -> PointsParams {
    match model {
        CalibrationModel::Pinhole => PointsParams::Pinhole(reprojection_from(calibration)),
        CalibrationModel::KannalaBrandt => PointsParams::KannalaBrandt(CalibrationPair {
            left: calibration.intrinsics_left.clone(),
            right: calibration.intrinsics_right.clone(),
        }),
    }
}

/// Derive Depth params from the shared calibration state for the given model.
pub fn derive_depth_params(model: CalibrationModel, calibration: &CalibrationState) -> DepthParams {
    match model {
        CalibrationModel::Pinhole => DepthParams::Pinhole(reprojection_from(calibration)),
        CalibrationModel::KannalaBrandt => DepthParams::KannalaBrandt(CalibrationPair {
            left: calibration.intrinsics_left.clone(),
            right: calibration.intrinsics_right.clone(),
        }),
    }
}

fn reprojection_from(_calibration: &CalibrationState) -> ReprojectionMatrix {
    // Deriving Q from intrinsics/extrinsics is an external numerical concern;
    // the core only needs the container to thread through unchanged.
    ReprojectionMatrix::default()
}

/// Default passthrough kernels used when no real numeric implementation is
/// wired in (tests, and any caller that only cares about topology/activation
/// behavior rather than pixel content).
pub mod passthrough {
    use super::*;

    pub fn rectify() -> RectifyFn {
        Arc::new(|left, right, _calibration| Ok((left.clone(), right.clone())))
    }

    pub fn disparity() -> DisparityFn {
        Arc::new(|left, _right, _method| Ok(left.clone()))
    }

    pub fn normalize() -> NormalizeFn {
        Arc::new(|disparity| Ok(disparity.clone()))
    }

    pub fn points() -> PointsFn {
        Arc::new(|disparity, _params| Ok(disparity.clone()))
    }

    pub fn depth() -> DepthFn {
        Arc::new(|disparity, _params| Ok(disparity.clone()))
    }
}
