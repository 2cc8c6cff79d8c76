//! Crate-wide error type.
//!
//! One variant per failure kind named in the error handling design: each
//! carries the context needed to log it, following `daq_core::error::DaqError`'s
//! `thiserror`-derived, context-bearing style. Most of the public surface
//! logs through these and converts to the documented empty/false sentinel at
//! the boundary rather than propagating `Err` to callers (see
//! `pipeline::Pipeline::get_stream_data` and friends).

use crate::stream::Stream;
use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("stream {0:?} is not known to this pipeline")]
    UnknownStream(Stream),

    #[error("stream {0:?} is currently disabled")]
    StreamDisabled(Stream),

    #[error("paired output for stream {0:?} has not been produced yet")]
    PairedOutputNotReady(Stream),

    #[error("unknown calibration model '{0}', falling back to pinhole")]
    UnknownCalibrationModel(String),

    #[error("stage '{stage}' kernel compute failed: {message}")]
    ComputeFailed { stage: &'static str, message: String },
}
