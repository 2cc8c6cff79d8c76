//! Processor graph core for a stereo depth camera pipeline: a fixed DAG of
//! per-stage workers that rectifies, matches, and reprojects a paired
//! left/right video feed, with native/synthetic arbitration per stream so
//! a device producing a stage's output itself short-circuits the matching
//! synthetic stage.

pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod frame;
pub mod graph;
pub mod kernels;
pub mod pairing;
pub mod pipeline;
pub mod plugin;
pub mod registry;
pub mod stage;
pub mod stage_io;
pub mod stream;

pub use config::PipelineConfig;
pub use device::{Calibration, Device};
pub use error::{PipelineError, PipelineResult};
pub use frame::{Frame, Matrix, PixelFormat, StreamData};
pub use pipeline::Pipeline;
pub use plugin::Plugin;
pub use stream::{Mode, Stream};
