//! Logical stream identifiers and per-(stage, stream) mode bookkeeping.

/// A named logical output feed, drawn from the fixed set the pipeline knows
/// how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    Left,
    Right,
    LeftRectified,
    RightRectified,
    Disparity,
    DisparityNormalized,
    Points,
    Depth,
}

impl Stream {
    pub const ALL: [Stream; 8] = [
        Stream::Left,
        Stream::Right,
        Stream::LeftRectified,
        Stream::RightRectified,
        Stream::Disparity,
        Stream::DisparityNormalized,
        Stream::Points,
        Stream::Depth,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stream::Left => "LEFT",
            Stream::Right => "RIGHT",
            Stream::LeftRectified => "LEFT_RECTIFIED",
            Stream::RightRectified => "RIGHT_RECTIFIED",
            Stream::Disparity => "DISPARITY",
            Stream::DisparityNormalized => "DISPARITY_NORMALIZED",
            Stream::Points => "POINTS",
            Stream::Depth => "DEPTH",
        }
    }
}

/// Who produces a stream right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The device produces this stream directly; the owning stage is a router only.
    Native,
    /// The owning stage computes this stream.
    Synthetic,
    /// Nobody is producing this stream.
    None,
}

/// Which half of a paired stage output a single-eye stream corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}
