//! Tagged single- or dual-matrix payloads passed between stages.

use crate::frame::{ImageMetadata, Matrix};

/// A single matrix plus the identifying/metadata fields a [`StagePayload`]
/// carries on one side of a pair (or alone, for a single payload).
#[derive(Debug, Clone)]
pub struct Payload {
    pub matrix: Matrix,
    pub frame_id: u16,
    pub metadata: Option<ImageMetadata>,
}

impl Payload {
    pub fn new(matrix: Matrix, frame_id: u16, metadata: Option<ImageMetadata>) -> Self {
        Self {
            matrix,
            frame_id,
            metadata,
        }
    }
}

/// Either a single payload or a paired (left, right) payload with guaranteed
/// equal `frame_id`. Every stage declares at construction which shape its
/// inputs and outputs use (see [`Arity`]).
#[derive(Debug, Clone)]
pub enum StagePayload {
    Single(Payload),
    Paired { left: Payload, right: Payload },
}

/// What a stage's input or output looks like.
pub type StageInput = StagePayload;
/// What a stage's input or output looks like.
pub type StageOutput = StagePayload;

/// The shape of a stage's input or output, declared at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Single,
    Paired,
}

impl StagePayload {
    pub fn arity(&self) -> Arity {
        match self {
            StagePayload::Single(_) => Arity::Single,
            StagePayload::Paired { .. } => Arity::Paired,
        }
    }

    /// The frame-id all payloads inside this value share. For a paired
    /// payload this is the (invariant-guaranteed) common id of both halves.
    pub fn frame_id(&self) -> u16 {
        match self {
            StagePayload::Single(p) => p.frame_id,
            StagePayload::Paired { left, .. } => left.frame_id,
        }
    }

    /// Extract one half of a paired payload, or the payload itself if single.
    pub fn side(&self, side: crate::stream::Side) -> &Payload {
        match (self, side) {
            (StagePayload::Single(p), _) => p,
            (StagePayload::Paired { left, .. }, crate::stream::Side::Left) => left,
            (StagePayload::Paired { right, .. }, crate::stream::Side::Right) => right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Side;
    use bytes::Bytes;

    fn payload(frame_id: u16) -> Payload {
        Payload::new(Matrix::new(1, 1, 1, Bytes::from_static(&[0u8])), frame_id, None)
    }

    #[test]
    fn paired_side_extraction() {
        let p = StagePayload::Paired {
            left: payload(7),
            right: payload(7),
        };
        assert_eq!(p.side(Side::Left).frame_id, 7);
        assert_eq!(p.side(Side::Right).frame_id, 7);
        assert_eq!(p.frame_id(), 7);
        assert_eq!(p.arity(), Arity::Paired);
    }

    #[test]
    fn single_side_extraction_ignores_side() {
        let p = StagePayload::Single(payload(3));
        assert_eq!(p.side(Side::Left).frame_id, 3);
        assert_eq!(p.side(Side::Right).frame_id, 3);
        assert_eq!(p.arity(), Arity::Single);
    }
}
