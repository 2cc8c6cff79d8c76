//! Joins independently-arriving left/right native frames into a single
//! paired payload by equal `frame_id`.
//!
//! One latch instance serves one pairing point (LEFT/RIGHT into Rectify,
//! or LEFT_RECTIFIED/RIGHT_RECTIFIED into Disparity). Mirrors
//! `daq_core::pipeline`'s `Tee`-adjacent fan-in helpers in spirit: a small
//! `parking_lot::Mutex`-guarded slot pair rather than a channel, since the
//! two sides arrive from unrelated producers and there is no consumer to
//! block.

use parking_lot::Mutex;

use crate::stage_io::Payload;

/// Transparent across 16-bit `frame_id` wraparound: pairing is decided by
/// equality, not by ordering, so wraparound never needs special-casing.
pub struct PairingLatch {
    left: Mutex<Option<Payload>>,
    right: Mutex<Option<Payload>>,
}

impl PairingLatch {
    pub fn new() -> Self {
        Self {
            left: Mutex::new(None),
            right: Mutex::new(None),
        }
    }

    /// Feed a left payload. If a right payload with the same `frame_id` is
    /// already latched, returns the completed pair and clears both slots.
    /// Otherwise latches `payload`, overwriting (and discarding) any
    /// previously unmatched left payload.
    pub fn feed_left(&self, payload: Payload) -> Option<(Payload, Payload)> {
        let mut right_slot = self.right.lock();
        if let Some(right) = right_slot.as_ref() {
            if right.frame_id == payload.frame_id {
                let right = right_slot.take().expect("checked Some above");
                return Some((payload, right));
            }
        }
        drop(right_slot);
        *self.left.lock() = Some(payload);
        None
    }

    /// Symmetric counterpart of [`Self::feed_left`].
    pub fn feed_right(&self, payload: Payload) -> Option<(Payload, Payload)> {
        let mut left_slot = self.left.lock();
        if let Some(left) = left_slot.as_ref() {
            if left.frame_id == payload.frame_id {
                let left = left_slot.take().expect("checked Some above");
                return Some((left, payload));
            }
        }
        drop(left_slot);
        *self.right.lock() = Some(payload);
        None
    }
}

impl Default for PairingLatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Matrix;
    use bytes::Bytes;

    fn payload(frame_id: u16) -> Payload {
        Payload::new(Matrix::new(1, 1, 1, Bytes::from_static(&[0u8])), frame_id, None)
    }

    #[test]
    fn matching_ids_pair_regardless_of_arrival_order() {
        let latch = PairingLatch::new();
        assert!(latch.feed_left(payload(10)).is_none());
        let (left, right) = latch.feed_right(payload(10)).expect("should pair");
        assert_eq!(left.frame_id, 10);
        assert_eq!(right.frame_id, 10);
    }

    #[test]
    fn unmatched_side_is_overwritten_by_latest_arrival() {
        let latch = PairingLatch::new();
        latch.feed_left(payload(1));
        latch.feed_left(payload(2));
        // id 1 was discarded; only id 2 can still pair.
        assert!(latch.feed_right(payload(1)).is_none());
        let (left, right) = latch.feed_right(payload(2)).expect("should pair");
        assert_eq!(left.frame_id, 2);
        assert_eq!(right.frame_id, 2);
    }

    #[test]
    fn pairing_is_transparent_across_frame_id_wraparound() {
        let latch = PairingLatch::new();
        assert!(latch.feed_left(payload(u16::MAX)).is_none());
        let (left, right) = latch.feed_right(payload(u16::MAX)).expect("should pair at wraparound boundary");
        assert_eq!(left.frame_id, u16::MAX);
        assert_eq!(right.frame_id, u16::MAX);

        assert!(latch.feed_left(payload(0)).is_none());
        let (left, right) = latch.feed_right(payload(0)).expect("should pair after wrap to 0");
        assert_eq!(left.frame_id, 0);
        assert_eq!(right.frame_id, 0);
    }

    #[test]
    fn consumed_pair_clears_both_slots() {
        let latch = PairingLatch::new();
        latch.feed_left(payload(5));
        latch.feed_right(payload(5));
        // Both slots are empty now; feeding either side alone should not pair spuriously.
        assert!(latch.feed_left(payload(5)).is_none());
    }
}
