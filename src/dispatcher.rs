//! Native-stream entry point: turns a native frame delivery from the device
//! into listener notification, pairing-latch feeds, and fan-out to the
//! stages that would otherwise have synthesized that same stream (§4.5).

use std::sync::Arc;

use parking_lot::RwLock;

use crate::frame::StreamData;
use crate::graph::Graph;
use crate::pairing::PairingLatch;
use crate::stage_io::{Payload, StagePayload};
use crate::stream::Stream;

type ListenerFn = Arc<dyn Fn(Stream, &StreamData) + Send + Sync>;

pub struct Dispatcher {
    graph: Arc<Graph>,
    native_latch: PairingLatch,
    rectified_latch: PairingLatch,
    listener: RwLock<Option<ListenerFn>>,
}

impl Dispatcher {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            native_latch: PairingLatch::new(),
            rectified_latch: PairingLatch::new(),
            listener: RwLock::new(None),
        }
    }

    pub fn set_listener(&self, listener: Option<ListenerFn>) {
        *self.listener.write() = listener;
    }

    pub(crate) fn notify_listener(&self, stream: Stream, data: &StreamData) {
        if let Some(listener) = self.listener.read().clone() {
            listener(stream, data);
        }
    }

    /// Entry point for a native frame delivery on `stream`.
    pub fn dispatch_native(&self, stream: Stream, data: StreamData) {
        self.notify_listener(stream, &data);

        let matrix = match &data.matrix {
            Some(m) => m.clone(),
            None => {
                tracing::warn!(stream = stream.name(), "native delivery had no matrix, dropping");
                return;
            }
        };
        let payload = Payload::new(matrix, data.frame_id, data.metadata.clone());

        match stream {
            Stream::Left => {
                if let Some((left, right)) = self.native_latch.feed_left(payload) {
                    self.graph.rectify.submit(StagePayload::Paired { left, right });
                }
            }
            Stream::Right => {
                if let Some((left, right)) = self.native_latch.feed_right(payload) {
                    self.graph.rectify.submit(StagePayload::Paired { left, right });
                }
            }
            Stream::LeftRectified => {
                if let Some(pair) = self.rectified_latch.feed_left(payload) {
                    self.fan_out_bypassing_owner(&self.graph.rectify, pair);
                }
            }
            Stream::RightRectified => {
                if let Some(pair) = self.rectified_latch.feed_right(payload) {
                    self.fan_out_bypassing_owner(&self.graph.rectify, pair);
                }
            }
            Stream::Disparity | Stream::DisparityNormalized | Stream::Points | Stream::Depth => {
                if let Some(stage) = self.graph.stage_for_stream(stream) {
                    for child in stage.children() {
                        child.submit(StagePayload::Single(payload.clone()));
                    }
                }
            }
        }
    }

    fn fan_out_bypassing_owner(&self, owner: &crate::stage::Stage, pair: (Payload, Payload)) {
        let (left, right) = pair;
        for child in owner.children() {
            child.submit(StagePayload::Paired {
                left: left.clone(),
                right: right.clone(),
            });
        }
    }
}
