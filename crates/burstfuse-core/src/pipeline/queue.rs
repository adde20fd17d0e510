//! Bounded hand-off between a capture source and the pipeline.
//!
//! The queue never blocks the producer: when it is full the oldest frame is
//! discarded and the producer is told so, which the capture pump forwards to
//! the [`FrameSource`] as backpressure.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::error::Result;
use crate::frame::Frame;

use super::cancel::CancellationToken;

/// Pull-style capture collaborator.
pub trait FrameSource: Send {
    /// Block until the next frame is available. `None` ends the capture.
    fn next_frame(&mut self) -> Option<Frame>;

    /// The pipeline could not keep up and discarded `dropped` frames in total.
    fn on_backpressure(&mut self, _dropped: usize) {}
}

impl FrameSource for std::vec::IntoIter<Frame> {
    fn next_frame(&mut self) -> Option<Frame> {
        self.next()
    }
}

/// Outcome of [`FrameProducer::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// The queue was full; its oldest frame was discarded to make room.
    DroppedOldest,
    /// The consumer is gone; the frame was discarded.
    Disconnected,
}

/// Outcome of [`FrameConsumer::recv_timeout`].
#[derive(Debug)]
pub enum Received {
    Frame(Frame),
    Timeout,
    /// The producer closed and the queue is drained.
    Closed,
}

#[derive(Default)]
struct QueueState {
    frames: VecDeque<Frame>,
    dropped: usize,
    producer_closed: bool,
    consumer_closed: bool,
}

struct Shared {
    capacity: usize,
    state: Mutex<QueueState>,
    ready: Condvar,
}

pub struct FrameProducer {
    shared: Arc<Shared>,
}

pub struct FrameConsumer {
    shared: Arc<Shared>,
}

/// Create a queue holding at most `capacity` frames (minimum 1).
pub fn frame_channel(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let shared = Arc::new(Shared {
        capacity: capacity.max(1),
        state: Mutex::new(QueueState::default()),
        ready: Condvar::new(),
    });
    (
        FrameProducer {
            shared: Arc::clone(&shared),
        },
        FrameConsumer { shared },
    )
}

impl FrameProducer {
    pub fn push(&self, frame: Frame) -> PushOutcome {
        let mut state = self.shared.state.lock();
        if state.consumer_closed {
            return PushOutcome::Disconnected;
        }
        let mut outcome = PushOutcome::Accepted;
        if state.frames.len() >= self.shared.capacity {
            state.frames.pop_front();
            state.dropped += 1;
            outcome = PushOutcome::DroppedOldest;
        }
        state.frames.push_back(frame);
        drop(state);
        self.shared.ready.notify_one();
        outcome
    }

    /// Total frames discarded so far.
    pub fn dropped(&self) -> usize {
        self.shared.state.lock().dropped
    }

    pub fn is_disconnected(&self) -> bool {
        self.shared.state.lock().consumer_closed
    }

    /// Signal end of capture. Frames already queued stay receivable.
    pub fn close(&self) {
        self.shared.state.lock().producer_closed = true;
        self.shared.ready.notify_all();
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.close();
    }
}

impl FrameConsumer {
    /// Wait up to `timeout` for the oldest queued frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Received {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                return Received::Frame(frame);
            }
            if state.producer_closed {
                return Received::Closed;
            }
            if self.shared.ready.wait_for(&mut state, timeout).timed_out() {
                return match state.frames.pop_front() {
                    Some(frame) => Received::Frame(frame),
                    None if state.producer_closed => Received::Closed,
                    None => Received::Timeout,
                };
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Total frames discarded so far.
    pub fn dropped(&self) -> usize {
        self.shared.state.lock().dropped
    }
}

impl Drop for FrameConsumer {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.consumer_closed = true;
        state.frames.clear();
    }
}

/// Drive `source` on its own thread, pushing frames into `producer` until the
/// source ends, `stop` is cancelled, or the consumer goes away.
///
/// The handle yields the number of frames taken from the source.
pub fn spawn_capture<S>(
    mut source: S,
    producer: FrameProducer,
    stop: CancellationToken,
) -> Result<JoinHandle<usize>>
where
    S: FrameSource + 'static,
{
    let handle = std::thread::Builder::new()
        .name("burstfuse-capture".into())
        .spawn(move || {
            let mut pulled = 0;
            while !stop.is_cancelled() {
                let Some(frame) = source.next_frame() else {
                    debug!(pulled, "Capture source exhausted");
                    break;
                };
                pulled += 1;
                match producer.push(frame) {
                    PushOutcome::Accepted => {}
                    PushOutcome::DroppedOldest => {
                        let dropped = producer.dropped();
                        warn!(dropped, "Frame queue full, dropped oldest frame");
                        source.on_backpressure(dropped);
                    }
                    PushOutcome::Disconnected => break,
                }
            }
            producer.close();
            pulled
        })?;
    Ok(handle)
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Option<Frame> {
        (**self).next_frame()
    }

    fn on_backpressure(&mut self, dropped: usize) {
        (**self).on_backpressure(dropped)
    }
}
