use std::sync::{Arc, Mutex};
use std::time::Duration;

use burstfuse_core::frame::{CaptureMetadata, Frame};
use burstfuse_core::pipeline::queue::{PushOutcome, Received};
use burstfuse_core::pipeline::{frame_channel, spawn_capture, CancellationToken, FrameSource};
use ndarray::Array2;

fn stamped(timestamp_us: u64) -> Frame {
    Frame::gray(Array2::from_elem((4, 4), 0.5f32)).with_metadata(CaptureMetadata {
        timestamp_us: Some(timestamp_us),
        ..CaptureMetadata::default()
    })
}

fn timestamp(received: Received) -> Option<u64> {
    match received {
        Received::Frame(frame) => frame.metadata.timestamp_us,
        _ => None,
    }
}

/// Yields `count` stamped frames and records every backpressure report.
struct CountingSource {
    next: u64,
    count: u64,
    reports: Arc<Mutex<Vec<usize>>>,
}

impl FrameSource for CountingSource {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.next >= self.count {
            return None;
        }
        self.next += 1;
        Some(stamped(self.next))
    }

    fn on_backpressure(&mut self, dropped: usize) {
        self.reports.lock().unwrap().push(dropped);
    }
}

#[test]
fn test_full_queue_drops_oldest() {
    let (producer, consumer) = frame_channel(2);
    assert_eq!(producer.push(stamped(1)), PushOutcome::Accepted);
    assert_eq!(producer.push(stamped(2)), PushOutcome::Accepted);
    assert_eq!(producer.push(stamped(3)), PushOutcome::DroppedOldest);
    assert_eq!(producer.dropped(), 1);
    assert_eq!(consumer.len(), 2);

    let short = Duration::from_millis(10);
    assert_eq!(timestamp(consumer.recv_timeout(short)), Some(2));
    assert_eq!(timestamp(consumer.recv_timeout(short)), Some(3));
    assert!(matches!(consumer.recv_timeout(short), Received::Timeout));
}

#[test]
fn test_closed_queue_drains_then_reports_closed() {
    let (producer, consumer) = frame_channel(4);
    producer.push(stamped(7));
    drop(producer);

    let short = Duration::from_millis(10);
    assert_eq!(timestamp(consumer.recv_timeout(short)), Some(7));
    assert!(matches!(consumer.recv_timeout(short), Received::Closed));
}

#[test]
fn test_push_after_consumer_dropped() {
    let (producer, consumer) = frame_channel(1);
    drop(consumer);
    assert!(producer.is_disconnected());
    assert_eq!(producer.push(stamped(1)), PushOutcome::Disconnected);
}

#[test]
fn test_capacity_is_at_least_one() {
    let (_producer, consumer) = frame_channel(0);
    assert_eq!(consumer.capacity(), 1);
    assert!(consumer.is_empty());
}

#[test]
fn test_recv_wakes_on_push() {
    let (producer, consumer) = frame_channel(2);
    let pusher = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        producer.push(stamped(42));
    });
    assert_eq!(timestamp(consumer.recv_timeout(Duration::from_secs(10))), Some(42));
    pusher.join().unwrap();
}

#[test]
fn test_capture_pump_reports_backpressure() {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let source = CountingSource {
        next: 0,
        count: 5,
        reports: reports.clone(),
    };
    let (producer, consumer) = frame_channel(2);
    let pump = spawn_capture(source, producer, CancellationToken::new()).unwrap();

    // Nobody drains until the source is exhausted.
    assert_eq!(pump.join().unwrap(), 5);
    assert_eq!(*reports.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(consumer.dropped(), 3);

    let short = Duration::from_millis(10);
    assert_eq!(timestamp(consumer.recv_timeout(short)), Some(4));
    assert_eq!(timestamp(consumer.recv_timeout(short)), Some(5));
    assert!(matches!(consumer.recv_timeout(short), Received::Closed));
}

#[test]
fn test_capture_pump_stops_on_request() {
    let stop = CancellationToken::new();
    stop.cancel();
    let (producer, consumer) = frame_channel(2);
    let source = vec![stamped(1), stamped(2)].into_iter();
    let pump = spawn_capture(source, producer, stop).unwrap();

    assert_eq!(pump.join().unwrap(), 0);
    assert!(matches!(
        consumer.recv_timeout(Duration::from_millis(10)),
        Received::Closed
    ));
}
