// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Fire-and-forget frame publisher (§4.8).

use serde::Serialize;
use tokio::sync::broadcast;

use vrx_core::model::{Frame, FrameFormat};

/// Wire metadata accompanying each published frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub format: &'static str,
    pub ts: f64,
    pub freq_hz: u64,
}

impl From<&Frame> for FrameMetadata {
    fn from(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            format: match frame.format {
                FrameFormat::Gray8 => "gray8",
                FrameFormat::Bgr24 => "bgr24",
            },
            ts: frame.timestamp,
            freq_hz: frame.tuned_freq_hz,
        }
    }
}

/// A published frame, ready to serialize onto the wire as
/// `(topic, metadata_json, pixel_bytes)`.
#[derive(Debug, Clone)]
pub struct PublishedFrame {
    pub topic: String,
    pub metadata_json: String,
    pub pixel_bytes: Vec<u8>,
}

impl PublishedFrame {
    pub fn from_frame(topic: &str, frame: &Frame) -> Self {
        let metadata = FrameMetadata::from(frame);
        Self {
            topic: topic.to_string(),
            metadata_json: serde_json::to_string(&metadata)
                .unwrap_or_else(|_| "{}".to_string()),
            pixel_bytes: frame.pixels.clone(),
        }
    }
}

/// Write-only frame publishing surface. No acknowledgement, no queueing
/// beyond one transport buffer; slow subscribers are dropped, not blocked.
pub trait FramePublisher: Send {
    fn publish(&self, topic: &str, frame: &Frame);
}

/// Default bound on the single transport buffer slot per subscriber, chosen
/// to let one consumer lag by a few frames before it is dropped rather than
/// ever back-pressuring the producer.
const PUBLISH_CHANNEL_CAPACITY: usize = 4;

/// `tokio::sync::broadcast`-backed publisher: fire-and-forget, drops slow
/// subscribers, matches the fan-out pattern used for this codebase's other
/// per-channel broadcast taps.
pub struct BroadcastFramePublisher {
    sender: broadcast::Sender<PublishedFrame>,
}

impl BroadcastFramePublisher {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _rx) = broadcast::channel(PUBLISH_CHANNEL_CAPACITY);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedFrame> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastFramePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl FramePublisher for BroadcastFramePublisher {
    fn publish(&self, topic: &str, frame: &Frame) {
        // A send failure here means there are no subscribers; that is not
        // an error condition for a fire-and-forget publisher.
        let _ = self.sender.send(PublishedFrame::from_frame(topic, frame));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrx_core::model::FrameFormat;

    fn sample_frame(freq_hz: u64) -> Frame {
        Frame::new(4, 2, FrameFormat::Gray8, freq_hz, vec![0u8; 8])
    }

    #[test]
    fn published_frame_pixel_length_matches_dimensions() {
        let frame = sample_frame(5_806_000_000);
        let published = PublishedFrame::from_frame("vrx/frame", &frame);
        assert_eq!(published.pixel_bytes.len(), 4 * 2);
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let publisher = BroadcastFramePublisher::new();
        publisher.publish("vrx/frame", &sample_frame(5_806_000_000));
    }

    #[test]
    fn slow_subscriber_lags_but_producer_is_not_blocked() {
        let publisher = BroadcastFramePublisher::new();
        let mut rx = publisher.subscribe();
        for _ in 0..(PUBLISH_CHANNEL_CAPACITY * 3) {
            publisher.publish("vrx/frame", &sample_frame(5_806_000_000));
        }
        // The receiver lagged; it should still be able to recover by
        // resubscribing/catching the Lagged error rather than deadlocking.
        assert!(rx.try_recv().is_ok() || matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Lagged(_))));
    }
}
