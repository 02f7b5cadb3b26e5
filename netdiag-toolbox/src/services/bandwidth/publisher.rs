//! Relays a measurement to a client as Server-Sent Events.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::meter::Measurement;
use crate::error::{ToolboxError, ToolboxResult};
use crate::types::{MeterEvent, RunSummary};

/// Destination of encoded SSE frames, usually a client connection.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Write one frame. An error means the client is gone.
    async fn send(&mut self, frame: Bytes) -> ToolboxResult<()>;

    /// Resolves once the client is known to be gone.
    async fn closed(&self) {
        futures::future::pending::<()>().await;
    }
}

/// [`EventSink`] over a bounded channel whose receiver feeds a response body.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub const fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, frame: Bytes) -> ToolboxResult<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| ToolboxError::NetworkError("event stream closed by client".to_string()))
    }

    async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// How a publishing session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// The run completed and the `done` frame was written.
    Completed(RunSummary),
    /// The run failed and the `error` frame was written (if the client was still there).
    Failed(String),
    /// The client went away or stopped reading; the run was cancelled.
    Disconnected,
}

/// Writes measurement events to a sink.
#[derive(Debug, Clone, Copy)]
pub struct StreamPublisher {
    write_timeout: Duration,
}

impl Default for StreamPublisher {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl StreamPublisher {
    pub const fn new(write_timeout: Duration) -> Self {
        Self { write_timeout }
    }

    /// Relay every event of `measurement` to `sink`, in order, until the
    /// terminal one is written or the sink gives up.
    ///
    /// The measurement is dropped on return, which releases every transfer.
    pub async fn run<S: EventSink>(
        &self,
        mut measurement: Measurement,
        mut sink: S,
    ) -> PublishOutcome {
        loop {
            let event = tokio::select! {
                biased;
                () = sink.closed() => {
                    log::info!("Bandwidth client disconnected, cancelling run");
                    return PublishOutcome::Disconnected;
                }
                event = measurement.next() => event,
            };
            let event = event.unwrap_or_else(|| {
                MeterEvent::Failed("measurement ended without a result".to_string())
            });

            if let Err(e) = self.write(&mut sink, encode_event(&event)).await {
                log::info!("Bandwidth client unreachable, cancelling run: {e}");
                return PublishOutcome::Disconnected;
            }

            match event {
                MeterEvent::Sample(_) => {}
                MeterEvent::Completed(summary) => return PublishOutcome::Completed(summary),
                MeterEvent::Failed(message) => return PublishOutcome::Failed(message),
            }
        }
    }

    async fn write<S: EventSink>(&self, sink: &mut S, frame: Bytes) -> ToolboxResult<()> {
        tokio::time::timeout(self.write_timeout, sink.send(frame))
            .await
            .map_err(|_| {
                ToolboxError::NetworkError(format!(
                    "client did not accept a frame within {:?}",
                    self.write_timeout
                ))
            })?
    }
}

/// Encode one event as an SSE frame.
///
/// Samples keep the `"<kbps> Kbps <mbps> Mbps"` text payload under the
/// default `message` event; terminal events are `done` and `error` with JSON data.
pub fn encode_event(event: &MeterEvent) -> Bytes {
    let frame = match event {
        MeterEvent::Sample(sample) => format!(
            "event: message\ndata: {:.2} Kbps {:.2} Mbps\n\n",
            sample.kbps(),
            sample.mbps()
        ),
        MeterEvent::Completed(summary) => format!(
            "event: done\ndata: {}\n\n",
            serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
        ),
        MeterEvent::Failed(message) => format!(
            "event: error\ndata: {}\n\n",
            serde_json::json!({ "error": message })
        ),
    };
    Bytes::from(frame)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    use url::Url;

    use super::*;
    use crate::services::bandwidth::meter::tests::{Behavior, MockTransport};
    use crate::services::bandwidth::{BandwidthMeter, MeterConfig};
    use crate::types::{StopReason, ThroughputSample};

    /// Accepts `capacity` frames, then refuses every write.
    struct RefusingSink {
        frames: Arc<Mutex<Vec<String>>>,
        capacity: usize,
    }

    impl RefusingSink {
        fn new(capacity: usize) -> (Self, Arc<Mutex<Vec<String>>>) {
            let frames = Arc::new(Mutex::new(Vec::new()));
            let sink = Self {
                frames: Arc::clone(&frames),
                capacity,
            };
            (sink, frames)
        }
    }

    #[async_trait]
    impl EventSink for RefusingSink {
        async fn send(&mut self, frame: Bytes) -> ToolboxResult<()> {
            let mut frames = self.frames.lock().unwrap();
            if frames.len() >= self.capacity {
                return Err(ToolboxError::NetworkError("broken pipe".into()));
            }
            frames.push(String::from_utf8(frame.to_vec()).unwrap());
            Ok(())
        }
    }

    /// Never completes a write.
    struct StalledSink;

    #[async_trait]
    impl EventSink for StalledSink {
        async fn send(&mut self, _frame: Bytes) -> ToolboxResult<()> {
            futures::future::pending().await
        }
    }

    fn start(transport: MockTransport, config: MeterConfig, hosts: &[&str]) -> Measurement {
        let endpoints = hosts
            .iter()
            .map(|h| Url::parse(&format!("https://{h}/")).unwrap())
            .collect();
        BandwidthMeter::new(config, Arc::new(transport))
            .measure(endpoints)
            .unwrap()
    }

    fn short_run() -> MeterConfig {
        MeterConfig {
            max_duration: Duration::from_secs(1),
            ..MeterConfig::default()
        }
    }

    #[test]
    fn test_sample_frame_format() {
        let frame = encode_event(&MeterEvent::Sample(ThroughputSample {
            bits_per_second: 12_345_678.0,
            elapsed: Duration::from_millis(250),
            total_bytes: 1,
            active_transfers: 1,
        }));
        assert_eq!(
            &frame[..],
            b"event: message\ndata: 12345.68 Kbps 12.35 Mbps\n\n"
        );
    }

    #[test]
    fn test_error_frame_is_json() {
        let frame = encode_event(&MeterEvent::Failed("no route".into()));
        let text = String::from_utf8(frame.to_vec()).unwrap();
        let data = text
            .strip_prefix("event: error\ndata: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(json["error"], "no route");
    }

    #[tokio::test(start_paused = true)]
    async fn test_relays_samples_then_done() {
        let (tx, mut rx) = mpsc::channel(64);
        let measurement = start(
            MockTransport::uniform(Behavior::Endless),
            short_run(),
            &["a.test"],
        );
        let outcome = StreamPublisher::default()
            .run(measurement, ChannelSink::new(tx))
            .await;

        let PublishOutcome::Completed(summary) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(summary.reason, StopReason::Duration);

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(String::from_utf8(frame.to_vec()).unwrap());
        }
        let (last, samples) = frames.split_last().unwrap();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|f| f.starts_with("event: message\ndata: ")));
        assert!(samples.iter().all(|f| f.ends_with(" Mbps\n\n")));
        assert!(last.starts_with("event: done\ndata: {"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_a_terminal_frame() {
        let (sink, frames) = RefusingSink::new(usize::MAX);
        let measurement = start(
            MockTransport::uniform(Behavior::FailOpen),
            MeterConfig::default(),
            &["a.test", "b.test"],
        );
        let outcome = StreamPublisher::default().run(measurement, sink).await;

        assert!(matches!(outcome, PublishOutcome::Failed(_)));
        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("event: error\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_write_releases_transfers() {
        let transport = MockTransport::uniform(Behavior::Endless);
        let live = Arc::clone(&transport.live);
        let measurement = start(transport, MeterConfig::default(), &["a.test", "b.test"]);
        let (sink, frames) = RefusingSink::new(2);

        let outcome = StreamPublisher::default().run(measurement, sink).await;
        assert_eq!(outcome, PublishOutcome::Disconnected);
        assert_eq!(frames.lock().unwrap().len(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_receiver_releases_transfers() {
        let transport = MockTransport::uniform(Behavior::Endless);
        let live = Arc::clone(&transport.live);
        let measurement = start(transport, MeterConfig::default(), &["a.test"]);
        let (tx, mut rx) = mpsc::channel(4);

        let publisher = tokio::spawn(async move {
            StreamPublisher::default()
                .run(measurement, ChannelSink::new(tx))
                .await
        });
        assert!(rx.recv().await.is_some());
        assert_eq!(live.load(Ordering::SeqCst), 3);
        drop(rx);

        assert_eq!(publisher.await.unwrap(), PublishOutcome::Disconnected);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_client_times_out() {
        let transport = MockTransport::uniform(Behavior::Endless);
        let live = Arc::clone(&transport.live);
        let config = MeterConfig {
            max_duration: Duration::from_secs(60),
            ..MeterConfig::default()
        };
        let measurement = start(transport, config, &["a.test"]);
        let started = tokio::time::Instant::now();

        let outcome = StreamPublisher::new(Duration::from_secs(2))
            .run(measurement, StalledSink)
            .await;
        assert_eq!(outcome, PublishOutcome::Disconnected);
        assert!(started.elapsed() < Duration::from_secs(3));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }
}
