//! Concurrent timed downloads reduced into a rolling throughput estimate.
//!
//! [`BandwidthMeter::measure`] spawns one aggregation task per run. The
//! aggregator starts the transfer workers, owns every counter, and is the only
//! task that publishes [`MeterEvent`]s. Workers report progress over a bounded
//! channel; the aggregator samples the byte delta on a fixed tick and stops at
//! the first horizon reached.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, sleep_until};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::transport::Transport;
use crate::error::{ToolboxError, ToolboxResult};
use crate::types::{MeterEvent, RunState, RunSummary, StopReason, ThroughputSample};

/// Progress messages buffered between the workers and the aggregator.
const REPORT_BUFFER: usize = 256;

/// Bandwidth run tuning.
#[derive(Debug, Clone)]
pub struct MeterConfig {
    /// Parallel downloads per run.
    pub concurrency: usize,
    /// Sampling period.
    pub interval: Duration,
    /// Time horizon.
    pub max_duration: Duration,
    /// Byte-count horizon.
    pub max_bytes: u64,
    /// Upper bound on a single download, connect to last byte.
    pub request_timeout: Duration,
    /// Events kept for a slow consumer before the oldest are dropped.
    pub buffer: usize,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            interval: Duration::from_millis(250),
            max_duration: Duration::from_secs(15),
            max_bytes: 256 * 1024 * 1024,
            request_timeout: Duration::from_secs(30),
            buffer: 16,
        }
    }
}

impl MeterConfig {
    pub fn validate(&self) -> ToolboxResult<()> {
        if !(1..=32).contains(&self.concurrency) {
            return Err(ToolboxError::InvalidArgument(format!(
                "bandwidth concurrency must be between 1 and 32, got {}",
                self.concurrency
            )));
        }
        if self.interval.is_zero() || self.max_duration.is_zero() || self.request_timeout.is_zero()
        {
            return Err(ToolboxError::InvalidArgument(
                "bandwidth interval, duration and request timeout must be positive".to_string(),
            ));
        }
        if self.max_bytes == 0 {
            return Err(ToolboxError::InvalidArgument(
                "bandwidth byte horizon must be positive".to_string(),
            ));
        }
        if self.buffer < 2 {
            return Err(ToolboxError::InvalidArgument(
                "bandwidth event buffer must hold at least 2 events".to_string(),
            ));
        }
        Ok(())
    }
}

/// Starts bandwidth runs.
#[derive(Clone)]
pub struct BandwidthMeter {
    config: MeterConfig,
    transport: Arc<dyn Transport>,
}

impl BandwidthMeter {
    pub fn new(config: MeterConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub const fn config(&self) -> &MeterConfig {
        &self.config
    }

    /// Start a run against `endpoints`, taken in order and cycled to fill
    /// every download slot. A failed transfer is replaced by the next endpoint
    /// not yet opened; the run fails once those are exhausted and nothing is
    /// still downloading.
    ///
    /// Must be called from within a Tokio runtime. The run stops as soon as
    /// the returned [`Measurement`] is dropped.
    pub fn measure(&self, endpoints: Vec<Url>) -> ToolboxResult<Measurement> {
        if endpoints.is_empty() {
            return Err(ToolboxError::NoEndpointsAvailable);
        }

        let (events_tx, events) = broadcast::channel(self.config.buffer);
        let (state_tx, state) = watch::channel(RunState::Initializing);
        let cancel = CancellationToken::new();

        let run = Run {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            endpoints,
            events: events_tx,
            state: state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(run.aggregate());

        Ok(Measurement {
            events,
            state,
            cancel,
            task,
            skipped: 0,
            finished: false,
        })
    }
}

/// Handle to a running measurement and the consumer end of its events.
///
/// Yields zero or more [`MeterEvent::Sample`]s followed by exactly one
/// terminal event. Dropping the handle cancels the run.
pub struct Measurement {
    events: broadcast::Receiver<MeterEvent>,
    state: watch::Receiver<RunState>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    skipped: u64,
    finished: bool,
}

impl Measurement {
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Samples dropped because the consumer fell behind.
    pub const fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Next event, or `None` after the terminal one.
    ///
    /// Cancel safe.
    pub async fn next(&mut self) -> Option<MeterEvent> {
        if self.finished {
            return None;
        }
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    self.finished = event.is_terminal();
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::debug!("Bandwidth consumer lagging, {n} samples dropped");
                    self.skipped += n;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}

impl Drop for Measurement {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

enum Report {
    Progress(u64),
    Finished,
    Failed(ToolboxError),
}

/// How the aggregation loop ended.
enum Outcome {
    Stopped(StopReason),
    AllFailed(String),
    Abandoned,
}

struct Run {
    config: MeterConfig,
    transport: Arc<dyn Transport>,
    endpoints: Vec<Url>,
    events: broadcast::Sender<MeterEvent>,
    state: watch::Sender<RunState>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Counters {
    total_bytes: u64,
    sampled_bytes: u64,
    active: usize,
    finished: usize,
    failed: usize,
    last_error: Option<ToolboxError>,
}

impl Run {
    async fn aggregate(self) {
        let (report_tx, mut reports) = mpsc::channel(REPORT_BUFFER);
        let mut workers = JoinSet::new();
        for url in self.endpoints.iter().cycle().take(self.config.concurrency) {
            self.spawn_transfer(&mut workers, url, &report_tx);
        }
        // Endpoints not yet opened replace failed transfers, in catalog order.
        let mut spare = self.endpoints.iter().skip(self.config.concurrency);

        let mut counters = Counters {
            active: self.config.concurrency,
            ..Counters::default()
        };
        self.state.send_replace(RunState::Measuring);
        log::info!(
            "Bandwidth run started: {} transfers over {} endpoints",
            self.config.concurrency,
            self.endpoints.len()
        );

        let started = Instant::now();
        let deadline = started + self.config.max_duration;
        let mut ticker =
            tokio::time::interval_at(started + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = started;

        let outcome = loop {
            tokio::select! {
                biased;
                report = reports.recv(), if counters.active > 0 => match report {
                    Some(Report::Progress(bytes)) => {
                        counters.total_bytes = counters.total_bytes.saturating_add(bytes);
                        if counters.total_bytes >= self.config.max_bytes {
                            break Outcome::Stopped(StopReason::Bytes);
                        }
                    }
                    Some(Report::Finished) => {
                        counters.active -= 1;
                        counters.finished += 1;
                    }
                    Some(Report::Failed(e)) => {
                        counters.failed += 1;
                        if let Some(url) = spare.next() {
                            log::warn!("Bandwidth transfer failed, trying {url}: {e}");
                            self.spawn_transfer(&mut workers, url, &report_tx);
                        } else {
                            counters.active -= 1;
                            log::warn!(
                                "Bandwidth transfer failed ({} still running): {e}",
                                counters.active
                            );
                        }
                        counters.last_error = Some(e);
                    }
                    None => counters.active = 0,
                },
                () = sleep_until(deadline) => break Outcome::Stopped(StopReason::Duration),
                now = ticker.tick() => {
                    if self.events.receiver_count() == 0 {
                        break Outcome::Abandoned;
                    }
                    if counters.active > 0 && counters.total_bytes > 0 {
                        let sample = sample(&mut counters, started, last_tick, now);
                        // 只有在消费者全部离开时才会失败
                        let _ = self.events.send(MeterEvent::Sample(sample));
                    }
                    last_tick = now;
                }
            }

            if counters.active == 0 {
                break if counters.finished == 0 {
                    Outcome::AllFailed(counters.last_error.take().map_or_else(
                        || "every transfer failed".to_string(),
                        |e| format!("every transfer failed, last error: {e}"),
                    ))
                } else {
                    Outcome::Stopped(StopReason::TransfersDrained)
                };
            }
        };

        drop(report_tx);
        self.cancel.cancel();
        workers.shutdown().await;

        let elapsed = started.elapsed();
        match outcome {
            Outcome::Stopped(reason) => {
                let summary = RunSummary {
                    total_bytes: counters.total_bytes,
                    elapsed,
                    average_bits_per_second: bits_per_second(counters.total_bytes, elapsed),
                    reason,
                    failed_transfers: counters.failed,
                };
                log::info!(
                    "Bandwidth run completed ({reason:?}): {} bytes in {elapsed:?}, {:.2} Mbps",
                    summary.total_bytes,
                    summary.average_bits_per_second / 1_000_000.0
                );
                self.state.send_replace(RunState::Completed);
                let _ = self.events.send(MeterEvent::Completed(summary));
            }
            Outcome::AllFailed(message) => {
                log::error!("Bandwidth run failed: {message}");
                self.state.send_replace(RunState::Failed);
                let _ = self.events.send(MeterEvent::Failed(message));
            }
            Outcome::Abandoned => {
                log::info!("Bandwidth consumer went away after {elapsed:?}, run stopped");
                self.state.send_replace(RunState::Failed);
            }
        }
    }
}

impl Run {
    fn spawn_transfer(
        &self,
        workers: &mut JoinSet<()>,
        url: &Url,
        reports: &mpsc::Sender<Report>,
    ) {
        workers.spawn(transfer(
            Arc::clone(&self.transport),
            url.clone(),
            reports.clone(),
            self.cancel.child_token(),
        ));
    }
}

fn sample(
    counters: &mut Counters,
    started: Instant,
    last_tick: Instant,
    now: Instant,
) -> ThroughputSample {
    let delta = counters.total_bytes - counters.sampled_bytes;
    counters.sampled_bytes = counters.total_bytes;
    ThroughputSample {
        bits_per_second: bits_per_second(delta, now.saturating_duration_since(last_tick)),
        elapsed: now.saturating_duration_since(started),
        total_bytes: counters.total_bytes,
        active_transfers: counters.active,
    }
}

fn bits_per_second(bytes: u64, window: Duration) -> f64 {
    let secs = window.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    bytes as f64 * 8.0 / secs
}

/// Drive one download to its end, reporting every chunk.
async fn transfer(
    transport: Arc<dyn Transport>,
    url: Url,
    reports: mpsc::Sender<Report>,
    cancel: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        opened = transport.open(&url) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            let _ = reports.send(Report::Failed(e)).await;
            return;
        }
    };

    loop {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            chunk = stream.next() => chunk,
        };
        let report = match chunk {
            Some(Ok(bytes)) => Report::Progress(bytes.len() as u64),
            Some(Err(e)) => Report::Failed(e),
            None => Report::Finished,
        };
        let last = !matches!(report, Report::Progress(_));
        if reports.send(report).await.is_err() || last {
            return;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;

    use super::*;
    use crate::services::bandwidth::transport::TransferStream;

    /// How a scripted download behaves.
    #[derive(Debug, Clone, Copy)]
    pub(crate) enum Behavior {
        /// `chunks` chunks, one every `pace`, then end.
        Finite { chunks: usize },
        /// Chunks forever.
        Endless,
        /// Refuse to open.
        FailOpen,
        /// Deliver `chunks` chunks, then error.
        FailAfter { chunks: usize },
    }

    /// Counts live transfer streams; each stream holds one guard.
    struct LiveGuard(Arc<AtomicUsize>);

    impl Drop for LiveGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub(crate) struct MockTransport {
        /// Behavior per endpoint host; endpoints not listed use `fallback`.
        behaviors: Vec<(String, Behavior)>,
        fallback: Behavior,
        chunk_size: usize,
        pace: Duration,
        pub(crate) live: Arc<AtomicUsize>,
        pub(crate) opened: Arc<Mutex<Vec<String>>>,
    }

    impl MockTransport {
        pub(crate) fn uniform(behavior: Behavior) -> Self {
            Self {
                behaviors: Vec::new(),
                fallback: behavior,
                chunk_size: 1000,
                pace: Duration::from_millis(10),
                live: Arc::new(AtomicUsize::new(0)),
                opened: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn with(mut self, host: &str, behavior: Behavior) -> Self {
            self.behaviors.push((host.to_string(), behavior));
            self
        }

        fn behavior_for(&self, url: &Url) -> Behavior {
            let host = url.host_str().unwrap_or_default();
            self.behaviors
                .iter()
                .find(|(h, _)| h == host)
                .map_or(self.fallback, |(_, b)| *b)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn open(&self, url: &Url) -> ToolboxResult<TransferStream> {
            self.opened
                .lock()
                .unwrap()
                .push(url.host_str().unwrap_or_default().to_string());
            let behavior = self.behavior_for(url);
            let (limit, fail_at_end) = match behavior {
                Behavior::FailOpen => {
                    return Err(ToolboxError::TransferError(format!("{url}: connection refused")));
                }
                Behavior::Finite { chunks } => (Some(chunks), false),
                Behavior::FailAfter { chunks } => (Some(chunks), true),
                Behavior::Endless => (None, false),
            };

            self.live.fetch_add(1, Ordering::SeqCst);
            let guard = LiveGuard(Arc::clone(&self.live));
            let chunk = Bytes::from(vec![0u8; self.chunk_size]);
            let pace = self.pace;

            let chunks = stream::unfold((0usize, guard), move |(sent, guard)| {
                let chunk = chunk.clone();
                async move {
                    tokio::time::sleep(pace).await;
                    match limit {
                        Some(limit) if sent >= limit => {
                            if fail_at_end && sent == limit {
                                Some((
                                    Err(ToolboxError::TransferError("connection reset".into())),
                                    (sent + 1, guard),
                                ))
                            } else {
                                None
                            }
                        }
                        _ => Some((Ok(chunk), (sent + 1, guard))),
                    }
                }
            });
            Ok(chunks.boxed())
        }
    }

    fn endpoints(hosts: &[&str]) -> Vec<Url> {
        hosts
            .iter()
            .map(|h| Url::parse(&format!("https://{h}/speedtest")).unwrap())
            .collect()
    }

    fn meter(transport: MockTransport, config: MeterConfig) -> BandwidthMeter {
        BandwidthMeter::new(config, Arc::new(transport))
    }

    fn completed(event: MeterEvent) -> RunSummary {
        match event {
            MeterEvent::Completed(summary) => summary,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    async fn collect(mut measurement: Measurement) -> (Vec<ThroughputSample>, MeterEvent) {
        let mut samples = Vec::new();
        while let Some(event) = measurement.next().await {
            match event {
                MeterEvent::Sample(s) => samples.push(s),
                terminal => return (samples, terminal),
            }
        }
        panic!("sequence ended without a terminal event");
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_endpoints_fail_before_anything_starts() {
        let transport = MockTransport::uniform(Behavior::Endless);
        let opened = Arc::clone(&transport.opened);
        let result = meter(transport, MeterConfig::default()).measure(Vec::new());
        assert!(matches!(result, Err(ToolboxError::NoEndpointsAvailable)));
        assert!(opened.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_horizon_produces_ordered_samples() {
        let transport = MockTransport::uniform(Behavior::Endless);
        let live = Arc::clone(&transport.live);
        let config = MeterConfig {
            max_duration: Duration::from_secs(2),
            ..MeterConfig::default()
        };
        let measurement = meter(transport, config).measure(endpoints(&["a.test"])).unwrap();
        let (samples, terminal) = collect(measurement).await;

        assert!(samples.len() >= 6, "got {} samples", samples.len());
        assert!(samples.windows(2).all(|w| w[0].elapsed < w[1].elapsed));
        assert!(samples.windows(2).all(|w| w[0].total_bytes <= w[1].total_bytes));
        assert!(samples.iter().all(|s| s.bits_per_second > 0.0));
        let summary = completed(terminal);
        assert_eq!(summary.reason, StopReason::Duration);
        assert!(summary.total_bytes > 0);
        assert_eq!(summary.failed_transfers, 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoints_cycle_to_fill_slots() {
        let transport = MockTransport::uniform(Behavior::Finite { chunks: 3 });
        let opened = Arc::clone(&transport.opened);
        let config = MeterConfig {
            concurrency: 5,
            ..MeterConfig::default()
        };
        let measurement = meter(transport, config)
            .measure(endpoints(&["a.test", "b.test"]))
            .unwrap();
        let (_, terminal) = collect(measurement).await;

        assert!(matches!(
            terminal,
            MeterEvent::Completed(RunSummary {
                reason: StopReason::TransfersDrained,
                ..
            })
        ));
        let mut opened = opened.lock().unwrap().clone();
        opened.sort();
        assert_eq!(opened, vec!["a.test", "a.test", "a.test", "b.test", "b.test"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_byte_horizon() {
        let transport = MockTransport::uniform(Behavior::Endless);
        let config = MeterConfig {
            max_bytes: 50_000,
            ..MeterConfig::default()
        };
        let measurement = meter(transport, config).measure(endpoints(&["a.test"])).unwrap();
        let (_, terminal) = collect(measurement).await;
        let summary = completed(terminal);
        assert_eq!(summary.reason, StopReason::Bytes);
        assert!(summary.total_bytes >= 50_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_transfers_failing() {
        let transport = MockTransport::uniform(Behavior::FailOpen);
        let measurement = meter(transport, MeterConfig::default())
            .measure(endpoints(&["a.test", "b.test"]))
            .unwrap();
        let state = measurement.state.clone();
        let (samples, terminal) = collect(measurement).await;

        assert!(samples.is_empty());
        assert!(matches!(terminal, MeterEvent::Failed(_)));
        assert_eq!(*state.borrow(), RunState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_transfer_tolerated() {
        let transport =
            MockTransport::uniform(Behavior::Endless).with("bad.test", Behavior::FailOpen);
        let config = MeterConfig {
            concurrency: 2,
            max_duration: Duration::from_secs(1),
            ..MeterConfig::default()
        };
        let measurement = meter(transport, config)
            .measure(endpoints(&["bad.test", "good.test"]))
            .unwrap();
        let (samples, terminal) = collect(measurement).await;

        assert!(!samples.is_empty());
        assert!(samples.windows(2).all(|w| w[0].elapsed < w[1].elapsed));
        let summary = completed(terminal);
        assert_eq!(summary.failed_transfers, 1);
        assert_eq!(summary.reason, StopReason::Duration);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_slots_refilled_from_unused_endpoints() {
        let transport = MockTransport::uniform(Behavior::Endless)
            .with("bad1.test", Behavior::FailOpen)
            .with("bad2.test", Behavior::FailOpen);
        let opened = Arc::clone(&transport.opened);
        let config = MeterConfig {
            concurrency: 2,
            max_duration: Duration::from_secs(1),
            ..MeterConfig::default()
        };
        let measurement = meter(transport, config)
            .measure(endpoints(&["bad1.test", "bad2.test", "good.test"]))
            .unwrap();
        let (samples, terminal) = collect(measurement).await;

        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.active_transfers == 1));
        let summary = completed(terminal);
        assert_eq!(summary.reason, StopReason::Duration);
        assert_eq!(summary.failed_transfers, 2);
        let mut opened = opened.lock().unwrap().clone();
        opened.sort();
        assert_eq!(opened, vec!["bad1.test", "bad2.test", "good.test"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fails_once_every_endpoint_is_tried() {
        let transport = MockTransport::uniform(Behavior::FailOpen);
        let opened = Arc::clone(&transport.opened);
        let config = MeterConfig {
            concurrency: 2,
            ..MeterConfig::default()
        };
        let measurement = meter(transport, config)
            .measure(endpoints(&["a.test", "b.test", "c.test", "d.test"]))
            .unwrap();
        let (samples, terminal) = collect(measurement).await;

        assert!(samples.is_empty());
        assert!(matches!(terminal, MeterEvent::Failed(_)));
        let mut opened = opened.lock().unwrap().clone();
        opened.sort();
        assert_eq!(opened, vec!["a.test", "b.test", "c.test", "d.test"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_stream_failure_after_data() {
        let transport = MockTransport::uniform(Behavior::FailAfter { chunks: 50 })
            .with("ok.test", Behavior::Finite { chunks: 100 });
        let config = MeterConfig {
            concurrency: 2,
            ..MeterConfig::default()
        };
        let measurement = meter(transport, config)
            .measure(endpoints(&["flaky.test", "ok.test"]))
            .unwrap();
        let (samples, terminal) = collect(measurement).await;

        assert!(!samples.is_empty());
        let summary = completed(terminal);
        assert_eq!(summary.reason, StopReason::TransfersDrained);
        assert_eq!(summary.failed_transfers, 1);
        assert_eq!(summary.total_bytes, 150 * 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let transport = MockTransport::uniform(Behavior::Finite { chunks: 2 });
        let mut measurement = meter(transport, MeterConfig::default())
            .measure(endpoints(&["a.test"]))
            .unwrap();
        assert!(!measurement.state().is_terminal());
        while measurement.next().await.is_some() {}
        assert_eq!(measurement.state(), RunState::Completed);
        assert!(measurement.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_every_transfer() {
        let transport = MockTransport::uniform(Behavior::Endless);
        let live = Arc::clone(&transport.live);
        let mut measurement = meter(transport, MeterConfig::default())
            .measure(endpoints(&["a.test", "b.test", "c.test"]))
            .unwrap();

        assert!(matches!(measurement.next().await, Some(MeterEvent::Sample(_))));
        assert_eq!(live.load(Ordering::SeqCst), 3);

        drop(measurement);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_loses_oldest_samples() {
        let transport = MockTransport::uniform(Behavior::Endless);
        let config = MeterConfig {
            buffer: 4,
            max_duration: Duration::from_secs(5),
            ..MeterConfig::default()
        };
        let mut measurement = meter(transport, config).measure(endpoints(&["a.test"])).unwrap();

        tokio::time::sleep(Duration::from_secs(6)).await;
        let mut events = Vec::new();
        while let Some(event) = measurement.next().await {
            events.push(event);
        }
        assert!(measurement.skipped() > 0);
        assert!(events.len() <= 4);
        assert!(matches!(events.last(), Some(MeterEvent::Completed(_))));
    }

    #[test]
    fn test_config_validation() {
        assert!(MeterConfig::default().validate().is_ok());
        let config = MeterConfig {
            concurrency: 0,
            ..MeterConfig::default()
        };
        assert!(matches!(config.validate(), Err(ToolboxError::InvalidArgument(_))));
        let config = MeterConfig {
            interval: Duration::ZERO,
            ..MeterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bits_per_second() {
        assert!((bits_per_second(1000, Duration::from_secs(1)) - 8000.0).abs() < f64::EPSILON);
        assert!(bits_per_second(1000, Duration::ZERO).abs() < f64::EPSILON);
    }
}
