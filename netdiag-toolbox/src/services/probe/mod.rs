//! ICMP echo probe engine.
//!
//! One [`Pinger::run`] call owns one conversation: it resolves the target,
//! opens an ICMP socket, sends `count` echo requests spaced by the configured
//! interval, and correlates replies by sequence number in a session-local
//! [`ReplyTable`]. A background listener decodes incoming messages while the
//! session loop sleeps between sends and timeouts.

mod packet;
mod socket;
mod stats;
mod table;

use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::error::{ToolboxError, ToolboxResult};
use crate::services::resolver::{HostResolver, SystemResolver};
use crate::services::validate_target;
use crate::types::ProbeStatistics;

pub use packet::{EchoReply, EchoRequest, IcmpFamily, ReplyKind};
pub use socket::{EchoSocket, IcmpNetwork, SystemIcmpNetwork};
use table::ReplyTable;

/// Requests sent when the caller does not say otherwise.
pub const DEFAULT_REQUEST_COUNT: usize = 3;

/// Upper bound on requests per session.
pub const MAX_REQUEST_COUNT: usize = 100;

/// Replies buffered between the listener and the session loop.
const REPLY_BUFFER: usize = 64;

/// Probe engine tuning.
#[derive(Debug, Clone)]
pub struct PingConfig {
    /// How long each request waits for its reply.
    pub timeout: Duration,
    /// Minimum spacing between two sends; must not exceed `timeout`.
    pub interval: Duration,
    /// Echo payload size in bytes.
    pub payload_size: usize,
    /// Use raw sockets (`true`) or unprivileged datagram ICMP sockets.
    pub privileged: bool,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            interval: Duration::from_secs(1),
            payload_size: 56,
            privileged: true,
        }
    }
}

impl PingConfig {
    pub fn validate(&self) -> ToolboxResult<()> {
        if self.timeout.is_zero() {
            return Err(ToolboxError::InvalidArgument(
                "ping timeout must be positive".to_string(),
            ));
        }
        if self.interval > self.timeout {
            return Err(ToolboxError::InvalidArgument(format!(
                "ping interval ({:?}) must not exceed the timeout ({:?})",
                self.interval, self.timeout
            )));
        }
        if self.payload_size > 1024 {
            return Err(ToolboxError::InvalidArgument(format!(
                "ping payload of {} bytes exceeds 1024",
                self.payload_size
            )));
        }
        Ok(())
    }
}

/// Runs ping sessions.
#[derive(Clone)]
pub struct Pinger {
    config: PingConfig,
    resolver: Arc<dyn HostResolver>,
    network: Arc<dyn IcmpNetwork>,
}

impl Pinger {
    pub fn new(
        config: PingConfig,
        resolver: Arc<dyn HostResolver>,
        network: Arc<dyn IcmpNetwork>,
    ) -> Self {
        Self {
            config,
            resolver,
            network,
        }
    }

    /// Pinger over the system resolver and operating system sockets.
    pub fn system(config: PingConfig) -> Self {
        let network = Arc::new(SystemIcmpNetwork::new(config.privileged));
        Self::new(config, Arc::new(SystemResolver), network)
    }

    pub const fn config(&self) -> &PingConfig {
        &self.config
    }

    /// Send `count` echo requests to `target` and summarize the replies.
    ///
    /// Setup failures (bad arguments, unresolvable target, socket cannot be
    /// opened) abort the run; per-request failures are recorded as samples.
    pub async fn run(&self, target: &str, count: usize) -> ToolboxResult<ProbeStatistics> {
        if !(1..=MAX_REQUEST_COUNT).contains(&count) {
            return Err(ToolboxError::InvalidArgument(format!(
                "request count must be between 1 and {MAX_REQUEST_COUNT}, got {count}"
            )));
        }
        let target = validate_target(target)?;
        let addr = self.resolve(&target).await?;

        let identifier: u16 = rand::random();
        let socket = self
            .network
            .open(addr, identifier)
            .await
            .map_err(|e| open_error(addr, &e))?;

        log::info!("PING {target} ({addr}): {count} requests, identifier {identifier:#06x}");
        let samples = run_session(socket, identifier, count, &self.config).await;
        let stats = ProbeStatistics::from_samples(&target, Some(addr), samples);
        log::info!(
            "PING {target}: {}/{} replies, {:.1}% loss, avg {:?}",
            stats.packets_received,
            stats.packets_sent,
            stats.packet_loss,
            stats.avg_rtt
        );
        Ok(stats)
    }

    async fn resolve(&self, target: &str) -> ToolboxResult<IpAddr> {
        if let Ok(ip) = target.parse::<IpAddr>() {
            return Ok(ip);
        }
        let ips = self.resolver.resolve(target).await?;
        ips.iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| ips.first())
            .copied()
            .ok_or_else(|| ToolboxError::ResolutionError(format!("{target}: no addresses found")))
    }
}

fn open_error(addr: IpAddr, e: &io::Error) -> ToolboxError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        log::error!("Cannot open ICMP socket for {addr}: {e}");
        ToolboxError::PermissionError(format!(
            "opening an ICMP socket requires elevated privileges (root or CAP_NET_RAW): {e}"
        ))
    } else {
        ToolboxError::NetworkError(format!("failed to open ICMP socket for {addr}: {e}"))
    }
}

/// Aborts the reply listener when the session ends, on every exit path.
struct ListenerGuard(JoinHandle<()>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn listen(socket: Arc<dyn EchoSocket>, replies: mpsc::Sender<(EchoReply, Instant)>) {
    loop {
        match socket.recv().await {
            Ok(reply) => {
                if replies.send((reply, Instant::now())).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                log::warn!("ICMP receive failed, outstanding requests will time out: {e}");
                return;
            }
        }
    }
}

async fn run_session(
    socket: Arc<dyn EchoSocket>,
    identifier: u16,
    count: usize,
    config: &PingConfig,
) -> Vec<crate::types::ProbeResult> {
    let (tx, mut replies) = mpsc::channel(REPLY_BUFFER);
    let _listener = ListenerGuard(tokio::spawn(listen(Arc::clone(&socket), tx)));

    let mut table = ReplyTable::new(identifier, count);
    let mut next_send = Instant::now();

    loop {
        let now = Instant::now();
        table.expire(now, config.timeout);
        let next_sequence = table.next_sequence();
        if next_sequence.is_none() && table.is_settled() {
            break;
        }
        let deadline = table.next_deadline(config.timeout);

        tokio::select! {
            biased;
            Some((reply, received_at)) = replies.recv() => {
                if let Err(reason) = table.accept(reply, received_at) {
                    log::debug!(
                        "Discarded ICMP reply id={:#06x} seq={}: {reason:?}",
                        reply.identifier,
                        reply.sequence
                    );
                }
            }
            () = sleep_until(next_send), if next_sequence.is_some() => {
                let sequence = next_sequence.unwrap_or_default();
                let request = EchoRequest::new(identifier, sequence, config.payload_size);
                let sent_at = Instant::now();
                match socket.send(&request).await {
                    Ok(()) => table.record_sent(sent_at),
                    Err(e) => {
                        log::warn!("Echo request seq={sequence} failed: {e}");
                        table.record_send_error(sent_at, sequence, e.to_string());
                    }
                }
                next_send = sent_at + config.interval;
            }
            () = sleep_until(deadline.unwrap_or(now)), if deadline.is_some() => {}
        }
    }

    table.into_results()
}
