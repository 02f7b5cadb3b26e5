//! Reduction of a session's samples into round-trip statistics.

use std::net::IpAddr;
use std::time::Duration;

use crate::types::{ProbeResult, ProbeStatistics, ProbeStatus};

impl ProbeStatistics {
    /// Compute statistics over `samples`.
    ///
    /// The mean is taken in whole nanoseconds (rounded down) so it can never
    /// fall outside `[min, max]`.
    pub fn from_samples(addr: &str, ip_addr: Option<IpAddr>, samples: Vec<ProbeResult>) -> Self {
        let rtts: Vec<Duration> = samples
            .iter()
            .filter(|s| s.status == ProbeStatus::Replied)
            .filter_map(|s| s.round_trip_time)
            .collect();

        let packets_sent = samples.len();
        let packets_received = rtts.len();
        let packet_loss = if packets_sent == 0 {
            0.0
        } else {
            (packets_sent - packets_received) as f64 * 100.0 / packets_sent as f64
        };

        let (min_rtt, max_rtt, avg_rtt, std_dev_rtt) = rtt_summary(&rtts);

        Self {
            addr: addr.to_string(),
            ip_addr,
            packets_sent,
            packets_received,
            packet_loss,
            rtts,
            min_rtt,
            max_rtt,
            avg_rtt,
            std_dev_rtt,
            samples,
        }
    }
}

fn rtt_summary(rtts: &[Duration]) -> (Duration, Duration, Duration, Duration) {
    let (Some(min), Some(max)) = (rtts.iter().min(), rtts.iter().max()) else {
        return (Duration::ZERO, Duration::ZERO, Duration::ZERO, Duration::ZERO);
    };

    let count = rtts.len() as u128;
    let total: u128 = rtts.iter().map(Duration::as_nanos).sum();
    let avg_nanos = total / count;

    let mean = avg_nanos as f64;
    let variance = rtts
        .iter()
        .map(|d| {
            let diff = d.as_nanos() as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / rtts.len() as f64;

    let avg = Duration::from_nanos(u64::try_from(avg_nanos).unwrap_or(u64::MAX));
    let std_dev = Duration::from_secs_f64(variance.sqrt() / 1e9);
    (*min, *max, avg, std_dev)
}
