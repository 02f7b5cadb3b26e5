//! Public types returned by toolbox operations.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serialize a [`Duration`] as fractional milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&(d.as_secs_f64() * 1000.0)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            let ms = Option::<f64>::deserialize(deserializer)?;
            Ok(ms.map(|ms| Duration::from_secs_f64(ms.max(0.0) / 1000.0)))
        }
    }

    pub mod vec {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer, ser::SerializeSeq};

        pub fn serialize<S: Serializer>(
            values: &[Duration],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for d in values {
                seq.serialize_element(&(d.as_secs_f64() * 1000.0))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Duration>, D::Error> {
            let ms = Vec::<f64>::deserialize(deserializer)?;
            Ok(ms
                .into_iter()
                .map(|ms| Duration::from_secs_f64(ms.max(0.0) / 1000.0))
                .collect())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
//  PING
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of a single echo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeStatus {
    /// A matching echo reply arrived before the timeout.
    Replied,
    /// No reply arrived before the timeout.
    TimedOut,
    /// A router reported the destination unreachable.
    Unreachable,
    /// The request could not be sent.
    Error,
}

/// One sample of a ping session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    /// Sequence number, unique within the session, starting at 0.
    pub sequence: u16,
    /// Round-trip time, present only for [`ProbeStatus::Replied`].
    #[serde(with = "duration_ms::option", default)]
    pub round_trip_time: Option<Duration>,
    /// Outcome of the request.
    pub status: ProbeStatus,
    /// Send failure detail for [`ProbeStatus::Error`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    pub(crate) const fn replied(sequence: u16, rtt: Duration) -> Self {
        Self {
            sequence,
            round_trip_time: Some(rtt),
            status: ProbeStatus::Replied,
            error: None,
        }
    }

    pub(crate) const fn unanswered(sequence: u16, status: ProbeStatus) -> Self {
        Self {
            sequence,
            round_trip_time: None,
            status,
            error: None,
        }
    }

    pub(crate) const fn failed(sequence: u16, error: String) -> Self {
        Self {
            sequence,
            round_trip_time: None,
            status: ProbeStatus::Error,
            error: Some(error),
        }
    }
}

/// Round-trip statistics of a completed ping session.
///
/// RTT fields are computed over replied samples only and are zero when nothing replied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeStatistics {
    /// Target as supplied by the caller.
    pub addr: String,
    /// Address that was actually probed.
    pub ip_addr: Option<IpAddr>,
    /// Number of echo requests sent.
    pub packets_sent: usize,
    /// Number of matching echo replies received.
    pub packets_received: usize,
    /// Percentage of requests without a reply, in `[0, 100]`.
    pub packet_loss: f64,
    /// Round-trip times of the replied samples, in send order.
    #[serde(with = "duration_ms::vec")]
    pub rtts: Vec<Duration>,
    #[serde(with = "duration_ms")]
    pub min_rtt: Duration,
    #[serde(with = "duration_ms")]
    pub max_rtt: Duration,
    #[serde(with = "duration_ms")]
    pub avg_rtt: Duration,
    /// Population standard deviation of the round-trip times.
    #[serde(with = "duration_ms")]
    pub std_dev_rtt: Duration,
    /// Every sample, ordered by sequence number.
    pub samples: Vec<ProbeResult>,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  WHOIS / DNS
// ═══════════════════════════════════════════════════════════════════════════════

/// WHOIS query result with parsed registration fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoisResult {
    /// The queried domain name.
    pub domain: String,
    /// Domain registrar (e.g. "Cloudflare, Inc.").
    pub registrar: Option<String>,
    /// Registration creation date.
    pub creation_date: Option<String>,
    /// Registration expiration date.
    pub expiration_date: Option<String>,
    /// Last updated date.
    pub updated_date: Option<String>,
    /// Authoritative name servers.
    pub name_servers: Vec<String>,
    /// EPP status codes.
    pub status: Vec<String>,
    /// Raw WHOIS response text.
    pub raw: String,
}

/// Addresses a hostname resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    /// The queried host.
    pub host: String,
    /// IPv4 addresses first, then IPv6, deduplicated.
    pub ips: Vec<IpAddr>,
}

// ═══════════════════════════════════════════════════════════════════════════════
//  BANDWIDTH
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of a bandwidth run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Initializing,
    Measuring,
    Completed,
    Failed,
}

impl RunState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One periodic throughput estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThroughputSample {
    /// Transfer rate over the last sampling interval.
    pub bits_per_second: f64,
    /// Time since the run started.
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// Bytes received by all transfers so far.
    pub total_bytes: u64,
    /// Transfers still running when the sample was taken.
    pub active_transfers: usize,
}

impl ThroughputSample {
    pub fn kbps(&self) -> f64 {
        self.bits_per_second / 1000.0
    }

    pub fn mbps(&self) -> f64 {
        self.bits_per_second / 1_000_000.0
    }
}

/// Why a completed run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// The duration horizon was reached.
    Duration,
    /// The byte-count horizon was reached.
    Bytes,
    /// Every transfer ended on its own.
    TransfersDrained,
}

/// Totals reported when a run completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_bytes: u64,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// Average rate over the whole run.
    pub average_bits_per_second: f64,
    pub reason: StopReason,
    /// Transfers that failed while others kept the run alive.
    pub failed_transfers: usize,
}

/// Item of the lazy sequence produced by a bandwidth run.
#[derive(Debug, Clone, PartialEq)]
pub enum MeterEvent {
    Sample(ThroughputSample),
    Completed(RunSummary),
    Failed(String),
}

impl MeterEvent {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Sample(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_result_serializes_rtt_as_millis() {
        let result = ProbeResult::replied(2, Duration::from_micros(1500));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["sequence"], 2);
        assert_eq!(json["status"], "replied");
        assert!((json["roundTripTime"].as_f64().unwrap() - 1.5).abs() < 1e-9);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_timed_out_result_has_null_rtt() {
        let result = ProbeResult::unanswered(0, ProbeStatus::TimedOut);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["roundTripTime"].is_null());
        assert_eq!(json["status"], "timedOut");
    }

    #[test]
    fn test_throughput_units() {
        let sample = ThroughputSample {
            bits_per_second: 12_345_000.0,
            elapsed: Duration::from_secs(1),
            total_bytes: 0,
            active_transfers: 1,
        };
        assert!((sample.kbps() - 12_345.0).abs() < f64::EPSILON);
        assert!((sample.mbps() - 12.345).abs() < 1e-9);
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::Measuring.is_terminal());
        assert!(MeterEvent::Failed("x".into()).is_terminal());
    }
}
