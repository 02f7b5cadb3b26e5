//! Per-session correlation of echo replies with sent requests.

use std::time::Duration;

use tokio::time::Instant;

use super::packet::{EchoReply, ReplyKind};
use crate::types::{ProbeResult, ProbeStatus};

/// Why an incoming reply was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Discard {
    /// Identifier belongs to another session or process.
    ForeignSession,
    /// Sequence was never sent in this session.
    UnknownSequence,
    /// Sequence already has an outcome (duplicate or late reply).
    AlreadyResolved,
}

struct Entry {
    sent_at: Instant,
    outcome: Option<ProbeResult>,
}

/// Outstanding requests of one session, indexed by sequence number.
///
/// Entries are only created by the send path; replies can resolve an
/// outstanding entry but never add one.
pub(crate) struct ReplyTable {
    identifier: u16,
    expected: usize,
    entries: Vec<Entry>,
}

impl ReplyTable {
    pub(crate) fn new(identifier: u16, expected: usize) -> Self {
        Self {
            identifier,
            expected,
            entries: Vec::with_capacity(expected),
        }
    }

    /// Sequence number the next request must carry.
    pub(crate) fn next_sequence(&self) -> Option<u16> {
        if self.entries.len() >= self.expected {
            return None;
        }
        u16::try_from(self.entries.len()).ok()
    }

    pub(crate) fn record_sent(&mut self, sent_at: Instant) {
        self.entries.push(Entry {
            sent_at,
            outcome: None,
        });
    }

    pub(crate) fn record_send_error(&mut self, sent_at: Instant, sequence: u16, error: String) {
        self.entries.push(Entry {
            sent_at,
            outcome: Some(ProbeResult::failed(sequence, error)),
        });
    }

    /// Resolve the outstanding entry a reply refers to.
    pub(crate) fn accept(&mut self, reply: EchoReply, received_at: Instant) -> Result<(), Discard> {
        if reply.identifier != self.identifier {
            return Err(Discard::ForeignSession);
        }
        let entry = self
            .entries
            .get_mut(usize::from(reply.sequence))
            .ok_or(Discard::UnknownSequence)?;
        if entry.outcome.is_some() {
            return Err(Discard::AlreadyResolved);
        }
        entry.outcome = Some(match reply.kind {
            ReplyKind::EchoReply => ProbeResult::replied(
                reply.sequence,
                received_at.saturating_duration_since(entry.sent_at),
            ),
            ReplyKind::Unreachable => {
                ProbeResult::unanswered(reply.sequence, ProbeStatus::Unreachable)
            }
        });
        Ok(())
    }

    /// Mark every outstanding entry older than `timeout` as timed out.
    pub(crate) fn expire(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut expired = 0;
        for (sequence, entry) in self.entries.iter_mut().enumerate() {
            if entry.outcome.is_none() && now >= entry.sent_at + timeout {
                let sequence = u16::try_from(sequence).unwrap_or(u16::MAX);
                entry.outcome = Some(ProbeResult::unanswered(sequence, ProbeStatus::TimedOut));
                expired += 1;
            }
        }
        expired
    }

    /// Earliest instant at which an outstanding entry times out.
    pub(crate) fn next_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.entries
            .iter()
            .filter(|e| e.outcome.is_none())
            .map(|e| e.sent_at + timeout)
            .min()
    }

    /// Every expected request was sent and has an outcome.
    pub(crate) fn is_settled(&self) -> bool {
        self.entries.len() == self.expected && self.entries.iter().all(|e| e.outcome.is_some())
    }

    /// Consume the table into one result per sequence.
    pub(crate) fn into_results(self) -> Vec<ProbeResult> {
        self.entries
            .into_iter()
            .enumerate()
            .map(|(sequence, entry)| {
                entry.outcome.unwrap_or_else(|| {
                    let sequence = u16::try_from(sequence).unwrap_or(u16::MAX);
                    ProbeResult::unanswered(sequence, ProbeStatus::TimedOut)
                })
            })
            .collect()
    }
}
