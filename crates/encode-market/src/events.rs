//! Marketplace events and the sinks that receive them.
//!
//! Every successful state-changing operation emits exactly one
//! [`MarketEvent`]. Failed operations emit nothing.

use std::sync::Arc;

use encode_ledger::{AccountId, Amount, Height};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::{JobId, ProposalId};

/// A committed marketplace state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// A job was posted.
    JobCreated {
        /// New job.
        job: JobId,
        /// Posting account.
        creator: AccountId,
        /// Maximum payment.
        budget: Amount,
        /// Proposal window end.
        deadline: Height,
        /// Height of the call.
        height: Height,
    },
    /// A proposal was submitted.
    ProposalSubmitted {
        /// Target job.
        job: JobId,
        /// New proposal.
        proposal: ProposalId,
        /// Bidding account.
        proposer: AccountId,
        /// Requested amount.
        bid: Amount,
        /// Height of the call.
        height: Height,
    },
    /// The creator accepted a proposal and funded escrow.
    ProposalAccepted {
        /// The job.
        job: JobId,
        /// The winning proposal.
        proposal: ProposalId,
        /// Amount moved into escrow.
        escrowed: Amount,
        /// Other proposals rejected in the same call.
        rejected: Vec<ProposalId>,
        /// Height of the call.
        height: Height,
    },
    /// A proposer withdrew their proposal.
    ProposalWithdrawn {
        /// The job.
        job: JobId,
        /// The withdrawn proposal.
        proposal: ProposalId,
        /// Height of the call.
        height: Height,
    },
    /// The accepted provider agreed to cancellation.
    CancellationApproved {
        /// The job.
        job: JobId,
        /// Approving provider.
        provider: AccountId,
        /// Height of the call.
        height: Height,
    },
    /// Delivery confirmed and escrow released.
    JobCompleted {
        /// The job.
        job: JobId,
        /// Paid provider.
        provider: AccountId,
        /// Amount released.
        released: Amount,
        /// Height of the call.
        height: Height,
    },
    /// The creator cancelled the job.
    JobCancelled {
        /// The job.
        job: JobId,
        /// Amount returned to the creator. Zero if the job was still open.
        refunded: Amount,
        /// Pending proposals rejected in the same call.
        rejected: Vec<ProposalId>,
        /// Height of the call.
        height: Height,
    },
    /// The job's window closed with no accepted proposal.
    JobExpired {
        /// The job.
        job: JobId,
        /// Pending proposals rejected in the same call.
        rejected: Vec<ProposalId>,
        /// Height of the call.
        height: Height,
    },
}

impl MarketEvent {
    /// The job this event concerns.
    #[must_use]
    pub const fn job(&self) -> JobId {
        match self {
            Self::JobCreated { job, .. }
            | Self::ProposalSubmitted { job, .. }
            | Self::ProposalAccepted { job, .. }
            | Self::ProposalWithdrawn { job, .. }
            | Self::CancellationApproved { job, .. }
            | Self::JobCompleted { job, .. }
            | Self::JobCancelled { job, .. }
            | Self::JobExpired { job, .. } => *job,
        }
    }

    /// Short name of the event, matching its serialized tag.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "job_created",
            Self::ProposalSubmitted { .. } => "proposal_submitted",
            Self::ProposalAccepted { .. } => "proposal_accepted",
            Self::ProposalWithdrawn { .. } => "proposal_withdrawn",
            Self::CancellationApproved { .. } => "cancellation_approved",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobCancelled { .. } => "job_cancelled",
            Self::JobExpired { .. } => "job_expired",
        }
    }

    /// Serializes the event to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Destination for marketplace events.
pub trait EventSink: Send {
    /// Records one event.
    fn emit(&self, event: &MarketEvent);
}

/// Logs each event through `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &MarketEvent) {
        let json = event.to_json().unwrap_or_else(|_| "{}".to_string());
        tracing::info!(
            target: "encode_market::events",
            event_type = event.event_type(),
            job = %event.job(),
            event_json = %json,
            "market event"
        );
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &MarketEvent) {}
}

/// Collects events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<MarketEvent>>>,
}

impl MemoryEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every event recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<MarketEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns every recorded event.
    pub fn drain(&self) -> Vec<MarketEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &MarketEvent) {
        self.events.lock().push(event.clone());
    }
}

impl<S: EventSink + Sync + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: &MarketEvent) {
        (**self).emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn withdrawn(job: u64) -> MarketEvent {
        MarketEvent::ProposalWithdrawn {
            job: JobId::new(job),
            proposal: ProposalId::new(0),
            height: 7,
        }
    }

    #[test]
    fn serialized_tag_matches_event_type() {
        let event = MarketEvent::JobCancelled {
            job: JobId::new(2),
            refunded: Amount::new(4500),
            rejected: vec![ProposalId::new(1)],
            height: 40,
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], event.event_type());
        assert_eq!(value["job"], 2);
        assert_eq!(value["refunded"], 4500);
        assert_eq!(event.job(), JobId::new(2));
    }

    #[test]
    fn json_roundtrip() {
        let event = MarketEvent::JobCreated {
            job: JobId::new(0),
            creator: AccountId::new("wallet_1").unwrap(),
            budget: Amount::new(5000),
            deadline: 110,
            height: 10,
        };
        let parsed: MarketEvent = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn memory_sink_clones_share_buffer() {
        let sink = MemoryEventSink::new();
        let handle = sink.clone();

        sink.emit(&withdrawn(0));
        sink.emit(&withdrawn(1));

        assert_eq!(handle.len(), 2);
        assert_eq!(handle.events()[1].job(), JobId::new(1));

        let drained = handle.drain();
        assert_eq!(drained.len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn noop_and_tracing_sinks_accept_events() {
        NoopEventSink.emit(&withdrawn(0));
        TracingEventSink.emit(&withdrawn(0));
    }

    #[test]
    fn arc_sink_forwards() {
        let sink = Arc::new(MemoryEventSink::new());
        let shared: Arc<MemoryEventSink> = Arc::clone(&sink);
        shared.emit(&withdrawn(3));
        assert_eq!(sink.len(), 1);
    }
}
