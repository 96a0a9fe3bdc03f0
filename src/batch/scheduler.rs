use std::mem;
use std::time::Duration;

use tokio::time::Instant;

use super::pending::PendingBatch;
use crate::forecast::MutationRequest;

/// Where the scheduler is in its accumulate/flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Accumulating,
    Flushing,
}

/// What the driver should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerAction {
    /// Nothing is due. Sleep until the deadline, if there is one, or until the
    /// next event.
    Wait(Option<Instant>),
    /// Persist this batch. The scheduler is now `Flushing`.
    Flush(PendingBatch),
}

/// Debounced, single-flight batch scheduler.
///
/// This is a plain state machine; it owns no timer and performs no I/O. A
/// driver feeds it events (`enqueue`, `force_flush`, `flush_settled`, `reset`)
/// and asks [`next_action`](Self::next_action) what to do, passing the current
/// time so that an elapsed quiescence window reads as the timer having fired.
///
/// At most one batch is ever handed out between `Flush` and `flush_settled`.
/// Edits enqueued while a batch is flushing form the next batch.
#[derive(Debug)]
pub struct BatchScheduler {
    quiescence: Duration,
    phase: SchedulerPhase,
    pending: Vec<MutationRequest>,
    deadline: Option<Instant>,
    force_requested: bool,
    next_seq: u64,
    in_flight: Option<u64>,
}

impl BatchScheduler {
    pub fn new(quiescence: Duration) -> Self {
        BatchScheduler {
            quiescence,
            phase: SchedulerPhase::Idle,
            pending: Vec::new(),
            deadline: None,
            force_requested: false,
            next_seq: 1,
            in_flight: None,
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn pending(&self) -> &[MutationRequest] {
        &self.pending
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Sequence number of the batch currently being persisted.
    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    /// Add mutations to the pending batch and restart the quiescence window.
    /// Returns the sequence number the batch will carry when sealed.
    pub fn enqueue(&mut self, mutations: &[MutationRequest], now: Instant) -> u64 {
        self.pending.extend_from_slice(mutations);
        if !self.force_requested {
            self.deadline = Some(now + self.quiescence);
        }
        if self.phase == SchedulerPhase::Idle {
            self.phase = SchedulerPhase::Accumulating;
        }
        self.next_seq
    }

    /// Cancel the pending timer and flush as soon as no batch is in flight.
    ///
    /// Returns the sequence number whose settlement covers every edit
    /// enqueued so far, or `None` if there is nothing pending or in flight.
    pub fn force_flush(&mut self) -> Option<u64> {
        if self.pending.is_empty() {
            return self.in_flight;
        }
        self.force_requested = true;
        self.deadline = None;
        Some(self.next_seq)
    }

    pub fn next_action(&mut self, now: Instant) -> SchedulerAction {
        if self.phase == SchedulerPhase::Flushing {
            return SchedulerAction::Wait(None);
        }
        if self.pending.is_empty() {
            self.phase = SchedulerPhase::Idle;
            self.deadline = None;
            self.force_requested = false;
            return SchedulerAction::Wait(None);
        }

        let due = self.force_requested || self.deadline.is_some_and(|d| d <= now);
        if !due {
            return SchedulerAction::Wait(self.deadline);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.deadline = None;
        self.force_requested = false;
        self.phase = SchedulerPhase::Flushing;
        self.in_flight = Some(seq);
        SchedulerAction::Flush(PendingBatch {
            seq,
            mutations: mem::take(&mut self.pending),
        })
    }

    /// The in-flight batch settled. A failure also drops whatever accumulated
    /// behind it, since those edits were rolled back with it.
    pub fn flush_settled(&mut self, succeeded: bool) {
        self.in_flight = None;
        if !succeeded {
            self.pending.clear();
            self.deadline = None;
            self.force_requested = false;
        }
        self.phase = if self.pending.is_empty() {
            SchedulerPhase::Idle
        } else {
            SchedulerPhase::Accumulating
        };
    }

    /// Drop the pending batch and timer. A batch already in flight cannot be
    /// recalled; it still has to be settled.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.deadline = None;
        self.force_requested = false;
        self.phase = if self.in_flight.is_some() {
            SchedulerPhase::Flushing
        } else {
            SchedulerPhase::Idle
        };
    }
}
