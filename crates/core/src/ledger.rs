//! The per-job stage ledger and the policies that advance it.
//!
//! A ledger holds the full, fixed script of stage events for one job; only
//! the prefix `0..=current_index` is visible. `current_index` starts at -1
//! and moves forward one step at a time through [`StageLedger::advance`],
//! which is reachable only through an [`AdvancePolicy`].

use std::time::{Duration, Instant};

use crate::artifact::Artifact;
use crate::stage::{Stage, StageEvent};

/// Ordered, append-only record of the stage events for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct StageLedger {
    events: Vec<StageEvent>,
    current_index: i64,
    last_advanced_at: Instant,
    pending_signals: u32,
}

impl StageLedger {
    /// The standard four-stage script, with `artifact` on `Complete`.
    pub fn standard(artifact: Artifact, now: Instant) -> Self {
        let events = Stage::ALL
            .into_iter()
            .map(|stage| {
                let event = StageEvent::for_stage(stage);
                if stage.is_terminal() {
                    event.with_artifact(artifact.clone())
                } else {
                    event
                }
            })
            .collect();
        StageLedger {
            events,
            current_index: -1,
            last_advanced_at: now,
            pending_signals: 0,
        }
    }

    /// Index of the newest visible event; -1 before the first stage.
    pub fn current_index(&self) -> i64 {
        self.current_index
    }

    pub fn final_index(&self) -> i64 {
        self.events.len() as i64 - 1
    }

    pub fn last_advanced_at(&self) -> Instant {
        self.last_advanced_at
    }

    pub fn is_complete(&self) -> bool {
        self.current_index >= self.final_index()
    }

    /// Events `0..=current_index`, empty before the first stage.
    pub fn visible(&self) -> &[StageEvent] {
        let end = (self.current_index + 1).max(0) as usize;
        &self.events[..end]
    }

    /// The event at `current_index`, clamped to the first event.
    pub fn clamped_latest(&self) -> &StageEvent {
        let index = self.current_index.clamp(0, self.final_index()) as usize;
        &self.events[index]
    }

    /// The terminal artifact, once the ledger has reached it.
    pub fn artifact(&self) -> Option<&Artifact> {
        self.visible().last().and_then(|e| e.artifact.as_ref())
    }

    /// Move forward exactly one stage. No-op once complete.
    pub fn advance(&mut self, now: Instant) -> bool {
        if self.is_complete() {
            return false;
        }
        self.current_index += 1;
        self.last_advanced_at = now;
        tracing::debug!(
            current_index = self.current_index,
            stage = %self.events[self.current_index as usize].stage,
            "ledger advanced"
        );
        true
    }

    /// Record that the external pipeline finished one more stage.
    pub fn record_signal(&mut self) {
        self.pending_signals = self.pending_signals.saturating_add(1);
    }

    pub fn pending_signals(&self) -> u32 {
        self.pending_signals
    }

    fn take_signal(&mut self) -> bool {
        if self.pending_signals == 0 {
            return false;
        }
        self.pending_signals -= 1;
        true
    }
}

/// Decides when a ledger moves to its next stage.
///
/// Called once per poll, under the same lock as the read that follows it.
pub trait AdvancePolicy: Send + Sync {
    /// Advance `ledger` by at most one stage. Returns whether it moved.
    fn advance_if_ready(&self, ledger: &mut StageLedger, now: Instant) -> bool;

    fn name(&self) -> &'static str;
}

/// Advance once more than `threshold` has elapsed since the last advance.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    threshold: Duration,
}

impl ThresholdPolicy {
    pub fn new(threshold: Duration) -> Self {
        ThresholdPolicy { threshold }
    }
}

impl AdvancePolicy for ThresholdPolicy {
    fn advance_if_ready(&self, ledger: &mut StageLedger, now: Instant) -> bool {
        if ledger.is_complete() {
            return false;
        }
        let elapsed = now.saturating_duration_since(ledger.last_advanced_at());
        if elapsed > self.threshold {
            ledger.advance(now)
        } else {
            false
        }
    }

    fn name(&self) -> &'static str {
        "threshold"
    }
}

/// Advance one stage per poll while completion signals are pending.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalPolicy;

impl AdvancePolicy for SignalPolicy {
    fn advance_if_ready(&self, ledger: &mut StageLedger, now: Instant) -> bool {
        if ledger.is_complete() {
            return false;
        }
        if ledger.take_signal() {
            ledger.advance(now)
        } else {
            false
        }
    }

    fn name(&self) -> &'static str {
        "signal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(3);

    fn artifact() -> Artifact {
        Artifact::from_data_uri("data:application/zip;base64,UEsDBA==")
    }

    #[test]
    fn starts_before_first_stage() {
        let ledger = StageLedger::standard(artifact(), Instant::now());
        assert_eq!(ledger.current_index(), -1);
        assert!(ledger.visible().is_empty());
        assert_eq!(ledger.clamped_latest().index, 0);
        assert!(ledger.artifact().is_none());
    }

    #[test]
    fn threshold_must_be_exceeded() {
        let start = Instant::now();
        let mut ledger = StageLedger::standard(artifact(), start);
        let policy = ThresholdPolicy::new(T);

        assert!(!policy.advance_if_ready(&mut ledger, start + T));
        assert_eq!(ledger.current_index(), -1);

        assert!(policy.advance_if_ready(&mut ledger, start + T + Duration::from_millis(1)));
        assert_eq!(ledger.current_index(), 0);
    }

    #[test]
    fn advances_at_most_one_step_per_poll() {
        let start = Instant::now();
        let mut ledger = StageLedger::standard(artifact(), start);
        let policy = ThresholdPolicy::new(T);

        // A long silence still moves the ledger by a single stage.
        assert!(policy.advance_if_ready(&mut ledger, start + T * 10));
        assert_eq!(ledger.current_index(), 0);
        assert!(!policy.advance_if_ready(&mut ledger, start + T * 10));
        assert_eq!(ledger.current_index(), 0);
    }

    #[test]
    fn stops_at_terminal_stage() {
        let start = Instant::now();
        let mut ledger = StageLedger::standard(artifact(), start);
        let policy = ThresholdPolicy::new(T);

        let mut now = start;
        let mut observed = Vec::new();
        for _ in 0..8 {
            now += T + Duration::from_millis(1);
            policy.advance_if_ready(&mut ledger, now);
            observed.push(ledger.current_index());
        }
        assert_eq!(observed, vec![0, 1, 2, 3, 3, 3, 3, 3]);
        assert!(ledger.is_complete());
        assert_eq!(ledger.artifact(), Some(&artifact()));
        assert_eq!(ledger.visible().len(), 4);
    }

    #[test]
    fn signal_policy_consumes_one_signal_per_poll() {
        let now = Instant::now();
        let mut ledger = StageLedger::standard(artifact(), now);
        let policy = SignalPolicy;

        assert!(!policy.advance_if_ready(&mut ledger, now));
        ledger.record_signal();
        ledger.record_signal();

        assert!(policy.advance_if_ready(&mut ledger, now));
        assert_eq!(ledger.current_index(), 0);
        assert_eq!(ledger.pending_signals(), 1);
        assert!(policy.advance_if_ready(&mut ledger, now));
        assert!(!policy.advance_if_ready(&mut ledger, now));
        assert_eq!(ledger.current_index(), 1);
    }

    #[test]
    fn signal_policy_keeps_signals_once_complete() {
        let now = Instant::now();
        let mut ledger = StageLedger::standard(artifact(), now);
        for _ in 0..6 {
            ledger.record_signal();
        }
        for _ in 0..6 {
            SignalPolicy.advance_if_ready(&mut ledger, now);
        }
        assert!(ledger.is_complete());
        assert_eq!(ledger.pending_signals(), 2);
    }

    #[test]
    fn visible_events_never_change_once_emitted() {
        let start = Instant::now();
        let mut ledger = StageLedger::standard(artifact(), start);
        let policy = ThresholdPolicy::new(T);

        let mut now = start;
        let mut seen: Vec<StageEvent> = Vec::new();
        for _ in 0..5 {
            now += T + Duration::from_millis(1);
            policy.advance_if_ready(&mut ledger, now);
            let visible = ledger.visible();
            assert_eq!(&visible[..seen.len()], &seen[..]);
            seen = visible.to_vec();
        }
    }
}
