//! Client-side reconciliation of polled snapshots.
//!
//! [`reconcile`] folds one [`Snapshot`] into a [`Timeline`] and returns the
//! new timeline. It is a pure function: the merged log, the loading flag and
//! the artifact depend only on the previous timeline and the snapshot.
//!
//! Messages are identified by `(origin, index, message)`. An entry already in
//! the log is never replaced, so replaying a snapshot, or receiving an older
//! one late, leaves the log as it was.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::snapshot::{Snapshot, StatusBlock};
use crate::stage::StageEvent;

/// Where a timeline message came from. Narratives sort before statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    User,
    Status,
}

/// Synthetic ordering timestamp.
///
/// `group` counts the narrative blocks at or before the entry in its
/// snapshot, so a narrative and the status batch that follows it share a
/// group. Within a group narratives come first, then statuses by index.
/// Derived from snapshot structure only, never from arrival time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderStamp {
    pub group: u32,
    pub origin: Origin,
    pub index: i64,
}

/// Identity of an observable event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub origin: Origin,
    pub index: i64,
    pub message: String,
}

/// One entry of the client's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub message: String,
    /// Stage index for statuses; narrative ordinal for user entries.
    pub index: i64,
    pub order: OrderStamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

impl ChatMessage {
    fn narrative(text: &str, ordinal: i64, group: u32) -> Self {
        ChatMessage {
            origin: Origin::User,
            stage: None,
            message: text.to_string(),
            index: ordinal,
            order: OrderStamp {
                group,
                origin: Origin::User,
                index: ordinal,
            },
            artifact: None,
        }
    }

    fn status(event: &StageEvent, group: u32) -> Self {
        ChatMessage {
            origin: Origin::Status,
            stage: Some(event.stage.clone()),
            message: event.message.clone(),
            index: event.index,
            order: OrderStamp {
                group,
                origin: Origin::Status,
                index: event.index,
            },
            artifact: event.artifact.clone(),
        }
    }

    pub fn key(&self) -> MessageKey {
        MessageKey {
            origin: self.origin,
            index: self.index,
            message: self.message.clone(),
        }
    }
}

/// Everything the client knows about one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    messages: Vec<ChatMessage>,
    is_loading: bool,
    latest_artifact: Option<Artifact>,
    known_index: Option<i64>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deduplicated log in display order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// True while the job is running and the last poll brought nothing new.
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn latest_artifact(&self) -> Option<&Artifact> {
        self.latest_artifact.as_ref()
    }

    /// Highest stage index seen so far.
    pub fn known_index(&self) -> Option<i64> {
        self.known_index
    }

    /// Once an artifact has been seen, polling is over.
    pub fn is_complete(&self) -> bool {
        self.latest_artifact.is_some()
    }

    pub fn status_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.origin == Origin::Status)
            .count()
    }

    pub fn merge(&self, snapshot: &Snapshot) -> Timeline {
        reconcile(self, snapshot)
    }
}

/// Flatten a snapshot into candidate messages, in snapshot order.
pub fn flatten(snapshot: &Snapshot) -> Vec<ChatMessage> {
    match snapshot {
        Snapshot::Latest(event) => vec![ChatMessage::status(event, 0)],
        Snapshot::Prefix { data } => {
            let mut out = Vec::new();
            let mut group = 0u32;
            for block in data {
                match block {
                    StatusBlock::Narrative(text) => {
                        let ordinal = i64::from(group);
                        group += 1;
                        out.push(ChatMessage::narrative(text, ordinal, group));
                    }
                    StatusBlock::Batch(events) => {
                        out.extend(events.iter().map(|e| ChatMessage::status(e, group)));
                    }
                }
            }
            out
        }
    }
}

/// Merge `snapshot` into `prev`, returning the new timeline.
pub fn reconcile(prev: &Timeline, snapshot: &Snapshot) -> Timeline {
    let mut seen: HashSet<MessageKey> = prev.messages.iter().map(ChatMessage::key).collect();
    let mut messages = prev.messages.clone();
    let mut new_status = false;

    for candidate in flatten(snapshot) {
        if seen.insert(candidate.key()) {
            new_status |= candidate.origin == Origin::Status;
            messages.push(candidate);
        }
    }

    // Stable: entries with equal stamps keep their arrival order.
    messages.sort_by_key(|m| m.order);

    let latest_artifact = messages
        .iter()
        .rev()
        .find_map(|m| m.artifact.clone())
        .or_else(|| prev.latest_artifact.clone());

    let known_index = match (prev.known_index, snapshot.reported_index()) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    let is_loading = latest_artifact.is_none() && !new_status;

    if new_status {
        tracing::debug!(
            known_index = ?known_index,
            messages = messages.len(),
            "timeline advanced"
        );
    }

    Timeline {
        messages,
        is_loading,
        latest_artifact,
        known_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;

    fn event(index: i64) -> StageEvent {
        let stage = Stage::from_index(index).unwrap();
        let event = StageEvent::for_stage(stage);
        if stage.is_terminal() {
            event.with_artifact(Artifact::from_data_uri("data:application/zip;base64,UEsDBA=="))
        } else {
            event
        }
    }

    fn prefix(upto: i64) -> Snapshot {
        Snapshot::Prefix {
            data: vec![
                StatusBlock::Narrative("Initial PDF Submission".to_string()),
                StatusBlock::Batch((0..=upto).map(event).collect()),
            ],
        }
    }

    #[test]
    fn narrative_precedes_its_batch() {
        let timeline = Timeline::new().merge(&prefix(1));
        let origins: Vec<Origin> = timeline.messages().iter().map(|m| m.origin).collect();
        assert_eq!(origins, vec![Origin::User, Origin::Status, Origin::Status]);
        assert_eq!(timeline.messages()[0].message, "Initial PDF Submission");
        assert_eq!(timeline.known_index(), Some(1));
    }

    #[test]
    fn new_event_clears_loading_and_repeat_sets_it() {
        let first = Timeline::new().merge(&prefix(0));
        assert!(!first.is_loading());

        let second = first.merge(&prefix(0));
        assert!(second.is_loading());
        assert_eq!(second.messages(), first.messages());

        let third = second.merge(&prefix(1));
        assert!(!third.is_loading());
    }

    #[test]
    fn empty_snapshot_means_thinking() {
        let timeline = Timeline::new().merge(&Snapshot::Prefix { data: Vec::new() });
        assert!(timeline.is_loading());
        assert!(timeline.messages().is_empty());
        assert_eq!(timeline.known_index(), None);
    }

    #[test]
    fn artifact_is_sticky_and_stops_loading() {
        let done = Timeline::new().merge(&prefix(3));
        assert!(done.is_complete());
        assert!(!done.is_loading());

        // A stale snapshot arriving after completion changes nothing.
        let late = done.merge(&prefix(1));
        assert_eq!(late, done);
    }

    #[test]
    fn latest_only_snapshots_accumulate() {
        let mut timeline = Timeline::new();
        for index in [0, 0, 1, 2, 2, 3] {
            timeline = timeline.merge(&Snapshot::Latest(event(index)));
        }
        let indices: Vec<i64> = timeline.messages().iter().map(|m| m.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(timeline.is_complete());
    }

    #[test]
    fn identical_narrative_text_in_distinct_blocks_is_kept_twice() {
        let snapshot = Snapshot::Prefix {
            data: vec![
                StatusBlock::Narrative("Retry".to_string()),
                StatusBlock::Batch(vec![event(0)]),
                StatusBlock::Narrative("Retry".to_string()),
                StatusBlock::Batch(vec![event(0), event(1)]),
            ],
        };
        let timeline = Timeline::new().merge(&snapshot);
        let narratives: Vec<&ChatMessage> = timeline
            .messages()
            .iter()
            .filter(|m| m.origin == Origin::User)
            .collect();
        assert_eq!(narratives.len(), 2);
        // Event 0 repeated across batches is one entry.
        assert_eq!(timeline.status_count(), 2);
    }
}
