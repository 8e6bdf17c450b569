//! Merging server-pushed clip mutations into session state.
//!
//! Events arrive over a channel in arbitrary order and possibly more than
//! once. [`SubscriptionMerger::apply`] is idempotent: re-applying an event
//! leaves the session unchanged.

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::clips::{Clip, Upsert};
use crate::error::Error;
use crate::state::SessionState;

/// Kind of clip mutation pushed by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClipMutation {
    Added,
    Updated,
    Removed,
    /// Any kind this version does not know about.
    #[serde(other)]
    Unknown,
}

/// One subscription push.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipEvent {
    pub mutation: ClipMutation,
    pub updated_clip: Clip,
    /// Audio store key of the take this clip was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
}

impl ClipEvent {
    /// An `ADDED` event.
    pub fn added(clip: Clip, reference_id: Option<String>) -> Self {
        Self {
            mutation: ClipMutation::Added,
            updated_clip: clip,
            reference_id,
        }
    }

    /// An `UPDATED` event.
    pub fn updated(clip: Clip) -> Self {
        Self {
            mutation: ClipMutation::Updated,
            updated_clip: clip,
            reference_id: None,
        }
    }

    /// A `REMOVED` event.
    pub fn removed(clip: Clip) -> Self {
        Self {
            mutation: ClipMutation::Removed,
            updated_clip: clip,
            reference_id: None,
        }
    }
}

/// What applying an event did to the confirmed clips.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeEffect {
    Inserted,
    Replaced,
    Removed,
    /// Nothing changed (duplicate, tombstoned, or unknown kind).
    Unchanged,
}

/// Result of applying one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOutcome {
    pub effect: MergeEffect,
    /// Audio store key of the take superseded by this event, if any.
    pub handed_off: Option<String>,
}

impl MergeOutcome {
    fn unchanged() -> Self {
        Self {
            effect: MergeEffect::Unchanged,
            handed_off: None,
        }
    }
}

/// Consumes clip events one at a time and merges them into a session.
pub struct SubscriptionMerger {
    rx: Receiver<ClipEvent>,
    applied: u64,
}

impl SubscriptionMerger {
    /// Create a merger reading from `rx`.
    pub fn new(rx: Receiver<ClipEvent>) -> Self {
        Self { rx, applied: 0 }
    }

    /// Create a merger together with the sender feeding it.
    pub fn channel() -> (Sender<ClipEvent>, Self) {
        let (tx, rx) = unbounded();
        (tx, Self::new(rx))
    }

    /// Apply every event currently queued. Returns how many were applied.
    pub fn drain(&mut self, state: &mut SessionState) -> usize {
        let mut count = 0;
        while let Ok(event) = self.rx.try_recv() {
            Self::apply(state, event);
            count += 1;
        }
        self.applied += count as u64;
        count
    }

    /// Total number of events applied by this merger.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Apply a single event to `state`.
    pub fn apply(state: &mut SessionState, event: ClipEvent) -> MergeOutcome {
        let outcome = match event.mutation {
            ClipMutation::Added => Self::apply_added(state, event),
            ClipMutation::Updated => {
                let id = event.updated_clip.id.clone();
                let effect = upsert_effect(state.clips.upsert(event.updated_clip));
                log::debug!("[SUBSCRIPTION] UPDATED '{}': {:?}", id, effect);
                MergeOutcome {
                    effect,
                    handed_off: None,
                }
            }
            ClipMutation::Removed => {
                let id = &event.updated_clip.id;
                let effect = if state.clips.remove(id) {
                    MergeEffect::Removed
                } else {
                    MergeEffect::Unchanged
                };
                log::debug!("[SUBSCRIPTION] REMOVED '{}': {:?}", id, effect);
                MergeOutcome {
                    effect,
                    handed_off: None,
                }
            }
            ClipMutation::Unknown => {
                log::debug!(
                    "[SUBSCRIPTION] Ignoring unknown mutation for clip '{}'",
                    event.updated_clip.id
                );
                MergeOutcome::unchanged()
            }
        };
        if outcome != MergeOutcome::unchanged() {
            state.bump_version();
        }
        outcome
    }

    fn apply_added(state: &mut SessionState, event: ClipEvent) -> MergeOutcome {
        let id = event.updated_clip.id.clone();
        let effect = upsert_effect(state.clips.insert(event.updated_clip));

        // Hand-off and removal happen together so no reader ever sees the
        // take as neither pending nor confirmed.
        let handed_off = match event.reference_id {
            Some(key) if state.client_clips.contains(&key) => {
                state.client_clips.hand_off(&key, &id);
                state.client_clips.remove(&key);
                log::info!("[SUBSCRIPTION] Take '{}' superseded by clip '{}'", key, id);
                // A take confirmed mid-recording is no longer ours to finish
                let was_active = state
                    .active_take
                    .as_ref()
                    .is_some_and(|take| take.audio_store_key == key);
                if was_active {
                    state.active_take = None;
                    state.playback.end_recording();
                    log::warn!("[SUBSCRIPTION] Take '{}' confirmed while recording, recording ended", key);
                }
                Some(key)
            }
            Some(key) => {
                log::debug!("[SUBSCRIPTION] {} (clip '{}')", Error::UnknownReference(key), id);
                None
            }
            None => None,
        };

        log::debug!("[SUBSCRIPTION] ADDED '{}': {:?}", id, effect);
        MergeOutcome { effect, handed_off }
    }
}

fn upsert_effect(upsert: Upsert) -> MergeEffect {
    match upsert {
        Upsert::Inserted => MergeEffect::Inserted,
        Upsert::Replaced => MergeEffect::Replaced,
        Upsert::Ignored => MergeEffect::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clips::AudioRef;

    fn clip(id: &str, start: f64) -> Clip {
        Clip::new(
            id,
            start,
            AudioRef {
                id: format!("audio-{id}"),
                ..Default::default()
            },
        )
    }

    fn clip_ids(state: &SessionState) -> Vec<String> {
        let mut ids: Vec<String> = state.clips.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_added_twice_is_idempotent() {
        let mut state = SessionState::default();
        let event = ClipEvent::added(clip("c1", 0.0), None);

        let first = SubscriptionMerger::apply(&mut state, event.clone());
        assert_eq!(first.effect, MergeEffect::Inserted);
        let ids_once = clip_ids(&state);
        let version_once = state.version;

        let second = SubscriptionMerger::apply(&mut state, event);
        assert_eq!(second.effect, MergeEffect::Unchanged);
        assert_eq!(clip_ids(&state), ids_once);
        assert_eq!(state.version, version_once);
    }

    #[test]
    fn test_added_with_reference_supersedes_take() {
        let mut state = SessionState::default();
        state.client_clips.begin("abc", 2.0).unwrap();
        assert_eq!(state.client_clips.get("abc").unwrap().real_clip_id, None);

        let outcome =
            SubscriptionMerger::apply(&mut state, ClipEvent::added(clip("clip99", 2.0), Some("abc".into())));
        assert_eq!(outcome.handed_off.as_deref(), Some("abc"));
        assert!(state.client_clips.get("abc").is_none());
        assert!(state.clips.contains("clip99"));
        assert_eq!(state.clips_to_play().len(), 1);
    }

    #[test]
    fn test_added_for_active_take_ends_recording() {
        let mut engine = crate::engine::Engine::default();
        let mut state = SessionState::default();
        engine
            .handle_command(&mut state, crate::state::PlaybackCommand::Record, 0.0)
            .unwrap();
        let key = state.active_take.as_ref().unwrap().audio_store_key.clone();

        let outcome =
            SubscriptionMerger::apply(&mut state, ClipEvent::added(clip("c1", 0.0), Some(key.clone())));
        assert_eq!(outcome.handed_off.as_deref(), Some(key.as_str()));
        assert!(state.active_take.is_none());
        assert!(!state.playback.recording);
        assert!(state.playback.playing);
        assert!(state.playback.is_consistent());
        assert!(!state.client_clips.contains(&key));
        assert!(state.clips.contains("c1"));

        // A later end has nothing left to finish
        assert!(engine
            .handle_command(&mut state, crate::state::PlaybackCommand::EndRecord, 500.0)
            .is_err());
        assert!(state.client_clips.is_empty());
    }

    #[test]
    fn test_unknown_reference_is_plain_insert() {
        let mut state = SessionState::default();
        let outcome =
            SubscriptionMerger::apply(&mut state, ClipEvent::added(clip("c7", 1.0), Some("nobody".into())));
        assert_eq!(outcome.effect, MergeEffect::Inserted);
        assert_eq!(outcome.handed_off, None);
        assert!(state.clips.contains("c7"));
    }

    #[test]
    fn test_removed_before_added_does_not_resurrect() {
        let mut state = SessionState::default();
        SubscriptionMerger::apply(&mut state, ClipEvent::removed(clip("c1", 0.0)));
        let outcome = SubscriptionMerger::apply(&mut state, ClipEvent::added(clip("c1", 0.0), None));
        assert_eq!(outcome.effect, MergeEffect::Unchanged);
        assert!(state.clips.is_empty());
    }

    #[test]
    fn test_updated_replaces_clip() {
        let mut state = SessionState::default();
        SubscriptionMerger::apply(&mut state, ClipEvent::added(clip("c1", 0.0), None));
        let outcome = SubscriptionMerger::apply(&mut state, ClipEvent::updated(clip("c1", 1.5)));
        assert_eq!(outcome.effect, MergeEffect::Replaced);
        assert_eq!(state.clips.get("c1").unwrap().start, 1.5);
    }

    #[test]
    fn test_drain_applies_in_order() {
        let (tx, mut merger) = SubscriptionMerger::channel();
        let mut state = SessionState::default();
        tx.send(ClipEvent::added(clip("a", 0.0), None)).unwrap();
        tx.send(ClipEvent::added(clip("b", 1.0), None)).unwrap();
        tx.send(ClipEvent::added(clip("a", 0.0), None)).unwrap();
        tx.send(ClipEvent::removed(clip("b", 1.0))).unwrap();

        assert_eq!(merger.drain(&mut state), 4);
        assert_eq!(merger.applied(), 4);
        assert_eq!(clip_ids(&state), vec!["a".to_string()]);
        assert_eq!(merger.drain(&mut state), 0);
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{
            "mutation": "ADDED",
            "updatedClip": { "id": "clip99", "start": 2.0, "audio": { "id": "a1", "filename": "take.webm" } },
            "referenceId": "abc"
        }"#;
        let event: ClipEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.mutation, ClipMutation::Added);
        assert_eq!(event.updated_clip.audio.filename.as_deref(), Some("take.webm"));
        assert_eq!(event.reference_id.as_deref(), Some("abc"));

        let odd = r#"{ "mutation": "MERGED", "updatedClip": { "id": "x", "start": 0.0, "audio": { "id": "a" } } }"#;
        let event: ClipEvent = serde_json::from_str(odd).unwrap();
        assert_eq!(event.mutation, ClipMutation::Unknown);

        let mut state = SessionState::default();
        let outcome = SubscriptionMerger::apply(&mut state, event);
        assert_eq!(outcome.effect, MergeEffect::Unchanged);
        assert!(state.clips.is_empty());
    }
}
