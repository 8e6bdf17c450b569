//! Confirmed clips, speculative client clips, and the view that merges them.
//!
//! A take recorded locally lives in the [`ClientClipStore`] until the server
//! confirms it. Confirmed clips arrive over the subscription stream and land
//! in [`ConfirmedClips`]. [`clips_to_play`] yields the union of both without
//! dropping a take during the confirmation window or playing it twice after.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::timing::Time;

/// Server-assigned clip identifier.
pub type ClipId = String;

/// Duration sentinel for a take whose length is not known yet.
pub const UNKNOWN_DURATION: Time = -1.0;

/// Reference to the stored audio behind a confirmed clip.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A server-confirmed clip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: ClipId,
    pub start: Time,
    pub audio: AudioRef,
}

impl Clip {
    /// Create a clip.
    pub fn new(id: impl Into<ClipId>, start: Time, audio: AudioRef) -> Self {
        Self {
            id: id.into(),
            start,
            audio,
        }
    }
}

/// A locally recorded take that the server has not superseded yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientClip {
    /// Client-generated key, echoed back by the server as `referenceId`.
    pub audio_store_key: String,
    /// Timeline position where recording began.
    pub start: Time,
    /// Length in seconds, or [`UNKNOWN_DURATION`].
    pub duration: Time,
    /// Id of the confirmed clip, once the server has persisted the take.
    pub real_clip_id: Option<ClipId>,
    /// Whether the take is still being recorded.
    pub in_progress: bool,
}

impl ClientClip {
    /// Whether the server has confirmed this take.
    pub fn is_confirmed(&self) -> bool {
        self.real_clip_id.is_some()
    }

    /// Duration, if known.
    pub fn known_duration(&self) -> Option<Time> {
        (self.duration >= 0.0).then_some(self.duration)
    }
}

/// Generate a collision-free audio store key (128 random bits, hex encoded).
pub fn generate_audio_store_key() -> String {
    let bits: u128 = rand::rng().random();
    format!("{bits:032x}")
}

/// Keyed collection of [`ClientClip`] records.
///
/// Exactly one record exists per take between [`begin`](Self::begin) and
/// [`remove`](Self::remove).
#[derive(Clone, Debug, Default)]
pub struct ClientClipStore {
    clips: HashMap<String, ClientClip>,
}

impl ClientClipStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new in-progress take.
    ///
    /// Fails with [`Error::DuplicateKey`] if the key is already present; the
    /// existing record is left untouched.
    pub fn begin(&mut self, audio_store_key: &str, start: Time) -> Result<()> {
        if self.clips.contains_key(audio_store_key) {
            log::warn!("[CLIPS] Refusing to begin take with duplicate key '{}'", audio_store_key);
            return Err(Error::DuplicateKey(audio_store_key.to_string()));
        }
        log::debug!("[CLIPS] Begin take '{}' at {:.3}s", audio_store_key, start);
        self.clips.insert(
            audio_store_key.to_string(),
            ClientClip {
                audio_store_key: audio_store_key.to_string(),
                start,
                duration: UNKNOWN_DURATION,
                real_clip_id: None,
                in_progress: true,
            },
        );
        Ok(())
    }

    /// Mark a take as finished recording.
    ///
    /// Returns false if the key is absent (the take may have been cancelled).
    pub fn end(&mut self, audio_store_key: &str) -> bool {
        match self.clips.get_mut(audio_store_key) {
            Some(clip) => {
                clip.in_progress = false;
                log::debug!("[CLIPS] End take '{}'", audio_store_key);
                true
            }
            None => {
                log::debug!("[CLIPS] End for unknown take '{}' ignored", audio_store_key);
                false
            }
        }
    }

    /// Record the measured duration of a take.
    pub fn set_duration(&mut self, audio_store_key: &str, duration: Time) -> bool {
        match self.clips.get_mut(audio_store_key) {
            Some(clip) => {
                clip.duration = duration.max(0.0);
                true
            }
            None => false,
        }
    }

    /// Link a take to its confirmed clip.
    pub fn hand_off(&mut self, audio_store_key: &str, real_clip_id: &str) -> bool {
        match self.clips.get_mut(audio_store_key) {
            Some(clip) => {
                clip.real_clip_id = Some(real_clip_id.to_string());
                log::debug!("[CLIPS] Take '{}' handed off to clip '{}'", audio_store_key, real_clip_id);
                true
            }
            None => false,
        }
    }

    /// Delete a take. Returns whether a record was actually removed.
    pub fn remove(&mut self, audio_store_key: &str) -> bool {
        let removed = self.clips.remove(audio_store_key).is_some();
        if removed {
            log::debug!("[CLIPS] Removed take '{}'", audio_store_key);
        }
        removed
    }

    /// Look up a take.
    pub fn get(&self, audio_store_key: &str) -> Option<&ClientClip> {
        self.clips.get(audio_store_key)
    }

    /// Whether a take with this key exists.
    pub fn contains(&self, audio_store_key: &str) -> bool {
        self.clips.contains_key(audio_store_key)
    }

    /// Takes not yet confirmed by the server.
    pub fn unconfirmed(&self) -> impl Iterator<Item = &ClientClip> {
        self.clips.values().filter(|clip| !clip.is_confirmed())
    }

    /// All takes.
    pub fn iter(&self) -> impl Iterator<Item = &ClientClip> {
        self.clips.values()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

/// Outcome of merging one clip into [`ConfirmedClips`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
    /// Already present with identical content, or removed earlier.
    Ignored,
}

/// Server-confirmed clips keyed by id.
///
/// Removed ids are remembered so a late or re-delivered add cannot bring a
/// clip back. Tombstones live as long as the session: there is at most one
/// per distinct removed id, and loading another vamp starts a fresh
/// [`crate::SessionState`].
#[derive(Clone, Debug, Default)]
pub struct ConfirmedClips {
    clips: HashMap<ClipId, Clip>,
    removed: HashSet<ClipId>,
}

impl ConfirmedClips {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a clip unless its id is present or was removed.
    pub fn insert(&mut self, clip: Clip) -> Upsert {
        if self.removed.contains(&clip.id) || self.clips.contains_key(&clip.id) {
            return Upsert::Ignored;
        }
        self.clips.insert(clip.id.clone(), clip);
        Upsert::Inserted
    }

    /// Insert or replace a clip unless its id was removed.
    pub fn upsert(&mut self, clip: Clip) -> Upsert {
        if self.removed.contains(&clip.id) {
            return Upsert::Ignored;
        }
        match self.clips.get(&clip.id) {
            Some(existing) if *existing == clip => Upsert::Ignored,
            Some(_) => {
                self.clips.insert(clip.id.clone(), clip);
                Upsert::Replaced
            }
            None => {
                self.clips.insert(clip.id.clone(), clip);
                Upsert::Inserted
            }
        }
    }

    /// Remove a clip and tombstone its id. Returns whether it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        self.removed.insert(id.to_string());
        self.clips.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&Clip> {
        self.clips.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clips.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.values()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Number of remembered removed ids.
    pub fn tombstone_count(&self) -> usize {
        self.removed.len()
    }
}

/// One entry of the clips-to-play view.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum PlayableClip {
    /// A confirmed clip.
    Server(Clip),
    /// A take still waiting for confirmation.
    Client(ClientClip),
}

impl PlayableClip {
    /// Timeline start of the clip.
    pub fn start(&self) -> Time {
        match self {
            PlayableClip::Server(clip) => clip.start,
            PlayableClip::Client(clip) => clip.start,
        }
    }

    /// Stable identifier (clip id or audio store key).
    pub fn key(&self) -> &str {
        match self {
            PlayableClip::Server(clip) => &clip.id,
            PlayableClip::Client(clip) => &clip.audio_store_key,
        }
    }
}

/// Confirmed clips plus unconfirmed takes, ordered by start then key.
pub fn clips_to_play(confirmed: &ConfirmedClips, client: &ClientClipStore) -> Vec<PlayableClip> {
    let mut view: Vec<PlayableClip> = confirmed
        .iter()
        .cloned()
        .map(PlayableClip::Server)
        .chain(client.unconfirmed().cloned().map(PlayableClip::Client))
        .collect();
    view.sort_by(|a, b| {
        a.start()
            .partial_cmp(&b.start())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key().cmp(b.key()))
    });
    view
}
