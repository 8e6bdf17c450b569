//! The engine: applies commands, ticks and subscription events to a session.
//!
//! [`Engine`] holds no session state of its own. Every call takes the
//! [`SessionState`] it should act on and re-reads it at apply time, so a
//! command never runs against a stale snapshot. After a command has been
//! applied locally the matching backend operation is issued; a failed call
//! is logged and the optimistic local state is kept.

use crate::clips::generate_audio_store_key;
use crate::error::{Error, Result};
use crate::looping::should_loop;
use crate::state::{ActiveTake, PlaybackCommand, SessionState};
use crate::subscription::{ClipEvent, MergeOutcome, SubscriptionMerger};
use crate::timing::{ms_to_seconds, Time, Timestamp};
use crate::transport::{NullTransport, TransportClient, TransportOp};

/// Result of one playback tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickOutcome {
    /// True time sampled at the tick, before any loop seek.
    pub true_time: Time,
    /// Whether the tick wrapped playback back to the cab start.
    pub looped: bool,
}

/// Applies playback commands and loop decisions to a session.
pub struct Engine {
    transport: Box<dyn TransportClient>,
    transport_failures: u64,
    loops_taken: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(NullTransport)
    }
}

impl Engine {
    /// Create an engine forwarding operations to `transport`.
    pub fn new(transport: impl TransportClient + 'static) -> Self {
        Self::with_boxed_transport(Box::new(transport))
    }

    /// Create an engine from an already boxed transport.
    pub fn with_boxed_transport(transport: Box<dyn TransportClient>) -> Self {
        Self {
            transport,
            transport_failures: 0,
            loops_taken: 0,
        }
    }

    /// Number of backend calls that failed.
    pub fn transport_failures(&self) -> u64 {
        self.transport_failures
    }

    /// Number of times playback wrapped to the cab start.
    pub fn loops_taken(&self) -> u64 {
        self.loops_taken
    }

    /// Apply one command at `now`.
    ///
    /// The command either applies completely or not at all. Errors describe
    /// why a command was rejected; the session stays valid either way.
    pub fn handle_command(
        &mut self,
        state: &mut SessionState,
        cmd: PlaybackCommand,
        now: Timestamp,
    ) -> Result<()> {
        log::debug!("[TRANSPORT] {} at {:.1}ms", cmd.type_name(), now);
        let op = cmd.transport_op();
        // The cab setters bump the version themselves
        let self_versioned = matches!(
            cmd,
            PlaybackCommand::SetLoop { .. } | PlaybackCommand::SetCab { .. }
        );

        match cmd {
            PlaybackCommand::Play => {
                if !state.playback.play(now) {
                    log::debug!("[TRANSPORT] Already playing");
                    return Ok(());
                }
            }
            PlaybackCommand::Pause | PlaybackCommand::Stop => {
                if state.playback.recording {
                    self.finish_take(state, now);
                }
                if !state.playback.stop(now) {
                    log::debug!("[TRANSPORT] Already stopped");
                    return Ok(());
                }
            }
            PlaybackCommand::Seek { time } => {
                state.playback.seek(time, now);
            }
            PlaybackCommand::Record => {
                if state.playback.recording {
                    // Record toggles: a second press ends the take.
                    self.finish_take(state, now);
                    state.playback.end_recording();
                } else {
                    self.start_take(state, now)?;
                }
            }
            PlaybackCommand::EndRecord => {
                if !state.playback.recording {
                    return Err(Error::StaleCommand("end_record while not recording".into()));
                }
                self.finish_take(state, now);
                state.playback.end_recording();
            }
            PlaybackCommand::SetLoop { loops } => {
                state.set_loop(loops)?;
            }
            PlaybackCommand::SetCab { start, end } => {
                state.set_cab_bounds(start, end)?;
            }
            PlaybackCommand::ConfirmTake {
                audio_store_key,
                real_clip_id,
            } => {
                if !state.client_clips.hand_off(&audio_store_key, &real_clip_id) {
                    return Err(Error::StaleCommand(format!(
                        "confirm for unknown take '{audio_store_key}'"
                    )));
                }
            }
            PlaybackCommand::DiscardTake { audio_store_key } => {
                if !state.client_clips.remove(&audio_store_key) {
                    return Err(Error::StaleCommand(format!(
                        "discard for unknown take '{audio_store_key}'"
                    )));
                }
                let was_active = state
                    .active_take
                    .as_ref()
                    .is_some_and(|take| take.audio_store_key == audio_store_key);
                if was_active {
                    state.active_take = None;
                    state.playback.end_recording();
                }
            }
        }

        if !self_versioned {
            state.bump_version();
        }
        if let Some(op) = op {
            self.forward(op);
        }
        Ok(())
    }

    /// Playback tick: sample true time and wrap at the cab end if needed.
    pub fn on_tick(&mut self, state: &mut SessionState, now: Timestamp) -> TickOutcome {
        state.last_tick = Some(now);
        let true_time = state.true_time(now);

        let looped = should_loop(true_time, &state.cab, state.playback.playing, state.is_empty());
        if looped {
            let target = state.cab.start;
            log::debug!("[LOOP] {:.3}s reached cab end, seeking to {:.3}s", true_time, target);
            state.playback.seek(target, now);
            state.bump_version();
            self.loops_taken += 1;
            self.forward(TransportOp::Seek { time: target });
        }

        TickOutcome { true_time, looped }
    }

    /// Display tick: refresh the position shown to visual consumers.
    pub fn on_display_tick(&mut self, state: &mut SessionState, now: Timestamp) -> Time {
        state.display_time = state.true_time(now);
        state.display_time
    }

    /// Merge one subscription event.
    pub fn handle_clip_event(&mut self, state: &mut SessionState, event: ClipEvent) -> MergeOutcome {
        SubscriptionMerger::apply(state, event)
    }

    fn start_take(&mut self, state: &mut SessionState, now: Timestamp) -> Result<()> {
        let key = generate_audio_store_key();
        // Checked before playback starts so a rejected take leaves no trace
        if state.client_clips.contains(&key) {
            return Err(Error::DuplicateKey(key));
        }
        state.playback.start_recording(now);
        let start = state.true_time(now);
        state.client_clips.begin(&key, start)?;
        log::info!("[CLIPS] Recording take '{}' at {:.3}s", key, start);
        state.last_take = Some(key.clone());
        state.active_take = Some(ActiveTake {
            audio_store_key: key,
            started_at: now,
        });
        Ok(())
    }

    fn finish_take(&mut self, state: &mut SessionState, now: Timestamp) {
        let Some(take) = state.active_take.take() else {
            return;
        };
        let duration = ms_to_seconds((now - take.started_at).max(0.0));
        if state.client_clips.end(&take.audio_store_key) {
            state.client_clips.set_duration(&take.audio_store_key, duration);
            log::info!(
                "[CLIPS] Finished take '{}' ({:.3}s)",
                take.audio_store_key,
                duration
            );
        }
    }

    fn forward(&mut self, op: TransportOp) {
        if let Err(e) = self.transport.call(op) {
            self.transport_failures += 1;
            log::warn!("[TRANSPORT] {} (keeping local state)", Error::from(e));
        }
    }
}
