//! Drives a [`Script`] through the engine.
//!
//! Virtual replays own an [`Engine`] and step a simulated clock through the
//! script one playback tick at a time, so their output is deterministic.
//! Realtime replays start a [`Runtime`] on the system clock and feed it the
//! steps at their wall-clock offsets.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vamp_core::{
    Cab, ClipEvent, ClockSource, Engine, Error, PlayableClip, PlaybackCommand, PlaybackMode,
    PlaybackState, RecordingTransport, Runtime, RuntimeConfig, SessionIdentity, SessionState,
    SystemClock, Time, Timestamp, TransportOp,
};

use crate::script::{Script, StepAction, LAST_TAKE};

/// How long a realtime replay waits for queued commands before each step.
const APPLY_TIMEOUT: Duration = Duration::from_millis(250);

/// How the replay was driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    Virtual,
    Realtime,
}

/// Final state of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub mode: ReplayMode,
    pub identity: SessionIdentity,
    pub elapsed_ms: u64,
    pub transport: PlaybackMode,
    pub playback: PlaybackState,
    pub true_time: Time,
    pub display_time: Time,
    pub cab: Cab,
    pub clips: Vec<PlayableClip>,
    pub transport_calls: Vec<TransportOp>,
    /// Only known when the replay owns the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loops_taken: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_commands: Option<usize>,
    pub version: u64,
}

impl ReplayReport {
    fn new(
        mode: ReplayMode,
        state: &SessionState,
        elapsed_ms: u64,
        now: Timestamp,
        transport: &RecordingTransport,
    ) -> Self {
        Self {
            mode,
            identity: state.identity.clone(),
            elapsed_ms,
            transport: state.playback.mode(),
            playback: state.playback.clone(),
            true_time: state.true_time(now),
            display_time: state.display_time,
            cab: state.cab,
            clips: state.clips_to_play(),
            transport_calls: transport.calls(),
            loops_taken: None,
            rejected_commands: None,
            version: state.version,
        }
    }
}

impl fmt::Display for ReplayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            ReplayMode::Virtual => "virtual",
            ReplayMode::Realtime => "realtime",
        };
        writeln!(f, "Replay finished ({}, {} ms)", mode, self.elapsed_ms)?;
        writeln!(f, "  Transport: {:?} at {:.3}s", self.transport, self.true_time)?;
        let end = self
            .cab
            .end
            .map_or_else(|| "open".to_string(), |end| format!("{end:.3}s"));
        writeln!(
            f,
            "  Cab:       {:.3}s .. {} (looping: {})",
            self.cab.start, end, self.cab.loops
        )?;
        if let Some(loops) = self.loops_taken {
            writeln!(f, "  Loops:     {}", loops)?;
        }
        if let Some(rejected) = self.rejected_commands {
            writeln!(f, "  Rejected:  {}", rejected)?;
        }

        writeln!(f, "  Clips to play ({}):", self.clips.len())?;
        for clip in &self.clips {
            match clip {
                PlayableClip::Server(clip) => {
                    writeln!(f, "    {:>8.3}s  clip {} (audio {})", clip.start, clip.id, clip.audio.id)?
                }
                PlayableClip::Client(take) => {
                    let status = if take.in_progress { "recording" } else { "pending" };
                    match take.known_duration() {
                        Some(d) => writeln!(
                            f,
                            "    {:>8.3}s  take {} ({}, {:.3}s)",
                            take.start, take.audio_store_key, status, d
                        )?,
                        None => writeln!(
                            f,
                            "    {:>8.3}s  take {} ({})",
                            take.start, take.audio_store_key, status
                        )?,
                    }
                }
            }
        }

        let calls: Vec<String> = self.transport_calls.iter().map(|op| op.to_string()).collect();
        write!(f, "  Transport calls: {}", calls.join(", "))
    }
}

/// Substitutes [`LAST_TAKE`] with the key of the latest take seen.
#[derive(Debug, Default)]
struct TakeResolver {
    last: Option<String>,
}

impl TakeResolver {
    fn observe(&mut self, state: &SessionState) {
        if let Some(key) = &state.last_take {
            self.last = Some(key.clone());
        }
    }

    fn resolve(&self, key: String) -> String {
        if key != LAST_TAKE {
            return key;
        }
        match &self.last {
            Some(last) => last.clone(),
            None => {
                log::warn!("[REPLAY] {} used before any take was recorded", LAST_TAKE);
                key
            }
        }
    }

    fn command(&self, cmd: PlaybackCommand) -> PlaybackCommand {
        match cmd {
            PlaybackCommand::ConfirmTake {
                audio_store_key,
                real_clip_id,
            } => PlaybackCommand::ConfirmTake {
                audio_store_key: self.resolve(audio_store_key),
                real_clip_id,
            },
            PlaybackCommand::DiscardTake { audio_store_key } => PlaybackCommand::DiscardTake {
                audio_store_key: self.resolve(audio_store_key),
            },
            other => other,
        }
    }

    fn event(&self, mut event: ClipEvent) -> ClipEvent {
        event.reference_id = event.reference_id.map(|key| self.resolve(key));
        event
    }
}

fn initial_state(script: &Script, identity: SessionIdentity) -> Result<SessionState> {
    let mut state = SessionState::new(identity);
    if let Some(cab) = &script.cab {
        state.set_cab_bounds(cab.start, cab.end)?;
        state.set_loop(cab.loops)?;
    }
    Ok(state)
}

/// Replay `script` on a simulated clock.
pub fn replay_virtual(
    script: &Script,
    identity: SessionIdentity,
    config: &RuntimeConfig,
) -> Result<ReplayReport> {
    config.validate()?;
    let transport = RecordingTransport::new();
    let mut engine = Engine::new(transport.clone());
    let mut state = initial_state(script, identity)?;
    let mut takes = TakeResolver::default();
    let mut rejected = 0;

    let end = script.end_ms();
    let mut pending = script.steps.iter().peekable();
    let mut last_display: Option<u64> = None;
    let mut t = 0;

    loop {
        while let Some(step) = pending.next_if(|step| step.at_ms <= t) {
            let now = step.at_ms as Timestamp;
            match step.action() {
                Some(StepAction::Command(cmd)) => {
                    let cmd = takes.command(cmd);
                    if let Err(e) = engine.handle_command(&mut state, cmd, now) {
                        log_rejected(&e);
                        rejected += 1;
                    }
                    takes.observe(&state);
                }
                Some(StepAction::Event(event)) => {
                    engine.handle_clip_event(&mut state, takes.event(event));
                }
                None => {}
            }
        }

        engine.on_tick(&mut state, t as Timestamp);
        if last_display.map_or(true, |last| t - last >= config.display_tick_ms) {
            engine.on_display_tick(&mut state, t as Timestamp);
            last_display = Some(t);
        }

        if t >= end {
            break;
        }
        t = (t + config.playback_tick_ms).min(end);
    }

    let mut report = ReplayReport::new(ReplayMode::Virtual, &state, end, end as Timestamp, &transport);
    report.loops_taken = Some(engine.loops_taken());
    report.rejected_commands = Some(rejected);
    Ok(report)
}

/// Replay `script` against a runtime thread in wall-clock time.
///
/// Ctrl-C stops feeding steps and reports the state reached so far.
pub fn replay_realtime(
    script: &Script,
    identity: SessionIdentity,
    config: RuntimeConfig,
) -> Result<ReplayReport> {
    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, interrupted.clone())
        .context("Failed to install Ctrl-C handler")?;

    let clock = Arc::new(SystemClock::new());
    let transport = RecordingTransport::new();
    let runtime = Runtime::start_with_state(
        config,
        initial_state(script, identity)?,
        transport.clone(),
        clock.clone(),
    )
    .context("Failed to start runtime")?;
    let handle = runtime.handle().clone();
    let origin = clock.now();
    let mut takes = TakeResolver::default();

    for step in &script.steps {
        if !wait_until(clock.as_ref(), origin + step.at_ms as Timestamp, &interrupted) {
            break;
        }
        // Earlier steps may still be queued; resolve against their result
        if !handle.wait_until_applied(APPLY_TIMEOUT) {
            log::warn!("[REPLAY] Runtime is behind at {}ms", step.at_ms);
        }
        handle.with_state(|state| takes.observe(state));
        match step.action() {
            Some(StepAction::Command(cmd)) => handle.send(takes.command(cmd))?,
            Some(StepAction::Event(event)) => handle.send_clip_event(takes.event(event))?,
            None => {}
        }
    }
    wait_until(clock.as_ref(), origin + script.end_ms() as Timestamp, &interrupted);
    if !handle.wait_until_applied(APPLY_TIMEOUT) {
        log::warn!("[REPLAY] Runtime did not catch up before the report");
    }

    let now = clock.now();
    let state = handle.state().snapshot();
    runtime.shutdown();

    let elapsed = (now - origin).max(0.0) as u64;
    Ok(ReplayReport::new(ReplayMode::Realtime, &state, elapsed, now, &transport))
}

/// Sleep until `deadline`. Returns false if interrupted first.
fn wait_until(clock: &dyn ClockSource, deadline: Timestamp, interrupted: &AtomicBool) -> bool {
    loop {
        if interrupted.load(Ordering::Relaxed) {
            log::info!("[REPLAY] Interrupted");
            return false;
        }
        let now = clock.now();
        if now >= deadline {
            return true;
        }
        let remaining = (deadline - now) as u64;
        thread::sleep(Duration::from_millis(remaining.clamp(1, 50)));
    }
}

fn log_rejected(e: &Error) {
    match e {
        Error::StaleCommand(_) => log::debug!("[REPLAY] Command ignored: {}", e),
        _ => log::warn!("[REPLAY] Command rejected: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = include_str!("../scripts/loop_take.toml");

    fn run(script: &str) -> ReplayReport {
        let script = Script::parse(script).unwrap();
        replay_virtual(&script, SessionIdentity::new("u1", "v1"), &RuntimeConfig::default()).unwrap()
    }

    #[test]
    fn test_demo_replay() {
        let report = run(DEMO);

        assert_eq!(report.transport, PlaybackMode::Stopped);
        assert!((report.true_time - 1.0).abs() < 1e-9);
        assert_eq!(report.loops_taken, Some(1));
        assert_eq!(report.rejected_commands, Some(0));

        let ids: Vec<&str> = report.clips.iter().map(|c| c.key()).collect();
        assert_eq!(ids, vec!["drums", "take-1"]);
        assert!(report.clips.iter().all(|c| matches!(c, PlayableClip::Server(_))));
        assert_eq!(
            report.transport_calls,
            vec![TransportOp::Record, TransportOp::Seek { time: 0.0 }, TransportOp::Stop]
        );
    }

    #[test]
    fn test_pending_take_stays_in_view() {
        let report = run(
            r#"
[[step]]
at_ms = 0
command = { type = "record" }

[[step]]
at_ms = 1500
command = { type = "end_record" }
"#,
        );

        assert_eq!(report.transport, PlaybackMode::Playing);
        assert_eq!(report.clips.len(), 1);
        match &report.clips[0] {
            PlayableClip::Client(take) => {
                assert!(!take.in_progress);
                assert_eq!(take.known_duration(), Some(1.5));
            }
            other => panic!("expected a pending take, got {:?}", other),
        }
    }

    #[test]
    fn test_last_take_resolves_in_commands() {
        let report = run(
            r#"
[[step]]
at_ms = 0
command = { type = "record" }

[[step]]
at_ms = 100
command = { type = "discard_take", audio_store_key = "@last-take" }
"#,
        );

        assert!(report.clips.is_empty());
        assert!(!report.playback.recording);
        assert_eq!(report.rejected_commands, Some(0));
    }

    #[test]
    fn test_same_instant_take_is_resolvable() {
        let script = r#"
[[step]]
at_ms = 0
command = { type = "record" }

[[step]]
at_ms = 0
command = { type = "end_record" }

[[step]]
at_ms = 0
event = { mutation = "ADDED", referenceId = "@last-take", updatedClip = { id = "c1", start = 0.0, audio = { id = "a1" } } }
"#;
        let virtual_report = run(script);
        let ids: Vec<&str> = virtual_report.clips.iter().map(|c| c.key()).collect();
        assert_eq!(ids, vec!["c1"]);

        let parsed = Script::parse(script).unwrap();
        let realtime_report =
            replay_realtime(&parsed, SessionIdentity::new("u1", "v1"), RuntimeConfig::default())
                .unwrap();
        let ids: Vec<&str> = realtime_report.clips.iter().map(|c| c.key()).collect();
        assert_eq!(ids, vec!["c1"]);
        assert!(!realtime_report.playback.recording);
    }

    #[test]
    fn test_stale_commands_are_counted() {
        let report = run(
            r#"
[[step]]
at_ms = 0
command = { type = "end_record" }

[[step]]
at_ms = 10
command = { type = "confirm_take", audio_store_key = "nope", real_clip_id = "c1" }
"#,
        );
        assert_eq!(report.rejected_commands, Some(2));
        assert_eq!(report.version, 0);
    }

    #[test]
    fn test_display_time_follows_ticks() {
        let report = run(
            r#"
end_ms = 1000

[[step]]
at_ms = 0
command = { type = "play" }
"#,
        );
        assert!((report.display_time - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_report_serializes() {
        let report = run(DEMO);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "virtual");
        assert_eq!(json["transport"], "stopped");
        assert_eq!(json["clips"][0]["source"], "server");
        assert!(report.to_string().contains("clip take-1"));
    }
}
