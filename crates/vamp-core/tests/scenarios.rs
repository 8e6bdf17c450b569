//! End-to-end session scenarios driven through the public API.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use vamp_core::{
    should_loop, AudioRef, Cab, ClipEvent, Clip, ClientClipStore, Engine, ManualClock,
    MergeEffect, PlayableClip, PlaybackCommand, PlaybackMode, PlaybackState, RecordingTransport,
    Runtime, RuntimeConfig, SessionIdentity, SessionState, SubscriptionMerger, TransportOp,
};

/// Route engine logs through the test harness; `RUST_LOG=debug` shows them.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn clip(id: &str, start: f64) -> Clip {
    Clip::new(
        id,
        start,
        AudioRef {
            id: format!("audio-{id}"),
            duration: Some(2.0),
            filename: None,
        },
    )
}

fn looping_session() -> SessionState {
    let mut state = SessionState::new(SessionIdentity::new("user-1", "vamp-1"));
    state.set_cab_bounds(0.0, Some(4.0)).unwrap();
    state.set_loop(true).unwrap();
    SubscriptionMerger::apply(&mut state, ClipEvent::added(clip("bass", 0.0), None));
    state
}

#[test]
fn stopped_true_time_is_frozen_position() {
    init_logging();
    let mut playback = PlaybackState::default();
    playback.seek(7.25, 0.0);
    for now in [0.0, 1_000.0, 1e9] {
        assert_eq!(playback.true_time(now), 7.25);
    }
}

#[test]
fn playing_true_time_advances_with_wall_clock() {
    init_logging();
    let mut playback = PlaybackState::default();
    playback.seek(1.5, 0.0);
    playback.play(10_000.0);
    assert!((playback.true_time(12_500.0) - 4.0).abs() < 1e-9);
}

#[test]
fn degenerate_cab_never_loops() {
    init_logging();
    for (start, end) in [(2.0, 2.0), (3.0, 1.0)] {
        let cab = Cab {
            start,
            end: Some(end),
            loops: true,
        };
        assert!(!should_loop(10.0, &cab, true, false));
    }
}

#[test]
fn duplicate_added_is_idempotent() {
    init_logging();
    let mut state = SessionState::default();
    let first = SubscriptionMerger::apply(&mut state, ClipEvent::added(clip("c1", 1.0), None));
    let version = state.version;
    let second = SubscriptionMerger::apply(&mut state, ClipEvent::added(clip("c1", 1.0), None));

    assert_eq!(first.effect, MergeEffect::Inserted);
    assert_eq!(second.effect, MergeEffect::Unchanged);
    assert_eq!(state.clips.len(), 1);
    assert_eq!(state.version, version);
}

#[test]
fn take_lifecycle_leaves_no_record() {
    init_logging();
    let mut store = ClientClipStore::new();
    store.begin("k", 0.0).unwrap();
    assert!(store.end("k"));
    assert!(store.hand_off("k", "r1"));
    assert!(store.remove("k"));
    assert!(!store.remove("k"));
    assert!(store.is_empty());
}

#[test]
fn loop_wraps_to_cab_start() {
    init_logging();
    let transport = RecordingTransport::new();
    let mut engine = Engine::new(transport.clone());
    let mut state = looping_session();

    engine
        .handle_command(&mut state, PlaybackCommand::Seek { time: 3.8 }, 0.0)
        .unwrap();
    engine.handle_command(&mut state, PlaybackCommand::Play, 0.0).unwrap();

    let outcome = engine.on_tick(&mut state, 300.0);
    assert!(outcome.looped);
    assert!((outcome.true_time - 4.1).abs() < 1e-9);
    assert_eq!(transport.calls().last(), Some(&TransportOp::Seek { time: 0.0 }));

    let next = engine.on_tick(&mut state, 300.0);
    assert!(!next.looped);
    assert_eq!(next.true_time, 0.0);
    assert_eq!(engine.loops_taken(), 1);
}

#[test]
fn confirmation_replaces_take_in_view() {
    init_logging();
    let mut state = SessionState::default();
    state.client_clips.begin("abc", 2.0).unwrap();

    let outcome = SubscriptionMerger::apply(
        &mut state,
        ClipEvent::added(clip("clip99", 2.0), Some("abc".to_string())),
    );

    assert_eq!(outcome.handed_off.as_deref(), Some("abc"));
    assert!(!state.client_clips.contains("abc"));
    assert!(state.clips.contains("clip99"));
    let view = state.clips_to_play();
    assert_eq!(view.len(), 1);
    assert!(matches!(&view[0], PlayableClip::Server(c) if c.id == "clip99"));
}

#[test]
fn empty_workspace_does_not_loop() {
    init_logging();
    let mut engine = Engine::default();
    let mut state = SessionState::default();
    state.set_cab_bounds(0.0, Some(4.0)).unwrap();
    state.set_loop(true).unwrap();
    engine
        .handle_command(&mut state, PlaybackCommand::Seek { time: 3.8 }, 0.0)
        .unwrap();
    engine.handle_command(&mut state, PlaybackCommand::Play, 0.0).unwrap();

    let outcome = engine.on_tick(&mut state, 1_000.0);
    assert!(!outcome.looped);
    assert!((outcome.true_time - 4.8).abs() < 1e-9);
}

#[test]
fn removed_clip_is_not_resurrected() {
    init_logging();
    let mut state = SessionState::default();
    SubscriptionMerger::apply(&mut state, ClipEvent::added(clip("c1", 0.0), None));
    SubscriptionMerger::apply(&mut state, ClipEvent::removed(clip("c1", 0.0)));
    let late = SubscriptionMerger::apply(&mut state, ClipEvent::added(clip("c1", 0.0), None));

    assert_eq!(late.effect, MergeEffect::Unchanged);
    assert!(state.clips.is_empty());
}

#[test]
fn record_from_stopped_plays_and_measures_take() {
    init_logging();
    let transport = RecordingTransport::new();
    let mut engine = Engine::new(transport.clone());
    let mut state = SessionState::default();

    engine
        .handle_command(&mut state, PlaybackCommand::Record, 1_000.0)
        .unwrap();
    assert_eq!(state.playback.mode(), PlaybackMode::Recording);
    let key = state.active_take.as_ref().unwrap().audio_store_key.clone();
    assert!(state.client_clips.get(&key).unwrap().in_progress);

    engine
        .handle_command(&mut state, PlaybackCommand::Stop, 3_500.0)
        .unwrap();
    let take = state.client_clips.get(&key).unwrap();
    assert!(!take.in_progress);
    assert_eq!(take.known_duration(), Some(2.5));
    assert_eq!(state.playback.mode(), PlaybackMode::Stopped);
    assert_eq!(transport.calls(), vec![TransportOp::Record, TransportOp::Stop]);
}

#[test]
fn take_spanning_a_loop_keeps_full_duration() {
    init_logging();
    let mut engine = Engine::default();
    let mut state = looping_session();

    engine
        .handle_command(&mut state, PlaybackCommand::Seek { time: 3.0 }, 0.0)
        .unwrap();
    engine.handle_command(&mut state, PlaybackCommand::Record, 0.0).unwrap();
    let key = state.active_take.as_ref().unwrap().audio_store_key.clone();

    assert!(engine.on_tick(&mut state, 1_200.0).looped);
    engine
        .handle_command(&mut state, PlaybackCommand::EndRecord, 2_000.0)
        .unwrap();

    let take = state.client_clips.get(&key).unwrap();
    assert_eq!(take.start, 3.0);
    assert_eq!(take.known_duration(), Some(2.0));
    assert!(state.playback.playing);
}

#[test]
fn runtime_applies_commands_and_loops_on_its_own_tick() {
    init_logging();
    let clock = ManualClock::at(0.0);
    let transport = RecordingTransport::new();
    let runtime = Runtime::start(
        RuntimeConfig::default(),
        SessionIdentity::new("user-1", "vamp-1"),
        transport.clone(),
        Arc::new(clock.clone()),
    )
    .unwrap();
    let handle = runtime.handle().clone();

    handle
        .clip_event_sender()
        .send(ClipEvent::added(clip("bass", 0.0), None))
        .unwrap();
    for cmd in [
        PlaybackCommand::SetCab {
            start: 1.0,
            end: Some(2.0),
        },
        PlaybackCommand::SetLoop { loops: true },
        PlaybackCommand::Seek { time: 1.9 },
        PlaybackCommand::Play,
    ] {
        handle.send(cmd).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.with_state(|s| s.playback.playing) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert!(handle.state().playback().playing);

    clock.advance(500.0);
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.state().playback().play_position != 1.0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(handle.state().playback().play_position, 1.0);
    assert!(transport.calls().contains(&TransportOp::Seek { time: 1.0 }));

    runtime.shutdown();
}

#[test]
fn runtime_handle_is_the_write_path() {
    init_logging();
    let transport = RecordingTransport::new();
    let runtime = Runtime::start(
        RuntimeConfig::default(),
        SessionIdentity::new("user-1", "vamp-1"),
        transport.clone(),
        Arc::new(ManualClock::at(0.0)),
    )
    .unwrap();
    let handle = runtime.handle().clone();
    let before = handle.state().version();

    handle.send(PlaybackCommand::Play).unwrap();
    handle.send(PlaybackCommand::Record).unwrap();
    assert!(handle.wait_until_applied(Duration::from_secs(5)));

    assert_eq!(handle.state().version(), before + 2);
    assert_eq!(handle.state().playback().mode(), PlaybackMode::Recording);
    assert!(handle.with_state(|s| s.active_take.is_some()));
    assert_eq!(transport.calls(), vec![TransportOp::Play, TransportOp::Record]);

    runtime.shutdown();
}
