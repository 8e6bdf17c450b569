//! Runtime thread for Vamp.
//!
//! The runtime thread is the only writer of the session state. It:
//! - Applies playback commands in arrival order
//! - Merges subscription events one at a time
//! - Runs the playback tick (loop detection) and the display tick
//!
//! Everything else talks to it through a [`RuntimeHandle`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::RuntimeConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::state::{PlaybackCommand, SessionIdentity, SessionState, StateManager};
use crate::subscription::{ClipEvent, SubscriptionMerger};
use crate::timing::{ClockSource, Timestamp};
use crate::transport::TransportClient;

/// Handle to the running runtime.
///
/// Cheap to clone. Provides message sending and read access to state.
#[derive(Clone)]
pub struct RuntimeHandle {
    /// Sender for playback commands.
    command_tx: Sender<PlaybackCommand>,
    /// Sender for subscription events.
    clip_tx: Sender<ClipEvent>,
    /// Shared state manager for read access.
    state_manager: StateManager,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
    /// Messages accepted through this handle's send methods.
    sent: Arc<AtomicU64>,
    /// Messages the runtime thread has finished applying.
    applied: Arc<AtomicU64>,
}

impl RuntimeHandle {
    /// Send a command to the runtime thread.
    pub fn send(&self, cmd: PlaybackCommand) -> Result<()> {
        self.command_tx.send(cmd).map_err(|_| Error::ChannelClosed)?;
        self.sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Block until every command and clip event sent through this handle so
    /// far has been applied, or `timeout` passes.
    ///
    /// Messages pushed through a cloned sender are not counted as sent.
    /// Returns false on timeout or shutdown.
    pub fn wait_until_applied(&self, timeout: Duration) -> bool {
        let target = self.sent.load(Ordering::Acquire);
        let deadline = Instant::now() + timeout;
        loop {
            if self.applied.load(Ordering::Acquire) >= target {
                return true;
            }
            if self.is_shutdown_requested() || Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Deliver a subscription event to the runtime thread.
    pub fn send_clip_event(&self, event: ClipEvent) -> Result<()> {
        self.clip_tx.send(event).map_err(|_| Error::ChannelClosed)?;
        self.sent.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Get a clone of the command sender.
    pub fn command_sender(&self) -> Sender<PlaybackCommand> {
        self.command_tx.clone()
    }

    /// Get a clone of the subscription event sender.
    ///
    /// Hand this to whatever receives pushes from the backend.
    pub fn clip_event_sender(&self) -> Sender<ClipEvent> {
        self.clip_tx.clone()
    }

    /// Get the state manager for read access.
    pub fn state(&self) -> &StateManager {
        &self.state_manager
    }

    /// Read the state with a closure.
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        self.state_manager.with_state_read(f)
    }

    /// Signal the runtime to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// The Vamp runtime.
///
/// Owns the runtime thread; dropping it stops and joins the thread.
pub struct Runtime {
    handle: RuntimeHandle,
    thread_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Start the runtime thread.
    pub fn start(
        config: RuntimeConfig,
        identity: SessionIdentity,
        transport: impl TransportClient + 'static,
        clock: Arc<dyn ClockSource>,
    ) -> Result<Self> {
        Self::start_with_state(config, SessionState::new(identity), transport, clock)
    }

    /// Start the runtime thread from an existing session state.
    pub fn start_with_state(
        config: RuntimeConfig,
        state: SessionState,
        transport: impl TransportClient + 'static,
        clock: Arc<dyn ClockSource>,
    ) -> Result<Self> {
        config.validate()?;

        let state_manager = StateManager::with_state(state);
        let (command_tx, command_rx) = unbounded();
        let (clip_tx, merger) = SubscriptionMerger::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let applied = Arc::new(AtomicU64::new(0));

        let handle = RuntimeHandle {
            command_tx,
            clip_tx,
            state_manager: state_manager.clone(),
            shutdown: shutdown.clone(),
            sent: Arc::new(AtomicU64::new(0)),
            applied: applied.clone(),
        };

        log::info!(
            "[RUNTIME] Starting (playback tick {}ms, display tick {}ms)",
            config.playback_tick_ms,
            config.display_tick_ms
        );
        let mut rt = RuntimeThread {
            shared: state_manager,
            engine: Engine::new(transport),
            command_rx,
            applied,
            merger,
            clock,
            config,
            last_playback_tick: None,
            last_display_tick: None,
        };
        let thread_handle = thread::Builder::new()
            .name("vamp-runtime".to_string())
            .spawn(move || rt.run(shutdown))?;

        Ok(Self {
            handle,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get a handle to interact with the runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Shut down the runtime gracefully.
    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn stop_thread(&mut self) {
        self.handle.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("[RUNTIME] Runtime thread panicked");
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop_thread();
    }
}

/// The runtime thread that applies commands and runs the ticks.
struct RuntimeThread {
    shared: StateManager,
    engine: Engine,
    command_rx: Receiver<PlaybackCommand>,
    applied: Arc<AtomicU64>,
    merger: SubscriptionMerger,
    clock: Arc<dyn ClockSource>,
    config: RuntimeConfig,
    last_playback_tick: Option<Timestamp>,
    last_display_tick: Option<Timestamp>,
}

impl RuntimeThread {
    fn run(&mut self, shutdown: Arc<AtomicBool>) {
        let interval = self.config.idle_sleep();

        while !shutdown.load(Ordering::Relaxed) {
            self.drain_commands();
            self.drain_clip_events();
            self.tick();
            thread::sleep(interval);
        }
        log::info!("[RUNTIME] Stopped");
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            // Read the clock per command so each applies against the state as it is now
            let now = self.clock.now();
            let name = cmd.type_name();
            let result = self
                .shared
                .with_state_write(|state| self.engine.handle_command(state, cmd, now));
            match result {
                Ok(()) => {}
                Err(e @ Error::StaleCommand(_)) => log::debug!("[RUNTIME] {} ignored: {}", name, e),
                Err(e) => log::warn!("[RUNTIME] {} rejected: {}", name, e),
            }
            self.applied.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn drain_clip_events(&mut self) {
        let merger = &mut self.merger;
        let applied = self.shared.with_state_write(|state| merger.drain(state));
        if applied > 0 {
            self.applied.fetch_add(applied as u64, Ordering::AcqRel);
            log::trace!("[RUNTIME] Merged {} clip event(s)", applied);
        }
    }

    fn tick(&mut self) {
        let now = self.clock.now();

        if is_due(self.last_playback_tick, now, self.config.playback_tick_ms) {
            self.last_playback_tick = Some(now);
            let engine = &mut self.engine;
            let outcome = self.shared.with_state_write(|state| engine.on_tick(state, now));
            if outcome.looped {
                log::trace!("[RUNTIME] Looped at {:.3}s", outcome.true_time);
            }
        }

        if is_due(self.last_display_tick, now, self.config.display_tick_ms) {
            self.last_display_tick = Some(now);
            let engine = &mut self.engine;
            self.shared
                .with_state_write(|state| engine.on_display_tick(state, now));
        }
    }
}

fn is_due(last: Option<Timestamp>, now: Timestamp, interval_ms: u64) -> bool {
    match last {
        Some(last) => now - last >= interval_ms as f64,
        None => true,
    }
}
