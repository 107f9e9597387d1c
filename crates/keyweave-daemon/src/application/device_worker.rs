//! DeviceWorker: the processing unit of one grabbed physical device.
//!
//! Every grabbed device gets its own Tokio task running a [`DeviceWorker`].
//! The worker owns the device's [`EventSource`] and its [`RemapEngine`]; it
//! reads one event at a time, runs it through the engine against the active
//! profile, and writes the resulting output to the shared virtual device.
//!
//! # Ordering and timing
//!
//! - Events of one device are handled strictly in order.  While a macro
//!   waits, the worker keeps reading its device: another press of the
//!   macro's trigger key is ignored, and every other event is queued and
//!   handled after the macro's last step.
//! - A macro `wait` only sleeps this task.  The shared sink is locked for the
//!   duration of a single write, never across a wait.
//! - The active profile is re-read from the [`ProfileManager`] slot before
//!   each event, so a switch lands between two events and never inside a
//!   combo or a macro.
//!
//! # Teardown
//!
//! Whatever ends the worker (a release request, device loss, or a sink
//! fault), it always runs the same path: release every outstanding output
//! key, ungrab the source, and report the exit to the controller.
//!
//! The engine only ever presses keys the virtual device declares, and the
//! release batch is filtered against the declared keys as well, so one
//! unexpected key code can never keep the other releases from being written.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use keyweave_core::config::{CompiledProfile, CompiledStep, DeviceMatcher, MacroId};
use keyweave_core::engine::{Effect, KeyAction, KeyEvent, RemapEngine};
use keyweave_core::{KeyCode, KeySet};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use super::profile_manager::{ProfileManager, ProfileSelection};

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Error type for reading a physical device.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The device node went away (unplugged, `ENODEV`).
    #[error("device disappeared")]
    Gone,
    #[error("device read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A grabbed physical device delivering key events.
///
/// Infrastructure implementations read evdev; test implementations are fed
/// through channels.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next key event.  Non-key events are skipped.
    async fn next_event(&mut self) -> Result<KeyEvent, SourceError>;

    /// Ungrabs and closes the device.  Safe to call more than once.
    fn release(&mut self);
}

/// Error type for writing to the virtual output device.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The event uses a key the virtual device did not declare at creation.
    #[error("virtual device does not declare {0}")]
    CapabilityMissing(KeyCode),
    #[error("failed to create virtual device: {0}")]
    Create(#[source] std::io::Error),
    #[error("virtual device write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The virtual output device.
pub trait OutputSink: Send {
    /// Writes a batch of key events followed by one synchronisation report.
    ///
    /// Either the whole batch is written or, when a key is not declared,
    /// nothing is.
    fn emit(&mut self, events: &[KeyEvent]) -> Result<(), SinkError>;

    /// Keys declared when the device was created.
    fn capabilities(&self) -> &KeySet;
}

/// The single virtual device, shared by every worker.
pub type SharedSink = Arc<Mutex<Box<dyn OutputSink>>>;

// ── Reports ───────────────────────────────────────────────────────────────────

/// Why a worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Release was requested (shutdown, reload, device replaced).
    Released,
    /// The device disappeared.
    Lost,
    /// A per-device fault, e.g. a failed virtual device write.
    Fault(String),
}

/// Sent to the controller when a worker has finished its teardown.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// Generation id assigned when the worker was spawned.
    pub id: u64,
    pub path: PathBuf,
    pub matcher: DeviceMatcher,
    pub reason: ExitReason,
}

/// Handles every worker shares.
#[derive(Clone)]
pub struct WorkerEnv {
    pub sink: SharedSink,
    pub profiles: Arc<ProfileManager>,
    pub exits: mpsc::UnboundedSender<WorkerReport>,
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Event loop state for one grabbed device.
pub struct DeviceWorker {
    id: u64,
    path: PathBuf,
    matcher: DeviceMatcher,
    source: Box<dyn EventSource>,
    sink: SharedSink,
    profiles: Arc<ProfileManager>,
    selection: watch::Receiver<ProfileSelection>,
    cancel: watch::Receiver<bool>,
    exits: mpsc::UnboundedSender<WorkerReport>,
    engine: RemapEngine,
    effects: Vec<Effect>,
    pending: Vec<KeyEvent>,
    /// Events read while a macro waited, handled once it finishes.
    backlog: VecDeque<KeyEvent>,
}

impl DeviceWorker {
    /// Creates a worker following the profile slot `selection`.
    pub fn new(
        env: &WorkerEnv,
        id: u64,
        path: PathBuf,
        matcher: DeviceMatcher,
        source: Box<dyn EventSource>,
        selection: watch::Receiver<ProfileSelection>,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            path,
            matcher,
            source,
            sink: Arc::clone(&env.sink),
            profiles: Arc::clone(&env.profiles),
            selection,
            cancel,
            exits: env.exits.clone(),
            engine: RemapEngine::new(),
            effects: Vec::with_capacity(16),
            pending: Vec::with_capacity(16),
            backlog: VecDeque::new(),
        }
    }

    /// Runs until released, lost, or faulted, then tears down and reports.
    pub async fn run(mut self) {
        let outputs = self.sink.lock().await.capabilities().clone();
        self.engine = RemapEngine::with_outputs(outputs);
        info!(
            path = %self.path.display(),
            device = %self.matcher,
            profile = self.selection.borrow().active_name(),
            "device worker started"
        );

        let reason = self.event_loop().await;
        self.teardown(&reason).await;

        let report = WorkerReport {
            id: self.id,
            path: self.path,
            matcher: self.matcher,
            reason,
        };
        // The controller is gone only during process exit.
        let _ = self.exits.send(report);
    }

    async fn event_loop(&mut self) -> ExitReason {
        if *self.cancel.borrow_and_update() {
            return ExitReason::Released;
        }
        loop {
            let event = match self.backlog.pop_front() {
                Some(event) => {
                    if self.cancel.has_changed().unwrap_or(true) {
                        return ExitReason::Released;
                    }
                    event
                }
                None => {
                    let read = tokio::select! {
                        biased;
                        _ = self.cancel.changed() => return ExitReason::Released,
                        read = self.source.next_event() => read,
                    };
                    match read {
                        Ok(event) => event,
                        Err(e) => return self.read_failed(e),
                    }
                }
            };

            if let Err(reason) = self.handle(event).await {
                return reason;
            }
        }
    }

    fn read_failed(&self, error: SourceError) -> ExitReason {
        match error {
            SourceError::Gone => warn!(path = %self.path.display(), "device disappeared"),
            SourceError::Io(e) => warn!(path = %self.path.display(), "device read failed: {e}"),
        }
        ExitReason::Lost
    }

    /// Processes one event against the profile active right now.
    async fn handle(&mut self, event: KeyEvent) -> Result<(), ExitReason> {
        if self.selection.has_changed().unwrap_or(false) {
            debug!(
                path = %self.path.display(),
                profile = self.selection.borrow().active_name(),
                "adopting new profile selection"
            );
        }
        let selection = self.selection.borrow_and_update().clone();
        let Some(profile) = selection.profile() else {
            return Err(ExitReason::Fault("active profile index out of range".into()));
        };

        trace!(key = event.key.0, action = ?event.action, "input");
        self.engine.process(profile, event, &mut self.effects);

        let mut effects = std::mem::take(&mut self.effects);
        let mut result = Ok(());
        for effect in effects.drain(..) {
            result = match effect {
                Effect::Emit(out) => {
                    self.pending.push(out);
                    Ok(())
                }
                Effect::RunMacro(id) => match self.flush().await {
                    Ok(()) => self.play_macro(profile, id, event.key).await,
                    Err(reason) => Err(reason),
                },
                Effect::SwitchProfile(id) => {
                    let flushed = self.flush().await;
                    if let Err(e) = self.profiles.request_switch_id(&selection.device, id) {
                        warn!(device = %self.matcher, "profile switch ignored: {e}");
                    }
                    flushed
                }
            };
            if result.is_err() {
                break;
            }
        }
        self.effects = effects;
        self.effects.clear();
        result?;
        self.flush().await
    }

    /// Plays a macro of `profile`, started by `trigger`, to completion.  Only
    /// cancellation or device loss cuts it short.
    async fn play_macro(
        &mut self,
        profile: &CompiledProfile,
        id: MacroId,
        trigger: KeyCode,
    ) -> Result<(), ExitReason> {
        let steps = profile.macro_steps(id);
        debug!(path = %self.path.display(), steps = steps.len(), "macro started");

        self.engine.begin_macro(&mut self.pending);
        for step in steps {
            match *step {
                CompiledStep::Tap(chord) => self.engine.tap(chord, &mut self.pending),
                CompiledStep::Wait(delay) => {
                    self.flush().await?;
                    if let Err(reason) = self.pause(Instant::now() + delay, trigger).await {
                        self.engine.end_macro(&mut self.pending);
                        return Err(reason);
                    }
                }
            }
        }
        self.engine.end_macro(&mut self.pending);
        self.flush().await?;

        debug!(path = %self.path.display(), "macro finished");
        Ok(())
    }

    /// Sleeps until `deadline`, reading the device meanwhile.
    ///
    /// Presses of `trigger` are dropped; everything else goes to the backlog.
    async fn pause(&mut self, deadline: Instant, trigger: KeyCode) -> Result<(), ExitReason> {
        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.changed() => return Err(ExitReason::Released),
                _ = tokio::time::sleep_until(deadline) => return Ok(()),
                read = self.source.next_event() => read,
            };
            match read {
                Ok(event) if event.key == trigger && event.action == KeyAction::Down => {
                    debug!(
                        path = %self.path.display(),
                        key = %trigger,
                        "macro trigger pressed during playback; ignored"
                    );
                }
                Ok(event) => self.backlog.push_back(event),
                Err(e) => return Err(self.read_failed(e)),
            }
        }
    }

    /// Writes the pending batch to the shared sink.
    async fn flush(&mut self) -> Result<(), ExitReason> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let written = self.sink.lock().await.emit(&self.pending);
        self.pending.clear();
        written.map_err(|e| {
            error!(path = %self.path.display(), "virtual device write failed: {e}");
            ExitReason::Fault(e.to_string())
        })
    }

    async fn teardown(&mut self, reason: &ExitReason) {
        self.engine.release_all(&mut self.pending);
        {
            let sink = self.sink.lock().await;
            let declared = sink.capabilities();
            self.pending.retain(|e| declared.contains(e.key));
        }
        let released = self.pending.len();
        if let Err(ExitReason::Fault(e)) = self.flush().await {
            error!(path = %self.path.display(), "could not release outstanding keys: {e}");
        }
        if !self.engine.outstanding().is_empty() {
            error!(
                path = %self.path.display(),
                outstanding = ?self.engine.outstanding(),
                "output keys still down after release"
            );
        }
        self.source.release();

        info!(
            path = %self.path.display(),
            device = %self.matcher,
            released_keys = released,
            reason = ?reason,
            "device worker stopped"
        );
    }
}
