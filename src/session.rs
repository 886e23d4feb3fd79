// The middle layer. Owns the instrument bank, the mode registry, and the
// scheduler; everything that can make sound goes through here on one
// sequential control path. The caller (main loop or a test) feeds in key
// events and elapsed time and forwards the returned EngineCommands to
// whatever engine is listening.

use std::collections::HashMap;
use std::time::Duration;

use crate::clock::Scheduler;
use crate::engine_api::EngineCommand;
use crate::error::SetupError;
use crate::instrument::InstrumentBank;
use crate::keymap::{Action, ModeRegistry};
use crate::shared::{Command, InstrumentId, InstrumentKind, KeyEvent, ModeId, SignalId, TimerId};

pub struct Session {
    pub bank: InstrumentBank,
    pub modes: ModeRegistry,
    pub clock: Scheduler,
    // up-actions armed by key-downs, keyed by key token. Captured at
    // down-time so a chained mode switch can't orphan a held note.
    held: HashMap<String, Action>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            bank: InstrumentBank::new(),
            modes: ModeRegistry::new(),
            clock: Scheduler::new(),
            held: HashMap::new(),
        }
    }

    // ── setup surface ─────────────────────────────────────────────

    pub fn register_signal(&mut self, name: &str) -> (SignalId, EngineCommand) {
        self.bank.register_signal(name)
    }

    pub fn create_instrument(
        &mut self,
        kind: InstrumentKind,
        signal: SignalId,
    ) -> Result<InstrumentId, SetupError> {
        self.bank.create(kind, signal)
    }

    pub fn create_mode(
        &mut self,
        name: &str,
        default_target: Option<ModeId>,
        default_action: Option<Action>,
    ) -> Result<ModeId, SetupError> {
        self.modes.create(name, default_target, default_action)
    }

    pub fn bind(
        &mut self,
        mode: ModeId,
        key: &str,
        action: Action,
        chain: Option<ModeId>,
    ) -> Result<(), SetupError> {
        self.modes.bind(mode, key, action, chain, &self.bank)
    }

    pub fn bind_up(&mut self, mode: ModeId, key: &str, action: Action) -> Result<(), SetupError> {
        self.modes.bind_up(mode, key, action, &self.bank)
    }

    pub fn unbind(&mut self, mode: ModeId, key: &str) -> Result<(), SetupError> {
        self.modes.unbind(mode, key)
    }

    pub fn set_mode_default(
        &mut self,
        mode: ModeId,
        target: Option<ModeId>,
        action: Option<Action>,
    ) -> Result<(), SetupError> {
        self.modes.set_default(mode, target, action)
    }

    pub fn activate(&mut self, mode: ModeId) -> Result<(), SetupError> {
        self.modes.activate(mode)
    }

    pub fn set_tempo(&mut self, bpm: f32) -> Result<(), SetupError> {
        self.clock.set_tempo(bpm)
    }

    pub fn tempo(&self) -> f32 {
        self.clock.tempo()
    }

    pub fn on_beat(&mut self, beats: f32, cmd: Command) -> Result<TimerId, SetupError> {
        self.clock.on_beat(beats, cmd)
    }

    pub fn on_timeout(&mut self, secs: f32, cmd: Command) -> Result<TimerId, SetupError> {
        self.clock.on_timeout(secs, cmd)
    }

    pub fn cancel_timer(&mut self, id: TimerId) -> Result<(), SetupError> {
        self.clock.cancel(id)
    }

    // ── runtime surface ───────────────────────────────────────────

    /// Direct scripted trigger, same path as a button down-action.
    pub fn play(&mut self, instrument: InstrumentId, pitch: f32, voice: u32) -> Vec<EngineCommand> {
        let mut out = Vec::new();
        self.run(
            Command::Play {
                instrument,
                pitch,
                voice,
            },
            &mut out,
        );
        out
    }

    /// Direct scripted stop, independent of any key-up.
    pub fn mute(&mut self, instrument: InstrumentId, voice: u32) -> Vec<EngineCommand> {
        let mut out = Vec::new();
        self.run(Command::Mute { instrument, voice }, &mut out);
        out
    }

    /// Dispatch one key event through the active mode.
    pub fn handle_key(&mut self, event: KeyEvent) -> Vec<EngineCommand> {
        log::debug!(
            "key {:?} {} at {:?}",
            event.key,
            if event.down { "down" } else { "up" },
            event.at
        );
        let mut out = Vec::new();
        if event.down {
            let Some((action, chain)) = self.modes.resolve_down(&event.key) else {
                log::debug!("key {:?} unbound in active mode", event.key);
                return out;
            };
            // arm the up-action before running anything; a chained mode
            // switch must not change what this key's release does
            if let Some(up) = self.modes.resolve_up(&event.key) {
                self.held.insert(event.key.clone(), up);
            }
            self.run_action(action, &mut out);
            // chain applies after the action's side effects
            if let Some(next) = chain {
                if let Err(e) = self.modes.activate(next) {
                    log::warn!("chained mode switch failed: {e}");
                }
            }
        } else if let Some(up) = self.held.remove(&event.key) {
            self.run_action(up, &mut out);
        }
        out
    }

    /// Advance the logical clock: expire one-shot voices, then run every
    /// timer command that came due. The due set is snapshotted by the
    /// scheduler before anything runs, so commands may cancel timers
    /// (even their own) mid-flight.
    pub fn tick(&mut self, dt: Duration) -> Vec<EngineCommand> {
        let due = self.clock.tick(dt);
        self.bank.tick(self.clock.now());
        let mut out = Vec::new();
        for cmd in due {
            self.run(cmd, &mut out);
        }
        out
    }

    fn run_action(&mut self, action: Action, out: &mut Vec<EngineCommand>) {
        match action {
            Action::Button {
                instrument,
                pitch,
                voice,
            } => {
                let now = self.clock.now();
                out.extend(self.bank.trigger(instrument, pitch, voice, now));
            }
            Action::Command(cmd) => self.run(cmd, out),
        }
    }

    /// Execute one command from the command surface. Failures here are
    /// runtime conditions, so they log instead of propagating.
    pub fn run(&mut self, cmd: Command, out: &mut Vec<EngineCommand>) {
        match cmd {
            Command::Play {
                instrument,
                pitch,
                voice,
            } => {
                let now = self.clock.now();
                out.extend(self.bank.trigger(instrument, pitch, voice, now));
            }
            Command::Mute { instrument, voice } => {
                out.extend(self.bank.release(instrument, voice));
            }
            Command::SetTempo(bpm) => {
                if let Err(e) = self.clock.set_tempo(bpm) {
                    log::warn!("tempo command ignored: {e}");
                }
            }
            Command::SwitchMode(mode) => {
                if let Err(e) = self.modes.activate(mode) {
                    log::warn!("mode switch command ignored: {e}");
                }
            }
            Command::CancelTimer(id) => {
                if let Err(e) = self.clock.cancel(id) {
                    // usually a caller bug, worth surfacing in the log
                    log::warn!("cancel command ignored: {e}");
                }
            }
            Command::Seq(cmds) => {
                for cmd in cmds {
                    self.run(cmd, out);
                }
            }
        }
    }
}
