// Modes and key bindings. Exactly one mode is active at a time; a key-down
// resolves to its binding in the active mode (or the mode's default), and
// the binding may chain into another mode for momentary layers.

use std::collections::HashMap;

use crate::error::SetupError;
use crate::instrument::InstrumentBank;
use crate::shared::{Command, InstrumentId, ModeId, NUM_VOICES};

/// What a key does. Resolved at bind time: a playable button gets its
/// trigger/release pair synthesized; anything else is an opaque command
/// the binding layer never looks inside.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Command(Command),
    Button {
        instrument: InstrumentId,
        pitch: f32,
        voice: u32,
    },
}

#[derive(Clone, Debug)]
pub struct Binding {
    pub down: Action,
    pub up: Option<Action>,
    /// mode to activate after the down action fires
    pub chain: Option<ModeId>,
}

pub struct Mode {
    pub name: String,
    bindings: HashMap<String, Binding>,
    // fallback when a key has no binding at all
    pub default_action: Option<Action>,
    pub default_target: Option<ModeId>,
}

impl Mode {
    fn new(name: String, default_target: Option<ModeId>, default_action: Option<Action>) -> Self {
        Self {
            name,
            bindings: HashMap::new(),
            default_action,
            default_target,
        }
    }

    pub fn binding(&self, key: &str) -> Option<&Binding> {
        self.bindings.get(key)
    }
}

/// Owns all modes and the single active-mode reference.
pub struct ModeRegistry {
    modes: Vec<Mode>,
    active: ModeId,
}

impl ModeRegistry {
    /// Starts with an empty "Normal" mode at id 0, already active.
    pub fn new() -> Self {
        Self {
            modes: vec![Mode::new("Normal".to_owned(), None, None)],
            active: ModeId(0),
        }
    }

    pub fn create(
        &mut self,
        name: &str,
        default_target: Option<ModeId>,
        default_action: Option<Action>,
    ) -> Result<ModeId, SetupError> {
        if self.modes.iter().any(|m| m.name == name) {
            return Err(SetupError::DuplicateMode(name.to_owned()));
        }
        if let Some(target) = default_target {
            self.check_mode(target)?;
        }
        let id = ModeId(self.modes.len() as u32);
        self.modes
            .push(Mode::new(name.to_owned(), default_target, default_action));
        Ok(id)
    }

    pub fn active(&self) -> ModeId {
        self.active
    }

    pub fn activate(&mut self, id: ModeId) -> Result<(), SetupError> {
        self.check_mode(id)?;
        self.active = id;
        Ok(())
    }

    pub fn mode(&self, id: ModeId) -> Option<&Mode> {
        self.modes.get(id.0 as usize)
    }

    pub fn find(&self, name: &str) -> Option<ModeId> {
        self.modes
            .iter()
            .position(|m| m.name == name)
            .map(|i| ModeId(i as u32))
    }

    /// Install a binding, overwriting any previous one for `key`. Button
    /// actions get a release up-action synthesized; opaque commands fire
    /// on key-down only unless `bind_up` adds something later.
    pub fn bind(
        &mut self,
        mode: ModeId,
        key: &str,
        action: Action,
        chain: Option<ModeId>,
        bank: &InstrumentBank,
    ) -> Result<(), SetupError> {
        self.check_action(&action, bank)?;
        if let Some(chain) = chain {
            self.check_mode(chain)?;
        }
        let up = match &action {
            Action::Button {
                instrument, voice, ..
            } => Some(Action::Command(Command::Mute {
                instrument: *instrument,
                voice: *voice,
            })),
            Action::Command(_) => None,
        };
        let mode = self.mode_mut(mode)?;
        mode.bindings.insert(
            key.to_owned(),
            Binding {
                down: action,
                up,
                chain,
            },
        );
        Ok(())
    }

    /// Override just the up-action for an already-bound key.
    pub fn bind_up(
        &mut self,
        mode: ModeId,
        key: &str,
        action: Action,
        bank: &InstrumentBank,
    ) -> Result<(), SetupError> {
        self.check_action(&action, bank)?;
        let mode = self.mode_mut(mode)?;
        let binding = mode
            .bindings
            .get_mut(key)
            .ok_or_else(|| SetupError::UnboundKey(key.to_owned()))?;
        binding.up = Some(action);
        Ok(())
    }

    /// Replace a mode's fallback. Patch application sets defaults in a
    /// second pass so a default target can name a mode declared later.
    pub fn set_default(
        &mut self,
        mode: ModeId,
        target: Option<ModeId>,
        action: Option<Action>,
    ) -> Result<(), SetupError> {
        if let Some(target) = target {
            self.check_mode(target)?;
        }
        let mode = self.mode_mut(mode)?;
        mode.default_target = target;
        mode.default_action = action;
        Ok(())
    }

    /// Drop both actions for `key`. Unbinding a key that was never bound
    /// is fine.
    pub fn unbind(&mut self, mode: ModeId, key: &str) -> Result<(), SetupError> {
        let mode = self.mode_mut(mode)?;
        mode.bindings.remove(key);
        Ok(())
    }

    /// Resolve a key-down against the active mode: the key's binding, or
    /// the mode default (whose target plays the role of the chain), or
    /// nothing.
    pub fn resolve_down(&self, key: &str) -> Option<(Action, Option<ModeId>)> {
        let mode = &self.modes[self.active.0 as usize];
        if let Some(binding) = mode.bindings.get(key) {
            return Some((binding.down.clone(), binding.chain));
        }
        mode.default_action
            .clone()
            .map(|action| (action, mode.default_target))
    }

    /// The up-action a key-down on `key` would arm right now, if any.
    pub fn resolve_up(&self, key: &str) -> Option<Action> {
        self.modes[self.active.0 as usize]
            .bindings
            .get(key)
            .and_then(|b| b.up.clone())
    }

    fn mode_mut(&mut self, id: ModeId) -> Result<&mut Mode, SetupError> {
        self.modes
            .get_mut(id.0 as usize)
            .ok_or(SetupError::UnknownMode(id))
    }

    fn check_mode(&self, id: ModeId) -> Result<(), SetupError> {
        if (id.0 as usize) < self.modes.len() {
            Ok(())
        } else {
            Err(SetupError::UnknownMode(id))
        }
    }

    // bindings are config, so bad button references fail here instead of
    // becoming silent no-ops at dispatch time
    fn check_action(&self, action: &Action, bank: &InstrumentBank) -> Result<(), SetupError> {
        if let Action::Button {
            instrument, voice, ..
        } = action
        {
            if !bank.contains(*instrument) {
                return Err(SetupError::UnknownInstrument(*instrument));
            }
            if *voice as usize >= NUM_VOICES {
                return Err(SetupError::VoiceOutOfRange(*voice));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::InstrumentKind;

    fn fixture() -> (ModeRegistry, InstrumentBank, InstrumentId) {
        let mut bank = InstrumentBank::new();
        let (sig, _) = bank.register_signal("sine");
        let inst = bank.create(InstrumentKind::Sustaining, sig).unwrap();
        (ModeRegistry::new(), bank, inst)
    }

    fn button(inst: InstrumentId, pitch: f32, voice: u32) -> Action {
        Action::Button {
            instrument: inst,
            pitch,
            voice,
        }
    }

    #[test]
    fn normal_mode_is_seeded_and_active() {
        let reg = ModeRegistry::new();
        assert_eq!(reg.active(), ModeId(0));
        assert_eq!(reg.mode(ModeId(0)).unwrap().name, "Normal");
        assert_eq!(reg.find("Normal"), Some(ModeId(0)));
    }

    #[test]
    fn duplicate_mode_name_is_rejected() {
        let mut reg = ModeRegistry::new();
        assert!(reg.create("Drums", None, None).is_ok());
        assert_eq!(
            reg.create("Drums", None, None),
            Err(SetupError::DuplicateMode("Drums".to_owned()))
        );
        assert_eq!(
            reg.create("Normal", None, None),
            Err(SetupError::DuplicateMode("Normal".to_owned()))
        );
    }

    #[test]
    fn button_bind_synthesizes_release_up_action() {
        let (mut reg, bank, inst) = fixture();
        reg.bind(ModeId(0), "a", button(inst, 440.0, 0), None, &bank)
            .unwrap();
        let binding = reg.mode(ModeId(0)).unwrap().binding("a").unwrap();
        assert_eq!(
            binding.up,
            Some(Action::Command(Command::Mute {
                instrument: inst,
                voice: 0
            }))
        );
        assert_eq!(reg.resolve_up("a"), binding.up.clone());
    }

    #[test]
    fn opaque_command_gets_no_up_action() {
        let (mut reg, bank, _) = fixture();
        reg.bind(
            ModeId(0),
            "t",
            Action::Command(Command::SetTempo(90.0)),
            None,
            &bank,
        )
        .unwrap();
        assert_eq!(reg.resolve_up("t"), None);
    }

    #[test]
    fn rebinding_overwrites_and_unbind_clears() {
        let (mut reg, bank, inst) = fixture();
        let m = ModeId(0);
        reg.bind(m, "a", button(inst, 440.0, 0), None, &bank).unwrap();
        reg.bind(m, "a", button(inst, 550.0, 1), None, &bank).unwrap();

        // only the last bind matters
        let (down, _) = reg.resolve_down("a").unwrap();
        assert_eq!(down, button(inst, 550.0, 1));

        reg.unbind(m, "a").unwrap();
        assert!(reg.resolve_down("a").is_none());
        // unbinding again is fine
        reg.unbind(m, "a").unwrap();
    }

    #[test]
    fn bind_up_requires_existing_binding() {
        let (mut reg, bank, inst) = fixture();
        assert_eq!(
            reg.bind_up(ModeId(0), "x", button(inst, 110.0, 0), &bank),
            Err(SetupError::UnboundKey("x".to_owned()))
        );
    }

    #[test]
    fn bind_up_overrides_synthesized_release() {
        let (mut reg, bank, inst) = fixture();
        let m = ModeId(0);
        reg.bind(m, "a", button(inst, 440.0, 0), None, &bank).unwrap();
        reg.bind_up(m, "a", Action::Command(Command::SetTempo(60.0)), &bank)
            .unwrap();
        assert_eq!(
            reg.resolve_up("a"),
            Some(Action::Command(Command::SetTempo(60.0)))
        );
    }

    #[test]
    fn bind_validates_button_and_chain() {
        let (mut reg, bank, inst) = fixture();
        let m = ModeId(0);
        assert_eq!(
            reg.bind(m, "a", button(InstrumentId(9), 440.0, 0), None, &bank),
            Err(SetupError::UnknownInstrument(InstrumentId(9)))
        );
        assert_eq!(
            reg.bind(m, "a", button(inst, 440.0, NUM_VOICES as u32), None, &bank),
            Err(SetupError::VoiceOutOfRange(NUM_VOICES as u32))
        );
        assert_eq!(
            reg.bind(m, "a", button(inst, 440.0, 0), Some(ModeId(5)), &bank),
            Err(SetupError::UnknownMode(ModeId(5)))
        );
    }

    #[test]
    fn default_action_falls_back_with_default_target() {
        let (mut reg, bank, inst) = fixture();
        let layer = reg
            .create(
                "Layer",
                Some(ModeId(0)),
                Some(Action::Command(Command::SwitchMode(ModeId(0)))),
            )
            .unwrap();
        reg.bind(layer, "a", button(inst, 440.0, 0), None, &bank)
            .unwrap();
        reg.activate(layer).unwrap();

        // bound key: its own binding, no default involved
        let (_, chain) = reg.resolve_down("a").unwrap();
        assert_eq!(chain, None);

        // unbound key: default action, default target as the chain
        let (action, chain) = reg.resolve_down("zzz").unwrap();
        assert_eq!(action, Action::Command(Command::SwitchMode(ModeId(0))));
        assert_eq!(chain, Some(ModeId(0)));
    }

    #[test]
    fn unbound_key_without_default_resolves_to_nothing() {
        let (reg, _, _) = fixture();
        assert!(reg.resolve_down("q").is_none());
        assert!(reg.resolve_up("q").is_none());
    }

    #[test]
    fn activate_rejects_unknown_mode() {
        let mut reg = ModeRegistry::new();
        assert_eq!(
            reg.activate(ModeId(3)),
            Err(SetupError::UnknownMode(ModeId(3)))
        );
    }
}
