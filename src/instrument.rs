// Instrument model + voice registry. Instruments are created at setup and
// live for the session; voices are slots in a fixed per-instrument table.

use std::time::Duration;

use crate::engine_api::{EngineCommand, TriggerParams};
use crate::error::SetupError;
use crate::shared::{InstrumentId, InstrumentKind, SignalId, NUM_VOICES};

// implied sounding time of a one-shot voice on the logical clock; the
// engine shapes the actual decay, this just frees the slot
const ONE_SHOT_HOLD: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, Default)]
pub struct VoiceSlot {
    pub active: bool,
    pub pitch: f32,
    // Some only while a one-shot voice is sounding
    decay_at: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct Instrument {
    pub id: InstrumentId,
    pub kind: InstrumentKind,
    pub signal: SignalId,
    pub voices: [VoiceSlot; NUM_VOICES],
}

/// Owns every instrument and the set of signal descriptors the host has
/// issued. All trigger/release traffic funnels through here, whether it
/// came from a key binding or a timer command.
pub struct InstrumentBank {
    instruments: Vec<Instrument>,
    signals: Vec<String>, // index = SignalId
}

impl InstrumentBank {
    pub fn new() -> Self {
        Self {
            instruments: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// Allocate a descriptor for a signal algorithm and produce the
    /// registration command for the engine.
    pub fn register_signal(&mut self, name: &str) -> (SignalId, EngineCommand) {
        let id = SignalId(self.signals.len() as u32);
        self.signals.push(name.to_owned());
        (
            id,
            EngineCommand::RegisterSignal {
                id,
                name: name.to_owned(),
            },
        )
    }

    pub fn signal_name(&self, id: SignalId) -> Option<&str> {
        self.signals.get(id.0 as usize).map(String::as_str)
    }

    pub fn create(
        &mut self,
        kind: InstrumentKind,
        signal: SignalId,
    ) -> Result<InstrumentId, SetupError> {
        if signal.0 as usize >= self.signals.len() {
            return Err(SetupError::InvalidSignal(signal));
        }
        let id = InstrumentId(self.instruments.len() as u32);
        self.instruments.push(Instrument {
            id,
            kind,
            signal,
            voices: [VoiceSlot::default(); NUM_VOICES],
        });
        Ok(id)
    }

    pub fn get(&self, id: InstrumentId) -> Option<&Instrument> {
        self.instruments.get(id.0 as usize)
    }

    pub fn contains(&self, id: InstrumentId) -> bool {
        (id.0 as usize) < self.instruments.len()
    }

    /// Mark (instrument, voice) active at `pitch` and emit the trigger.
    /// Retriggering an active voice just replaces its pitch; it never
    /// stacks a second note on the slot. Bad instrument ids and
    /// out-of-range voices are runtime no-ops, not errors.
    pub fn trigger(
        &mut self,
        id: InstrumentId,
        pitch: f32,
        voice: u32,
        now: Duration,
    ) -> Option<EngineCommand> {
        let Some(inst) = self.instruments.get_mut(id.0 as usize) else {
            log::warn!("trigger on unknown instrument {:?}", id);
            return None;
        };
        let Some(slot) = inst.voices.get_mut(voice as usize) else {
            log::warn!("trigger on {:?} voice {} out of range", id, voice);
            return None;
        };
        slot.active = true;
        slot.pitch = pitch;
        slot.decay_at = match inst.kind {
            InstrumentKind::Sustaining => None,
            InstrumentKind::OneShot => Some(now + ONE_SHOT_HOLD),
        };
        Some(EngineCommand::Trigger(TriggerParams {
            instrument: id,
            kind: inst.kind,
            signal: inst.signal,
            pitch,
            voice,
        }))
    }

    /// Deactivate a sustaining voice. Inactive voices and one-shot
    /// instruments are silent no-ops; key-ups routinely land here.
    pub fn release(&mut self, id: InstrumentId, voice: u32) -> Option<EngineCommand> {
        let Some(inst) = self.instruments.get_mut(id.0 as usize) else {
            log::warn!("release on unknown instrument {:?}", id);
            return None;
        };
        if inst.kind == InstrumentKind::OneShot {
            return None; // nothing sustained to cut
        }
        let slot = inst.voices.get_mut(voice as usize)?;
        if !slot.active {
            return None;
        }
        slot.active = false;
        Some(EngineCommand::Release {
            instrument: id,
            voice,
        })
    }

    /// Return one-shot slots whose hold time has elapsed to inactive.
    /// No engine traffic; the engine decays those voices by itself.
    pub fn tick(&mut self, now: Duration) {
        for inst in &mut self.instruments {
            for slot in &mut inst.voices {
                if let Some(deadline) = slot.decay_at {
                    if deadline <= now {
                        slot.active = false;
                        slot.decay_at = None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f32) -> Duration {
        Duration::from_secs_f32(s)
    }

    fn bank_with_signal() -> (InstrumentBank, SignalId) {
        let mut bank = InstrumentBank::new();
        let (sig, _) = bank.register_signal("sine");
        (bank, sig)
    }

    #[test]
    fn create_rejects_unregistered_signal() {
        let (mut bank, _) = bank_with_signal();
        let bogus = SignalId(7);
        assert_eq!(
            bank.create(InstrumentKind::Sustaining, bogus),
            Err(SetupError::InvalidSignal(bogus))
        );
    }

    #[test]
    fn register_signal_emits_engine_command() {
        let mut bank = InstrumentBank::new();
        let (id, cmd) = bank.register_signal("brown_noise");
        assert_eq!(
            cmd,
            EngineCommand::RegisterSignal {
                id,
                name: "brown_noise".to_owned()
            }
        );
        assert_eq!(bank.signal_name(id), Some("brown_noise"));
    }

    #[test]
    fn retrigger_replaces_pitch_without_stacking() {
        let (mut bank, sig) = bank_with_signal();
        let inst = bank.create(InstrumentKind::Sustaining, sig).unwrap();

        assert!(bank.trigger(inst, 440.0, 0, secs(0.0)).is_some());
        assert!(bank.trigger(inst, 660.0, 0, secs(0.1)).is_some());

        let slot = bank.get(inst).unwrap().voices[0];
        assert!(slot.active);
        assert_eq!(slot.pitch, 660.0);

        // one release fully clears the slot: the retrigger never stacked
        assert!(bank.release(inst, 0).is_some());
        assert!(!bank.get(inst).unwrap().voices[0].active);
    }

    #[test]
    fn release_of_inactive_voice_is_noop() {
        let (mut bank, sig) = bank_with_signal();
        let inst = bank.create(InstrumentKind::Sustaining, sig).unwrap();
        assert_eq!(bank.release(inst, 3), None);
    }

    #[test]
    fn release_of_one_shot_is_noop_even_while_sounding() {
        let (mut bank, sig) = bank_with_signal();
        let inst = bank.create(InstrumentKind::OneShot, sig).unwrap();
        bank.trigger(inst, 220.0, 0, secs(0.0));
        assert!(bank.get(inst).unwrap().voices[0].active);
        assert_eq!(bank.release(inst, 0), None);
        // slot stays active until its hold elapses
        assert!(bank.get(inst).unwrap().voices[0].active);
    }

    #[test]
    fn one_shot_voice_decays_on_tick() {
        let (mut bank, sig) = bank_with_signal();
        let inst = bank.create(InstrumentKind::OneShot, sig).unwrap();
        bank.trigger(inst, 220.0, 2, secs(1.0));

        bank.tick(secs(1.1));
        assert!(bank.get(inst).unwrap().voices[2].active, "still within hold");

        bank.tick(secs(1.3));
        assert!(!bank.get(inst).unwrap().voices[2].active);
    }

    #[test]
    fn out_of_range_voice_is_silent_noop() {
        let (mut bank, sig) = bank_with_signal();
        let inst = bank.create(InstrumentKind::Sustaining, sig).unwrap();
        assert_eq!(bank.trigger(inst, 440.0, NUM_VOICES as u32, secs(0.0)), None);
        assert_eq!(bank.trigger(InstrumentId(99), 440.0, 0, secs(0.0)), None);
    }
}
