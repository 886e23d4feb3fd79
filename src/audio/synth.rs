// The demo engine behind the EngineCommand boundary: a fixed pool of
// simple synth voices. Sustaining voices hold their level until released;
// one-shot voices decay on their own like a struck drum.

use std::collections::HashMap;

use crate::engine_api::{EngineCommand, TriggerParams};
use crate::shared::{InstrumentId, InstrumentKind, SignalId};

const MAX_VOICES: usize = 64; // hard cap so we won't malloc in the audio callback

const SUSTAIN_AMP: f32 = 0.2;
const ONE_SHOT_DECAY: f32 = 0.9995;
const RELEASE_DECAY: f32 = 0.995;
const KILL_AMP: f32 = 0.0005;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SignalKind {
    Sine,
    BrownNoise,
}

#[derive(Clone, Copy, Debug)]
struct SynthVoice {
    instrument: InstrumentId,
    voice: u32,
    kind: InstrumentKind,
    signal: SignalKind,
    phase: f32,
    phase_inc: f32,
    brown: f32, // integrator state for noise
    amp: f32,
    held: bool, // sustaining and not yet released
    alive: bool,
}

impl SynthVoice {
    fn silent() -> Self {
        Self {
            instrument: InstrumentId(0),
            voice: 0,
            kind: InstrumentKind::OneShot,
            signal: SignalKind::Sine,
            phase: 0.0,
            phase_inc: 0.0,
            brown: 0.0,
            amp: 0.0,
            held: false,
            alive: false,
        }
    }
}

pub struct Engine {
    sample_rate: f32,
    voices: [SynthVoice; MAX_VOICES], // fixed pool
    signals: HashMap<SignalId, SignalKind>,
}

impl Engine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            voices: [SynthVoice::silent(); MAX_VOICES],
            signals: HashMap::new(),
        }
    }

    pub fn handle_cmd(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::RegisterSignal { id, name } => {
                let kind = match name.as_str() {
                    "sine" => SignalKind::Sine,
                    "brown_noise" => SignalKind::BrownNoise,
                    other => {
                        log::warn!("unknown signal \"{other}\", substituting sine");
                        SignalKind::Sine
                    }
                };
                self.signals.insert(id, kind);
            }
            EngineCommand::Trigger(t) => self.trigger(t),
            EngineCommand::Release { instrument, voice } => self.release(instrument, voice),
        }
    }

    fn trigger(&mut self, t: TriggerParams) {
        let signal = self
            .signals
            .get(&t.signal)
            .copied()
            .unwrap_or(SignalKind::Sine);
        let phase_inc = std::f32::consts::TAU * t.pitch / self.sample_rate;

        // retrigger of a live sustaining voice: retune in place, keeping
        // the phase so there's no click or gap
        if let Some(v) = self
            .voices
            .iter_mut()
            .find(|v| v.alive && v.instrument == t.instrument && v.voice == t.voice)
        {
            v.phase_inc = phase_inc;
            v.kind = t.kind;
            v.signal = signal;
            v.amp = SUSTAIN_AMP;
            v.held = t.kind == InstrumentKind::Sustaining;
            return;
        }

        // otherwise grab a free slot, stealing slot 0 if the pool is full
        let slot = self.voices.iter().position(|v| !v.alive).unwrap_or(0);
        self.voices[slot] = SynthVoice {
            instrument: t.instrument,
            voice: t.voice,
            kind: t.kind,
            signal,
            phase: 0.0,
            phase_inc,
            brown: 0.0,
            amp: SUSTAIN_AMP,
            held: t.kind == InstrumentKind::Sustaining,
            alive: true,
        };
    }

    fn release(&mut self, instrument: InstrumentId, voice: u32) {
        for v in &mut self.voices {
            if v.alive && v.instrument == instrument && v.voice == voice {
                v.held = false;
            }
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        let mut out = 0.0f32;
        for v in &mut self.voices {
            if !v.alive {
                continue;
            }
            match v.signal {
                SignalKind::Sine => {
                    out += v.amp * v.phase.sin();
                    v.phase += v.phase_inc;
                    if v.phase > std::f32::consts::TAU {
                        v.phase -= std::f32::consts::TAU;
                    }
                }
                SignalKind::BrownNoise => {
                    // leaky integration of white noise
                    let white = fastrand::f32() * 2.0 - 1.0;
                    v.brown = (v.brown + 0.02 * white).clamp(-1.0, 1.0) * 0.998;
                    out += v.amp * v.brown * 3.0;
                }
            }
            if !v.held {
                // one-shots ring out slowly, released sustains cut fast
                v.amp *= match v.kind {
                    InstrumentKind::OneShot => ONE_SHOT_DECAY,
                    InstrumentKind::Sustaining => RELEASE_DECAY,
                };
                if v.amp < KILL_AMP {
                    v.alive = false;
                }
            }
        }
        out
    }
}
