// The boundary between the dispatch core and whatever audio engine is
// listening. Fire-and-forget: the core never waits on the engine.

use crate::shared::{InstrumentId, InstrumentKind, SignalId};

#[derive(Clone, Debug, PartialEq)]
pub struct TriggerParams {
    pub instrument: InstrumentId,
    pub kind: InstrumentKind,
    pub signal: SignalId,
    pub pitch: f32,
    pub voice: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineCommand {
    // The engine can't invent descriptors itself; the host allocates a
    // SignalId and tells the engine what algorithm it names, then later
    // triggers refer to it by id.
    RegisterSignal { id: SignalId, name: String },

    Trigger(TriggerParams),

    // Only ever sent for sustaining voices; one-shots decay on their own.
    Release { instrument: InstrumentId, voice: u32 },
}
