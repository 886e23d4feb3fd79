// Core types shared across the whole crate.
//
// The flow, for whoever reads this first:
//   - key events come in from the input layer as KeyEvent
//   - the active mode resolves them to Actions (see keymap.rs)
//   - actions and timer payloads are Commands, executed by the session
//   - executing commands produces EngineCommands for the audio side

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Voice table size per instrument. Fixed so arbitrary voice indices
/// can't grow anything.
pub const NUM_VOICES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstrumentId(pub u32);

// host-allocated; the engine learns about these via RegisterSignal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SignalId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentKind {
    /// Sounds until the voice is explicitly released.
    Sustaining,
    /// Plays a fixed burst and dies on its own; release is a no-op.
    OneShot,
}

/// One key press or release, as handed to the session by the input
/// collaborator. `at` is the host's monotonic clock at arrival; the core
/// only logs it, ordering comes from the event stream itself.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyEvent {
    pub key: String,
    pub down: bool,
    pub at: Duration,
}

/// The in-process command surface. Key bindings, timer payloads, and the
/// patch file all bottom out in these; the session executes them on the
/// single control path.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Play {
        instrument: InstrumentId,
        pitch: f32,
        voice: u32,
    },
    // alias of release, for scripted stops independent of key-ups
    Mute {
        instrument: InstrumentId,
        voice: u32,
    },
    SetTempo(f32),
    SwitchMode(ModeId),
    CancelTimer(TimerId),
    Seq(Vec<Command>),
}
