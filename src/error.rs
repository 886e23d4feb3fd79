use thiserror::Error;

use crate::shared::{InstrumentId, ModeId, SignalId, TimerId};

/// Errors from the setup/configuration surface. These fail synchronously
/// and leave the session untouched. Runtime dispatch problems (unbound
/// keys, releasing an idle voice) are not errors at all, just logged.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SetupError {
    #[error("unknown signal descriptor {0:?}")]
    InvalidSignal(SignalId),

    #[error("mode \"{0}\" already exists")]
    DuplicateMode(String),

    #[error("tempo must be a positive bpm, got {0}")]
    InvalidTempo(f32),

    #[error("beat interval must be positive, got {0}")]
    InvalidInterval(f32),

    #[error("timeout delay must be non-negative, got {0}")]
    InvalidDelay(f32),

    // cancelling an id that was never issued is a caller bug; cancelling
    // an already-fired or already-cancelled one is fine and returns Ok
    #[error("timer {0:?} was never issued")]
    UnknownTimer(TimerId),

    #[error("no such mode {0:?}")]
    UnknownMode(ModeId),

    #[error("no such instrument {0:?}")]
    UnknownInstrument(InstrumentId),

    #[error("voice index {0} out of range (instruments have {max} voices)", max = crate::shared::NUM_VOICES)]
    VoiceOutOfRange(u32),

    #[error("key \"{0}\" has no binding to attach an up-action to")]
    UnboundKey(String),
}
