// Tempo-synced scheduler. The host loop owns real time and feeds elapsed
// durations into `tick`; everything in here runs on that logical clock.
//
// Periodic timers count beats, not wall time, so a tempo change simply
// changes how fast their accumulators fill from the next tick on. One-shot
// timeouts are plain deadlines on the logical clock and ignore tempo.

use std::time::Duration;

use crate::error::SetupError;
use crate::shared::{Command, TimerId};

const DEFAULT_BPM: f32 = 120.0;

// catch-up ceiling per periodic timer per tick; a degenerate interval must
// not turn one tick into millions of firings
const MAX_FIRINGS_PER_TICK: u64 = 32;

#[derive(Clone, Debug)]
enum Shape {
    EveryBeats { period: f32, accrued: f32 },
    After { deadline: Duration },
}

#[derive(Clone, Debug)]
struct Timer {
    id: TimerId,
    shape: Shape,
    cmd: Command,
    cancelled: bool,
}

pub struct Scheduler {
    bpm: f32,
    now: Duration,
    next_id: u64,
    // registration order; fire order within a tick is FIFO
    timers: Vec<Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            now: Duration::ZERO,
            next_id: 0,
            timers: Vec::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn tempo(&self) -> f32 {
        self.bpm
    }

    /// Change the beat duration for all future periodic accrual. Already
    /// scheduled timeouts keep their absolute deadlines; periodic
    /// accumulators carry over, so there is no phase jump.
    pub fn set_tempo(&mut self, bpm: f32) -> Result<(), SetupError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(SetupError::InvalidTempo(bpm));
        }
        self.bpm = bpm;
        Ok(())
    }

    /// Fire `cmd` every `beats` beats, first firing a full interval after
    /// registration.
    pub fn on_beat(&mut self, beats: f32, cmd: Command) -> Result<TimerId, SetupError> {
        if !beats.is_finite() || beats <= 0.0 {
            return Err(SetupError::InvalidInterval(beats));
        }
        Ok(self.push(
            Shape::EveryBeats {
                period: beats,
                accrued: 0.0,
            },
            cmd,
        ))
    }

    /// Fire `cmd` once, `secs` seconds from now. A zero delay fires on the
    /// next tick, never inside this call.
    pub fn on_timeout(&mut self, secs: f32, cmd: Command) -> Result<TimerId, SetupError> {
        // try_from catches finite values too large for a Duration, which
        // from_secs_f32 would panic on
        let delay = Duration::try_from_secs_f32(secs)
            .map_err(|_| SetupError::InvalidDelay(secs))?;
        let deadline = self
            .now
            .checked_add(delay)
            .ok_or(SetupError::InvalidDelay(secs))?;
        Ok(self.push(Shape::After { deadline }, cmd))
    }

    /// Cancel a timer. Idempotent for any id we ever issued (already fired
    /// or already cancelled is Ok); a never-issued id is a caller bug.
    pub fn cancel(&mut self, id: TimerId) -> Result<(), SetupError> {
        if id.0 >= self.next_id {
            return Err(SetupError::UnknownTimer(id));
        }
        if let Some(timer) = self.timers.iter_mut().find(|t| t.id == id) {
            timer.cancelled = true;
        }
        Ok(())
    }

    /// Advance the logical clock by `dt` and collect every due command, in
    /// registration order. The caller executes them after this returns, so
    /// a fired command can safely cancel timers — including its own.
    pub fn tick(&mut self, dt: Duration) -> Vec<Command> {
        self.now += dt;
        let beats = dt.as_secs_f32() * self.bpm / 60.0;

        let mut due = Vec::new();
        for timer in &mut self.timers {
            if timer.cancelled {
                continue;
            }
            match &mut timer.shape {
                Shape::EveryBeats { period, accrued } => {
                    *accrued += beats;
                    // catch up if a long tick spanned several periods,
                    // keeping the fractional remainder so we never drift
                    if *accrued >= *period {
                        let fires = (*accrued / *period) as u64;
                        *accrued = (*accrued - fires as f32 * *period).max(0.0);
                        let emit = fires.min(MAX_FIRINGS_PER_TICK);
                        if emit < fires {
                            log::warn!(
                                "timer {:?} fell {} firings behind in one tick, dropping the excess",
                                timer.id,
                                fires - emit
                            );
                        }
                        for _ in 0..emit {
                            due.push(timer.cmd.clone());
                        }
                    }
                }
                Shape::After { deadline } => {
                    if *deadline <= self.now {
                        due.push(timer.cmd.clone());
                        timer.cancelled = true; // consumed
                    }
                }
            }
        }
        self.timers.retain(|t| !t.cancelled);
        due
    }

    fn push(&mut self, shape: Shape, cmd: Command) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            shape,
            cmd,
            cancelled: false,
        });
        id
    }
}
