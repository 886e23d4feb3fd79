// Patch files: a JSON description of signals, instruments, modes and
// timers, applied onto a fresh session at startup. This is the loadable
// stand-in for a scripting front-end; inside the session everything it
// declares is the same Action/Command surface key events use.
//
// Declarations reference things by name (signals, modes) or declaration
// index (instruments), resolved while applying.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::engine_api::EngineCommand;
use crate::keymap::Action;
use crate::session::Session;
use crate::shared::{Command, InstrumentId, InstrumentKind, ModeId};

#[derive(Clone, Debug, Deserialize)]
pub struct Patch {
    #[serde(default)]
    pub tempo: Option<f32>,
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub instruments: Vec<InstrumentDecl>,
    #[serde(default)]
    pub modes: Vec<ModeDecl>,
    #[serde(default)]
    pub start_mode: Option<String>,
    #[serde(default)]
    pub timers: Vec<TimerDecl>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InstrumentDecl {
    pub kind: InstrumentKind,
    pub signal: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ModeDecl {
    pub name: String,
    #[serde(default)]
    pub default_action: Option<ActionDecl>,
    #[serde(default)]
    pub default_target: Option<String>,
    #[serde(default)]
    pub binds: Vec<BindDecl>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BindDecl {
    pub key: String,
    pub action: ActionDecl,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub up: Option<ActionDecl>,
}

// instrument fields are declaration indices into `instruments`
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "do", rename_all = "snake_case")]
pub enum ActionDecl {
    Button {
        instrument: usize,
        pitch: f32,
        voice: u32,
    },
    Play {
        instrument: usize,
        pitch: f32,
        voice: u32,
    },
    Mute {
        instrument: usize,
        voice: u32,
    },
    SetTempo {
        bpm: f32,
    },
    SwitchMode {
        mode: String,
    },
    Seq {
        of: Vec<ActionDecl>,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerDecl {
    EveryBeats { beats: f32, run: ActionDecl },
    AfterSecs { secs: f32, run: ActionDecl },
}

pub fn load(path: &Path) -> anyhow::Result<Patch> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading patch file {}", path.display()))?;
    parse(&data).with_context(|| format!("parsing patch file {}", path.display()))
}

pub fn parse(json: &str) -> anyhow::Result<Patch> {
    Ok(serde_json::from_str(json)?)
}

/// Set up a session from a patch. Returns the engine commands produced
/// along the way (signal registrations) for the caller to forward.
pub fn apply(patch: &Patch, session: &mut Session) -> anyhow::Result<Vec<EngineCommand>> {
    let mut out = Vec::new();

    let mut signals = HashMap::new();
    for name in &patch.signals {
        let (id, cmd) = session.register_signal(name);
        out.push(cmd);
        signals.insert(name.clone(), id);
    }

    let mut instruments = Vec::new();
    for decl in &patch.instruments {
        let signal = *signals
            .get(&decl.signal)
            .with_context(|| format!("instrument references undeclared signal \"{}\"", decl.signal))?;
        instruments.push(session.create_instrument(decl.kind, signal)?);
    }

    // modes first, bindings second, so chains and default targets may
    // point at modes declared later in the file
    for decl in &patch.modes {
        session.create_mode(&decl.name, None, None)?;
    }
    let resolve_mode = |session: &Session, name: &str| -> anyhow::Result<ModeId> {
        session
            .modes
            .find(name)
            .with_context(|| format!("no mode named \"{name}\""))
    };

    for decl in &patch.modes {
        let mode = resolve_mode(session, &decl.name)?;
        for bind in &decl.binds {
            let action = resolve_action(&bind.action, &instruments, session)?;
            let chain = match &bind.chain {
                Some(name) => Some(resolve_mode(session, name)?),
                None => None,
            };
            session.bind(mode, &bind.key, action, chain)?;
            if let Some(up) = &bind.up {
                let up = resolve_action(up, &instruments, session)?;
                session.bind_up(mode, &bind.key, up)?;
            }
        }
        if decl.default_action.is_some() || decl.default_target.is_some() {
            let default_action = match &decl.default_action {
                Some(a) => Some(resolve_action(a, &instruments, session)?),
                None => None,
            };
            let default_target = match &decl.default_target {
                Some(name) => Some(resolve_mode(session, name)?),
                None => None,
            };
            session.set_mode_default(mode, default_target, default_action)?;
        }
    }

    for decl in &patch.timers {
        match decl {
            TimerDecl::EveryBeats { beats, run } => {
                let cmd = resolve_command(run, &instruments, session)?;
                session.on_beat(*beats, cmd)?;
            }
            TimerDecl::AfterSecs { secs, run } => {
                let cmd = resolve_command(run, &instruments, session)?;
                session.on_timeout(*secs, cmd)?;
            }
        }
    }

    if let Some(bpm) = patch.tempo {
        session.set_tempo(bpm)?;
    }
    if let Some(name) = &patch.start_mode {
        let mode = resolve_mode(session, name)?;
        session.activate(mode)?;
    }

    Ok(out)
}

fn resolve_instrument(index: usize, ids: &[InstrumentId]) -> anyhow::Result<InstrumentId> {
    ids.get(index)
        .copied()
        .with_context(|| format!("instrument index {index} out of range"))
}

fn resolve_action(
    decl: &ActionDecl,
    instruments: &[InstrumentId],
    session: &Session,
) -> anyhow::Result<Action> {
    Ok(match decl {
        ActionDecl::Button {
            instrument,
            pitch,
            voice,
        } => Action::Button {
            instrument: resolve_instrument(*instrument, instruments)?,
            pitch: *pitch,
            voice: *voice,
        },
        _ => Action::Command(resolve_command(decl, instruments, session)?),
    })
}

fn resolve_command(
    decl: &ActionDecl,
    instruments: &[InstrumentId],
    session: &Session,
) -> anyhow::Result<Command> {
    Ok(match decl {
        // a Button in command position is just an immediate play
        ActionDecl::Button {
            instrument,
            pitch,
            voice,
        }
        | ActionDecl::Play {
            instrument,
            pitch,
            voice,
        } => Command::Play {
            instrument: resolve_instrument(*instrument, instruments)?,
            pitch: *pitch,
            voice: *voice,
        },
        ActionDecl::Mute { instrument, voice } => Command::Mute {
            instrument: resolve_instrument(*instrument, instruments)?,
            voice: *voice,
        },
        ActionDecl::SetTempo { bpm } => Command::SetTempo(*bpm),
        ActionDecl::SwitchMode { mode } => Command::SwitchMode(
            session
                .modes
                .find(mode)
                .with_context(|| format!("no mode named \"{mode}\""))?,
        ),
        ActionDecl::Seq { of } => Command::Seq(
            of.iter()
                .map(|d| resolve_command(d, instruments, session))
                .collect::<anyhow::Result<_>>()?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::KeyEvent;
    use std::time::Duration;

    const DEMO: &str = r#"{
        "tempo": 100.0,
        "signals": ["sine", "brown_noise"],
        "instruments": [
            { "kind": "Sustaining", "signal": "sine" },
            { "kind": "OneShot", "signal": "brown_noise" }
        ],
        "modes": [
            {
                "name": "Keys",
                "binds": [
                    { "key": "a", "action": { "do": "button", "instrument": 0, "pitch": 440.0, "voice": 0 } },
                    { "key": "s", "action": { "do": "button", "instrument": 0, "pitch": 494.0, "voice": 1 } },
                    { "key": "d", "action": { "do": "button", "instrument": 1, "pitch": 1.0, "voice": 0 } },
                    { "key": "p", "action": { "do": "switch_mode", "mode": "Perc" } }
                ]
            },
            {
                "name": "Perc",
                "default_target": "Keys",
                "default_action": { "do": "button", "instrument": 1, "pitch": 1.0, "voice": 1 },
                "binds": []
            }
        ],
        "start_mode": "Keys",
        "timers": [
            { "every_beats": { "beats": 4.0, "run": { "do": "play", "instrument": 1, "pitch": 1.0, "voice": 2 } } },
            { "after_secs": { "secs": 0.5, "run": { "do": "set_tempo", "bpm": 140.0 } } }
        ]
    }"#;

    #[test]
    fn demo_patch_parses_and_applies() {
        let patch = parse(DEMO).unwrap();
        let mut session = Session::new();
        let cmds = apply(&patch, &mut session).unwrap();

        // one registration per declared signal
        assert_eq!(cmds.len(), 2);
        assert_eq!(session.tempo(), 100.0);
        assert_eq!(session.modes.mode(session.modes.active()).unwrap().name, "Keys");

        // the bound key plays instrument 0 voice 0
        let out = session.handle_key(KeyEvent {
            key: "a".to_owned(),
            down: true,
            at: Duration::ZERO,
        });
        assert_eq!(out.len(), 1);

        // the after_secs timer retunes the session
        session.tick(Duration::from_millis(600));
        assert_eq!(session.tempo(), 140.0);
    }

    #[test]
    fn default_action_and_target_come_through() {
        let patch = parse(DEMO).unwrap();
        let mut session = Session::new();
        apply(&patch, &mut session).unwrap();

        // hop into Perc via the bound switch
        session.handle_key(KeyEvent {
            key: "p".to_owned(),
            down: true,
            at: Duration::ZERO,
        });
        assert_eq!(session.modes.mode(session.modes.active()).unwrap().name, "Perc");

        // any unbound key hits the default button and chains back to Keys
        let out = session.handle_key(KeyEvent {
            key: "x".to_owned(),
            down: true,
            at: Duration::ZERO,
        });
        assert_eq!(out.len(), 1);
        assert_eq!(session.modes.mode(session.modes.active()).unwrap().name, "Keys");
    }

    #[test]
    fn undeclared_signal_reference_fails() {
        let patch = parse(
            r#"{
                "signals": ["sine"],
                "instruments": [{ "kind": "Sustaining", "signal": "saw" }]
            }"#,
        )
        .unwrap();
        let mut session = Session::new();
        assert!(apply(&patch, &mut session).is_err());
    }

    #[test]
    fn duplicate_mode_in_patch_fails() {
        let patch = parse(
            r#"{ "modes": [ { "name": "Normal" } ] }"#,
        )
        .unwrap();
        let mut session = Session::new();
        let err = apply(&patch, &mut session).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn bad_instrument_index_fails() {
        let patch = parse(
            r#"{
                "signals": ["sine"],
                "instruments": [{ "kind": "Sustaining", "signal": "sine" }],
                "modes": [{
                    "name": "Keys",
                    "binds": [{ "key": "a", "action": { "do": "button", "instrument": 3, "pitch": 440.0, "voice": 0 } }]
                }]
            }"#,
        )
        .unwrap();
        let mut session = Session::new();
        assert!(apply(&patch, &mut session).is_err());
    }
}
