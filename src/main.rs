mod audio;
mod clock;
mod engine_api;
mod error;
mod input;
mod instrument;
mod keymap;
mod patch;
mod session;
mod shared;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::terminal;

use input::Input;
use session::Session;
use shared::KeyEvent;

// played when no patch file is given: a sine keyboard on the home row,
// a noise one-shot on space, and a four-beat noise tick
const DEMO_PATCH: &str = r#"{
    "tempo": 120.0,
    "signals": ["sine", "brown_noise"],
    "instruments": [
        { "kind": "Sustaining", "signal": "sine" },
        { "kind": "OneShot", "signal": "brown_noise" }
    ],
    "modes": [
        {
            "name": "Keys",
            "binds": [
                { "key": "a", "action": { "do": "button", "instrument": 0, "pitch": 261.63, "voice": 0 } },
                { "key": "s", "action": { "do": "button", "instrument": 0, "pitch": 293.66, "voice": 1 } },
                { "key": "d", "action": { "do": "button", "instrument": 0, "pitch": 329.63, "voice": 2 } },
                { "key": "f", "action": { "do": "button", "instrument": 0, "pitch": 349.23, "voice": 3 } },
                { "key": "g", "action": { "do": "button", "instrument": 0, "pitch": 392.00, "voice": 4 } },
                { "key": "h", "action": { "do": "button", "instrument": 0, "pitch": 440.00, "voice": 5 } },
                { "key": "j", "action": { "do": "button", "instrument": 0, "pitch": 493.88, "voice": 6 } },
                { "key": "k", "action": { "do": "button", "instrument": 0, "pitch": 523.25, "voice": 7 } },
                { "key": "space", "action": { "do": "button", "instrument": 1, "pitch": 1.0, "voice": 0 } },
                { "key": "1", "action": { "do": "set_tempo", "bpm": 90.0 } },
                { "key": "2", "action": { "do": "set_tempo", "bpm": 120.0 } },
                { "key": "3", "action": { "do": "set_tempo", "bpm": 160.0 } }
            ]
        }
    ],
    "start_mode": "Keys",
    "timers": [
        { "every_beats": { "beats": 4.0, "run": { "do": "play", "instrument": 1, "pitch": 1.0, "voice": 1 } } }
    ]
}"#;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .init()?;

    let loaded = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => patch::load(&path)?,
        None => patch::parse(DEMO_PATCH)?,
    };

    let audio = audio::start_audio()?;
    let mut session = Session::new();
    for cmd in patch::apply(&loaded, &mut session)? {
        audio.send(cmd);
    }

    terminal::enable_raw_mode()?;
    // Ask the terminal for real press/release events; without this we'd
    // only ever see presses and sustaining notes would never release.
    // Falls back gracefully if the terminal doesn't support it.
    let _ = crossterm::execute!(
        std::io::stdout(),
        crossterm::event::PushKeyboardEnhancementFlags(
            crossterm::event::KeyboardEnhancementFlags::REPORT_EVENT_TYPES
        )
    );
    let _guard = RawModeGuard; // auto drops when out of scope

    let tick_rate = Duration::from_millis(4); // control-rate, not audio-rate
    let start = Instant::now();
    let mut last_tick = Instant::now();

    loop {
        for event in input::poll_input(tick_rate)? {
            match event {
                Input::Quit => return Ok(()),
                Input::Key { key, down } => {
                    let cmds = session.handle_key(KeyEvent {
                        key,
                        down,
                        at: start.elapsed(),
                    });
                    for cmd in cmds {
                        audio.send(cmd);
                    }
                }
            }
        }

        let elapsed = last_tick.elapsed();
        last_tick = Instant::now();
        for cmd in session.tick(elapsed) {
            audio.send(cmd);
        }
    }
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(
            std::io::stdout(),
            crossterm::event::PopKeyboardEnhancementFlags
        );
        let _ = terminal::disable_raw_mode();
    }
}
