// Terminal key source. Needs the keyboard enhancement flags main pushes,
// otherwise terminals only report presses and every binding would stick.

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};

#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    Key { key: String, down: bool },
    Quit,
}

/// Poll the terminal for up to `timeout` and translate whatever arrived.
/// Repeats are dropped; the session only wants edges.
pub fn poll_input(timeout: Duration) -> anyhow::Result<Vec<Input>> {
    if !event::poll(timeout)? {
        return Ok(vec![]);
    }

    if let Event::Key(key) = event::read()? {
        return Ok(translate(key).into_iter().collect());
    }
    Ok(vec![])
}

fn translate(key: event::KeyEvent) -> Option<Input> {
    let down = match key.kind {
        KeyEventKind::Press => true,
        KeyEventKind::Release => false,
        KeyEventKind::Repeat => return None,
    };
    if key.code == KeyCode::Esc {
        // quit on the press edge only; a stray release must not kill us
        return down.then_some(Input::Quit);
    }
    Some(Input::Key {
        key: key_token(key.code)?,
        down,
    })
}

// lowercase so shift doesn't make press and release disagree
fn key_token(code: KeyCode) -> Option<String> {
    let token = match code {
        KeyCode::Char(' ') => "space".to_owned(),
        KeyCode::Char(c) => c.to_ascii_lowercase().to_string(),
        KeyCode::Enter => "enter".to_owned(),
        KeyCode::Tab => "tab".to_owned(),
        KeyCode::Backspace => "backspace".to_owned(),
        KeyCode::Left => "left".to_owned(),
        KeyCode::Right => "right".to_owned(),
        KeyCode::Up => "up".to_owned(),
        KeyCode::Down => "down".to_owned(),
        _ => return None,
    };
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifted_chars_map_to_the_same_token() {
        assert_eq!(key_token(KeyCode::Char('A')), Some("a".to_owned()));
        assert_eq!(key_token(KeyCode::Char('a')), Some("a".to_owned()));
    }

    #[test]
    fn named_keys_get_word_tokens() {
        assert_eq!(key_token(KeyCode::Char(' ')), Some("space".to_owned()));
        assert_eq!(key_token(KeyCode::Enter), Some("enter".to_owned()));
        assert_eq!(key_token(KeyCode::Home), None);
    }

    #[test]
    fn escape_quits_on_press_only() {
        use crossterm::event::{KeyEvent, KeyModifiers};

        let press = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(translate(press), Some(Input::Quit));

        let release =
            KeyEvent::new_with_kind(KeyCode::Esc, KeyModifiers::NONE, KeyEventKind::Release);
        assert_eq!(translate(release), None);
    }

    #[test]
    fn press_and_release_become_edges_and_repeats_drop() {
        use crossterm::event::{KeyEvent, KeyModifiers};

        let press = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(
            translate(press),
            Some(Input::Key {
                key: "a".to_owned(),
                down: true
            })
        );

        let release =
            KeyEvent::new_with_kind(KeyCode::Char('a'), KeyModifiers::NONE, KeyEventKind::Release);
        assert_eq!(
            translate(release),
            Some(Input::Key {
                key: "a".to_owned(),
                down: false
            })
        );

        let repeat =
            KeyEvent::new_with_kind(KeyCode::Char('a'), KeyModifiers::NONE, KeyEventKind::Repeat);
        assert_eq!(translate(repeat), None);
    }
}
