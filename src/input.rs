use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::debug;

use crate::settings::Field;

/// A keystroke as the board understands it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Esc,
    Interrupt,
}

impl Key {
    /// Maps a raw byte from a cbreak/raw terminal.
    pub fn from_byte(byte: u8) -> Option<Key> {
        match byte {
            b'\n' | b'\r' => Some(Key::Enter),
            0x7f | 0x08 => Some(Key::Backspace),
            0x1b => Some(Key::Esc),
            0x03 => Some(Key::Interrupt),
            b if b.is_ascii_graphic() || b == b' ' => Some(Key::Char(b as char)),
            _ => None,
        }
    }

    pub fn from_event(event: &KeyEvent) -> Option<Key> {
        if event.kind == KeyEventKind::Release {
            return None;
        }
        if event.modifiers.contains(KeyModifiers::CONTROL) {
            return match event.code {
                KeyCode::Char('c') => Some(Key::Interrupt),
                _ => None,
            };
        }
        match event.code {
            KeyCode::Enter => Some(Key::Enter),
            KeyCode::Backspace => Some(Key::Backspace),
            KeyCode::Esc => Some(Key::Esc),
            KeyCode::Char(ch) if ch.is_ascii_control() => Key::from_byte(ch as u8),
            KeyCode::Char(ch) if !ch.is_control() => Some(Key::Char(ch)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum InputState {
    #[default]
    Idle,
    Editing { field: Field, buffer: String },
}

/// What the foreground loop has to do after a keystroke.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    ToggleHelp,
    SortAirlines,
    Commit { field: Field, value: String },
}

#[derive(Debug, Default)]
pub struct InputMachine {
    state: InputState,
}

impl InputMachine {
    pub fn state(&self) -> &InputState {
        &self.state
    }

    pub fn handle(&mut self, key: Key) -> Action {
        if key == Key::Interrupt {
            return Action::Quit;
        }
        match &mut self.state {
            InputState::Idle => self.handle_command(key),
            InputState::Editing { field, buffer } => match key {
                Key::Char(ch) => {
                    buffer.push(ch);
                    Action::None
                }
                Key::Backspace => {
                    buffer.pop();
                    Action::None
                }
                Key::Esc => {
                    debug!("edit {:?} cancelled", field);
                    self.state = InputState::Idle;
                    Action::None
                }
                Key::Enter => {
                    let field = *field;
                    let value = std::mem::take(buffer);
                    self.state = InputState::Idle;
                    Action::Commit { field, value }
                }
                Key::Interrupt => Action::Quit,
            },
        }
    }

    fn handle_command(&mut self, key: Key) -> Action {
        let Key::Char(ch) = key else {
            return Action::None;
        };
        match ch.to_ascii_lowercase() {
            'q' => Action::Quit,
            'h' => Action::ToggleHelp,
            's' => Action::SortAirlines,
            'i' => self.begin(Field::Interval),
            'n' => self.begin(Field::Rows),
            'u' => self.begin(Field::Url),
            _ => Action::None,
        }
    }

    fn begin(&mut self, field: Field) -> Action {
        debug!("edit {:?} started", field);
        self.state = InputState::Editing {
            field,
            buffer: String::new(),
        };
        Action::None
    }
}
