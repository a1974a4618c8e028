use std::time::Duration;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::trace;

use crate::domain::{Message, ViewerConfig, ViewerError};
use crate::model::Model;

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &ViewerConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    /// Waits up to the poll time for a terminal event and maps it to a message.
    /// Returning `None` still lets the model pick up finished fetches.
    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, ViewerError> {
        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        let message = match event::read()? {
            // Crossterm also emits key release and repeat events on Windows
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                if model.raw_keyevents() {
                    Some(Message::RawKey(key))
                } else {
                    Self::handle_key(key)
                }
            }
            Event::Resize(width, height) => Some(Message::Resize(width as usize, height as usize)),
            _ => None,
        };
        Ok(message)
    }

    fn handle_key(key: KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => Some(Message::MoveDown),
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => Some(Message::MoveUp),
            (KeyCode::Left, _) | (KeyCode::Char('h'), _) => Some(Message::MoveLeft),
            (KeyCode::Right, _) => Some(Message::MoveRight),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::Home, _) => Some(Message::MoveBeginning),
            (KeyCode::End, _) => Some(Message::MoveEnd),
            (KeyCode::Char('n'), _) => Some(Message::NextPage),
            (KeyCode::Char('p'), _) => Some(Message::PrevPage),
            (KeyCode::Char('g'), _) => Some(Message::FirstPage),
            (KeyCode::Char('G'), _) => Some(Message::LastPage),
            (KeyCode::Char('l'), _) => Some(Message::CycleRowLimit),
            (KeyCode::Char('/'), _) => Some(Message::Search),
            (KeyCode::Char(':'), _) => Some(Message::Open),
            (KeyCode::Char('r'), _) => Some(Message::Reload),
            (KeyCode::Char('w'), _) => Some(Message::Download),
            (KeyCode::Char('s'), _) => Some(Message::SortAscending),
            (KeyCode::Char('S'), _) => Some(Message::SortDescending),
            (KeyCode::Char('e'), _) => Some(Message::ToggleExpandColumn),
            (KeyCode::Char('c'), _) => Some(Message::CopyCell),
            (KeyCode::Char('C'), _) => Some(Message::CopyRow),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
