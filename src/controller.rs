use std::time::Instant;
use tracing::trace;

use crate::domain::{Message, TVError};
use crate::model::Model;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Default)]
pub struct Controller {}

impl Controller {
    pub fn new() -> Self {
        Self {}
    }

    /// Waits for the next terminal event. Returns `Tick` when nothing arrived
    /// before the model's next deadline.
    pub fn handle_event(&self, model: &Model) -> Result<Option<Message>, TVError> {
        if !event::poll(model.next_poll_timeout(Instant::now()))? {
            return Ok(Some(Message::Tick));
        }
        match event::read()? {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                if model.raw_keyevents() {
                    Ok(Some(Message::RawKey(key)))
                } else {
                    Ok(self.handle_key(key))
                }
            }
            Event::Resize(width, height) => {
                Ok(Some(Message::Resize(width as usize, height as usize)))
            }
            _ => Ok(None),
        }
    }

    fn handle_key(&self, key: KeyEvent) -> Option<Message> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => Some(Message::Quit),
                KeyCode::Char('d') => Some(Message::MovePageDown),
                KeyCode::Char('u') => Some(Message::MovePageUp),
                _ => None,
            };
        }
        let message = match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Message::MoveDown),
            KeyCode::Char('k') | KeyCode::Up => Some(Message::MoveUp),
            KeyCode::Char('h') | KeyCode::Left => Some(Message::MoveLeft),
            KeyCode::Char('l') | KeyCode::Right => Some(Message::MoveRight),
            KeyCode::PageDown => Some(Message::MovePageDown),
            KeyCode::PageUp => Some(Message::MovePageUp),
            KeyCode::Char('g') | KeyCode::Home => Some(Message::MoveBeginning),
            KeyCode::Char('G') | KeyCode::End => Some(Message::MoveEnd),
            KeyCode::Char('/') => Some(Message::Search),
            KeyCode::Char('s') => Some(Message::SortAscending),
            KeyCode::Char('S') => Some(Message::SortDescending),
            KeyCode::Char('c') => Some(Message::ClearSort),
            KeyCode::Char('o') => Some(Message::Open),
            KeyCode::Char('w') => Some(Message::SaveAs),
            KeyCode::Char('W') => Some(Message::SaveVisibleAs),
            KeyCode::Char('r') => Some(Message::ShowRecent),
            KeyCode::Char(' ') => Some(Message::ToggleCell),
            KeyCode::Char('y') => Some(Message::CopyCell),
            KeyCode::Char('?') => Some(Message::Help),
            KeyCode::Enter => Some(Message::Enter),
            KeyCode::Esc => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
