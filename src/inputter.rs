use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};
use tracing::trace;

/// Single line text input used by the command line.
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    curser_pos: usize, // In characters, not bytes
    finished: bool,
    canceled: bool,
}

#[derive(Default, Clone, Debug)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub curser_pos: usize,
}

impl Inputter {
    pub fn read(&mut self, key: event::KeyEvent) -> InputResult {
        trace!("Input key {:?}", key.code);
        match (key.code, key.modifiers) {
            (KeyCode::Enter, _) => self.enter(),
            (KeyCode::Esc, _) => self.escape(),
            (KeyCode::Backspace, _) => self.backspace(),
            (KeyCode::Delete, _) => self.delete(),
            (KeyCode::Left, _) => self.left(),
            (KeyCode::Right, _) => self.right(),
            (KeyCode::Home, _) => self.home(),
            (KeyCode::End, _) => self.end(),
            (kc, km) => self.key(kc, km),
        }
    }

    pub fn set(&mut self, s: &str) {
        self.current_input = s.to_string();
        self.curser_pos = self.current_input.chars().count();
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            canceled: self.canceled,
            finished: self.finished,
            input: self.current_input.clone(),
            curser_pos: self.curser_pos,
        }
    }

    pub fn clear(&mut self) {
        self.canceled = false;
        self.finished = false;
        self.current_input.clear();
        self.curser_pos = 0;
    }

    fn enter(&mut self) -> InputResult {
        self.finished = true;
        self.get()
    }

    fn escape(&mut self) -> InputResult {
        self.clear();
        self.canceled = true;
        self.finished = true;
        self.get()
    }

    fn backspace(&mut self) -> InputResult {
        if self.curser_pos > 0 {
            self.curser_pos -= 1;
            let pos = self.getbytepos();
            self.current_input.remove(pos);
        }
        self.get()
    }

    fn delete(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            let pos = self.getbytepos();
            self.current_input.remove(pos);
        }
        self.get()
    }

    fn left(&mut self) -> InputResult {
        self.curser_pos = self.curser_pos.saturating_sub(1);
        self.get()
    }

    fn right(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            self.curser_pos += 1;
        }
        self.get()
    }

    fn home(&mut self) -> InputResult {
        self.curser_pos = 0;
        self.get()
    }

    fn end(&mut self) -> InputResult {
        self.curser_pos = self.current_input.chars().count();
        self.get()
    }

    fn key(&mut self, code: KeyCode, modifier: KeyModifiers) -> InputResult {
        if modifier.contains(KeyModifiers::CONTROL) {
            return self.get();
        }
        if let Some(chr) = code.as_char() {
            self.current_input.insert(self.getbytepos(), chr);
            self.curser_pos += 1;
        }
        self.get()
    }

    fn getbytepos(&self) -> usize {
        self.current_input
            .char_indices()
            .nth(self.curser_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn press(inputter: &mut Inputter, code: KeyCode) -> InputResult {
        inputter.read(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_str(inputter: &mut Inputter, s: &str) {
        for c in s.chars() {
            press(inputter, KeyCode::Char(c));
        }
    }

    #[test]
    fn typing_and_enter() {
        let mut input = Inputter::default();
        type_str(&mut input, "mästodon");
        let result = press(&mut input, KeyCode::Enter);
        assert!(result.finished);
        assert!(!result.canceled);
        assert_eq!(result.input, "mästodon");
        assert_eq!(result.curser_pos, 8);
    }

    #[test]
    fn editing_in_the_middle() {
        let mut input = Inputter::default();
        type_str(&mut input, "fedi");
        press(&mut input, KeyCode::Left);
        press(&mut input, KeyCode::Left);
        type_str(&mut input, "X");
        assert_eq!(input.get().input, "feXdi");
        press(&mut input, KeyCode::Backspace);
        assert_eq!(input.get().input, "fedi");
        press(&mut input, KeyCode::Delete);
        assert_eq!(input.get().input, "fei");
        press(&mut input, KeyCode::Home);
        press(&mut input, KeyCode::Backspace);
        assert_eq!(input.get().input, "fei");
        press(&mut input, KeyCode::End);
        press(&mut input, KeyCode::Right);
        assert_eq!(input.get().curser_pos, 3);
    }

    #[test]
    fn escape_cancels() {
        let mut input = Inputter::default();
        input.set("data/at.csv");
        assert_eq!(input.get().curser_pos, 11);
        let result = press(&mut input, KeyCode::Esc);
        assert!(result.finished);
        assert!(result.canceled);
        assert!(result.input.is_empty());
    }
}
