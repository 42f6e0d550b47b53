use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Complete,
    Skip,
    Swap,
    Finish,
    Quit,
    Continue,
}

/// Map a key press to a session action. Once the session is over only
/// quitting is meaningful.
pub fn handle_key(key: KeyEvent, finished: bool) -> KeyAction {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return KeyAction::Quit;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
        _ if finished => KeyAction::Continue,
        KeyCode::Char('d') | KeyCode::Enter => KeyAction::Complete,
        KeyCode::Char('s') => KeyAction::Skip,
        KeyCode::Char('w') => KeyAction::Swap,
        KeyCode::Char('f') => KeyAction::Finish,
        _ => KeyAction::Continue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn session_keys() {
        assert_eq!(handle_key(key(KeyCode::Char('d')), false), KeyAction::Complete);
        assert_eq!(handle_key(key(KeyCode::Enter), false), KeyAction::Complete);
        assert_eq!(handle_key(key(KeyCode::Char('s')), false), KeyAction::Skip);
        assert_eq!(handle_key(key(KeyCode::Char('w')), false), KeyAction::Swap);
        assert_eq!(handle_key(key(KeyCode::Char('f')), false), KeyAction::Finish);
        assert_eq!(handle_key(key(KeyCode::Char('x')), false), KeyAction::Continue);
    }

    #[test]
    fn quit_keys() {
        assert_eq!(handle_key(key(KeyCode::Char('q')), false), KeyAction::Quit);
        assert_eq!(handle_key(key(KeyCode::Esc), true), KeyAction::Quit);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(handle_key(ctrl_c, false), KeyAction::Quit);
    }

    #[test]
    fn finished_session_ignores_actions() {
        assert_eq!(handle_key(key(KeyCode::Char('d')), true), KeyAction::Continue);
        assert_eq!(handle_key(key(KeyCode::Char('w')), true), KeyAction::Continue);
    }
}
