use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Key { key: KeyCode, mods: KeyModifiers },
    Resize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PondAction {
    Quit,
    TogglePause,
    ToggleHud,
    ToggleFilter,
    ToggleOverlay,
    ToggleHelp,
    Redraw,
}

pub fn collect_input_nonblocking(max_frame_time: Duration) -> anyhow::Result<Vec<InputEvent>> {
    let mut out = Vec::new();

    // poll with a tiny timeout so we stay responsive
    let timeout = std::cmp::min(Duration::from_millis(1), max_frame_time);
    while event::poll(timeout)? {
        match event::read()? {
            Event::Key(k) if k.kind == KeyEventKind::Press || k.kind == KeyEventKind::Repeat => {
                out.push(InputEvent::Key {
                    key: k.code,
                    mods: k.modifiers,
                });
            }
            Event::Resize(..) => out.push(InputEvent::Resize),
            _ => {}
        }
        if out.len() >= 32 {
            break;
        }
    }
    Ok(out)
}

pub fn map_event_to_action(ev: InputEvent) -> Option<PondAction> {
    let (key, mods) = match ev {
        InputEvent::Resize => return Some(PondAction::Redraw),
        InputEvent::Key { key, mods } => (key, mods),
    };

    if matches!(key, KeyCode::Char('c') | KeyCode::Char('C')) && mods.contains(KeyModifiers::CONTROL) {
        return Some(PondAction::Quit);
    }
    match key {
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(PondAction::Quit),
        KeyCode::Char('p') | KeyCode::Char('P') | KeyCode::Char(' ') => Some(PondAction::TogglePause),
        KeyCode::Char('h') | KeyCode::Char('H') => Some(PondAction::ToggleHud),
        KeyCode::Char('d') | KeyCode::Char('D') => Some(PondAction::ToggleFilter),
        KeyCode::Char('o') | KeyCode::Char('O') => Some(PondAction::ToggleOverlay),
        KeyCode::Char('?') => Some(PondAction::ToggleHelp),
        KeyCode::Char('r') | KeyCode::Char('R') => Some(PondAction::Redraw),
        _ => None,
    }
}
