use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::HashMap;

use crate::app::Action;

/// A key plus the modifiers held with it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyBinding {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyBinding {
    pub const fn new(code: KeyCode) -> Self {
        Self::with(KeyModifiers::NONE, code)
    }

    pub const fn ctrl(code: KeyCode) -> Self {
        Self::with(KeyModifiers::CONTROL, code)
    }

    pub const fn shift(code: KeyCode) -> Self {
        Self::with(KeyModifiers::SHIFT, code)
    }

    const fn with(modifiers: KeyModifiers, code: KeyCode) -> Self {
        Self { code, modifiers }
    }

    pub fn from_event(event: &KeyEvent) -> Self {
        Self::with(event.modifiers, event.code)
    }
}

/// Which screen or input mode is receiving keys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyContext {
    Global,
    ListNavigation,
    LogViewer,
    FilterInput,
}

const fn key(c: char) -> KeyBinding {
    KeyBinding::new(KeyCode::Char(c))
}

const fn ctrl(c: char) -> KeyBinding {
    KeyBinding::ctrl(KeyCode::Char(c))
}

const fn shift(c: char) -> KeyBinding {
    KeyBinding::shift(KeyCode::Char(c))
}

fn global() -> Vec<(KeyBinding, Action)> {
    vec![
        (key('?'), Action::ToggleHelp),
        (KeyBinding::new(KeyCode::Esc), Action::GoBack),
        (key('q'), Action::Quit),
        (ctrl('c'), Action::Quit),
    ]
}

fn service_list() -> Vec<(KeyBinding, Action)> {
    vec![
        (key('j'), Action::ListDown),
        (KeyBinding::new(KeyCode::Down), Action::ListDown),
        (key('k'), Action::ListUp),
        (KeyBinding::new(KeyCode::Up), Action::ListUp),
        (KeyBinding::new(KeyCode::Enter), Action::ListSelect),
        (key('/'), Action::OpenSearch),
        (key('n'), Action::ClearFilter),
        (key('r'), Action::RefreshServices),
    ]
}

// less-like movement, then view toggles, then stream control
fn log_viewer() -> Vec<(KeyBinding, Action)> {
    vec![
        (key('j'), Action::ScrollDown(1)),
        (KeyBinding::new(KeyCode::Down), Action::ScrollDown(1)),
        (key('k'), Action::ScrollUp(1)),
        (KeyBinding::new(KeyCode::Up), Action::ScrollUp(1)),
        (ctrl('d'), Action::PageDown),
        (KeyBinding::new(KeyCode::PageDown), Action::PageDown),
        (ctrl('u'), Action::PageUp),
        (KeyBinding::new(KeyCode::PageUp), Action::PageUp),
        (key('g'), Action::ScrollToTop),
        (KeyBinding::new(KeyCode::Home), Action::ScrollToTop),
        (shift('G'), Action::ScrollToBottom),
        (KeyBinding::new(KeyCode::End), Action::ScrollToBottom),
        (key('f'), Action::ToggleAutoScroll),
        (key('t'), Action::ToggleTimestamps),
        (shift('T'), Action::ToggleLocalTime),
        (key('p'), Action::ToggleSources),
        (key('s'), Action::ToggleStats),
        (key('c'), Action::ClearLogs),
        (key('e'), Action::ExportLogs),
        (key('/'), Action::OpenSearch),
        (ctrl('f'), Action::OpenSearch),
        (key('n'), Action::ClearFilter),
        (key('l'), Action::CycleLevelFilter),
        (key('r'), Action::CycleTimeRange),
        (shift('R'), Action::CycleTimeRangeBack),
        (ctrl('r'), Action::Reconnect),
    ]
}

fn filter_input() -> Vec<(KeyBinding, Action)> {
    vec![
        (KeyBinding::new(KeyCode::Enter), Action::ApplyFilter),
        (KeyBinding::new(KeyCode::Esc), Action::CloseSearch),
        (ctrl('c'), Action::CloseSearch),
        (KeyBinding::new(KeyCode::Backspace), Action::SearchBackspace),
        (ctrl('u'), Action::SearchClear),
    ]
}

/// Key lookup keyed by (context, chord)
pub struct KeyBindings {
    bindings: HashMap<(KeyContext, KeyBinding), Action>,
}

impl KeyBindings {
    pub fn new() -> Self {
        let tables = [
            (KeyContext::Global, global()),
            (KeyContext::ListNavigation, service_list()),
            (KeyContext::LogViewer, log_viewer()),
            (KeyContext::FilterInput, filter_input()),
        ];
        let bindings = tables
            .into_iter()
            .flat_map(|(context, table)| {
                table
                    .into_iter()
                    .map(move |(binding, action)| ((context, binding), action))
            })
            .collect();
        Self { bindings }
    }

    fn lookup(&self, context: KeyContext, binding: KeyBinding) -> Option<Action> {
        self.bindings.get(&(context, binding)).cloned()
    }

    /// Context binding first, then the global one
    pub fn get_action(&self, context: KeyContext, key: &KeyEvent) -> Option<Action> {
        let binding = KeyBinding::from_event(key);
        self.lookup(context, binding)
            .or_else(|| self.lookup(KeyContext::Global, binding))
    }

    /// Keys while typing a search; unbound printable characters are input
    pub fn get_filter_input_action(&self, key: &KeyEvent) -> Option<Action> {
        if let Some(action) = self.lookup(KeyContext::FilterInput, KeyBinding::from_event(key)) {
            return Some(action);
        }
        let plain = key.modifiers.difference(KeyModifiers::SHIFT).is_empty();
        match key.code {
            KeyCode::Char(c) if plain => Some(Action::SearchInput(c)),
            _ => None,
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new()
    }
}
