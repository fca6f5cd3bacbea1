//! TUI components for r4r
//!
//! This crate provides the terminal log viewer: state management,
//! keybindings, event handling, and the screens that render a log buffer.

pub mod app;
pub mod config;
pub mod tui;
pub mod ui;

pub use app::{Action, AppState, FeedCounters, PAGE_LINES, Screen, UiState};
pub use config::{KeyBinding, KeyBindings, KeyContext};
pub use tui::{Event, EventHandler, Tui};
pub use ui::components::{HelpOverlay, ServiceList, StatusBar};
pub use ui::screens::{LogViewerScreen, ServiceSelectScreen};
pub use ui::{Layout, Theme};
