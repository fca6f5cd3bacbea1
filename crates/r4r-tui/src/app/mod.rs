mod action;
mod state;

pub use action::Action;
pub use state::{AppState, FeedCounters, FilterCache, PAGE_LINES, Screen, UiState};
