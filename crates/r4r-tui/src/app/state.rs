use ratatui::widgets::ListState;
use tokio::sync::mpsc;

use r4r_logs::{BufferedRecord, Diagnostic, LogBuffer, StreamFilter};
use r4r_types::{LogLevel, Service, TimeRange};

use super::Action;

/// Lines moved by PageUp / PageDown
pub const PAGE_LINES: usize = 20;

/// Cache for filtered log results to avoid re-filtering on every render
#[derive(Default)]
pub struct FilterCache {
    cached_filter: StreamFilter,
    /// Id of the newest buffered record when the cache was built
    cached_last_id: Option<u64>,
    cached_len: usize,
    pub cached_entries: Vec<BufferedRecord>,
    pub is_valid: bool,
}

impl FilterCache {
    pub fn needs_refresh(&self, filter: &StreamFilter, buffer: &LogBuffer) -> bool {
        if !self.is_valid {
            return true;
        }
        if self.cached_len != buffer.len() {
            return true;
        }
        if self.cached_last_id != buffer.tail(1).first().map(|b| b.id) {
            return true;
        }
        self.cached_filter != *filter
    }

    /// Recompute the cached entries if anything changed
    pub fn refresh(&mut self, filter: &StreamFilter, buffer: &LogBuffer) {
        if !self.needs_refresh(filter, buffer) {
            return;
        }
        self.cached_entries = buffer.matching(filter);
        self.cached_filter = filter.clone();
        self.cached_len = buffer.len();
        self.cached_last_id = buffer.tail(1).first().map(|b| b.id);
        self.is_valid = true;
    }

    pub fn invalidate(&mut self) {
        self.is_valid = false;
    }
}

/// Screen enumeration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    ServiceSelect,
    LogViewer,
}

/// Counters copied from the active subscription for display
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedCounters {
    pub seen: u64,
    pub emitted: u64,
    pub decode_failures: u64,
}

/// UI-specific transient state
pub struct UiState {
    /// Is the search bar taking input?
    pub search_active: bool,

    /// Current search input text
    pub search_input: String,

    pub help_visible: bool,

    /// List state for the service list
    pub list_state: ListState,

    /// Name filter applied to the service list
    pub service_query: String,

    /// Message to display (errors and notices)
    pub error_message: Option<String>,

    // Log viewer specific state
    pub log_scroll: usize,

    /// Follow mode
    pub auto_scroll: bool,

    pub show_timestamps: bool,

    pub use_local_time: bool,

    /// Show the record source column
    pub show_sources: bool,

    pub stats_visible: bool,

    /// Level filter (None = all levels)
    pub level_filter: Option<LogLevel>,

    /// Applied message search (None = no search)
    pub active_search: Option<String>,

    /// History window replayed when a stream opens
    pub time_range: TimeRange,

    pub filter_cache: FilterCache,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            search_active: false,
            search_input: String::new(),
            help_visible: false,
            list_state: ListState::default(),
            service_query: String::new(),
            error_message: None,
            log_scroll: 0,
            auto_scroll: true,
            show_timestamps: true,
            use_local_time: true,
            show_sources: true,
            stats_visible: false,
            level_filter: None,
            active_search: None,
            time_range: TimeRange::default(),
            filter_cache: FilterCache::default(),
        }
    }
}

impl UiState {
    /// The filter the log viewer currently applies
    pub fn stream_filter(&self) -> StreamFilter {
        StreamFilter::new()
            .with_level(self.level_filter.clone())
            .with_search(self.active_search.as_deref())
    }
}

/// Global application state
pub struct AppState {
    pub current_screen: Screen,

    /// Navigation stack for back navigation
    pub screen_stack: Vec<Screen>,

    /// Services available to the account
    pub services: Vec<Service>,

    /// Service whose logs are shown, if any
    pub selected_service: Option<Service>,

    /// Resource ids the viewer is subscribed to
    pub resource_ids: Vec<String>,

    pub ui_state: UiState,

    /// Latest stream diagnostic, shown in the header
    pub stream_status: Option<Diagnostic>,

    /// Subscription state label ("following", "stopped", ...)
    pub stream_state: &'static str,

    pub counters: FeedCounters,

    pub should_quit: bool,

    /// Channel sender for async actions
    pub action_tx: mpsc::UnboundedSender<Action>,
}

impl AppState {
    pub fn new(action_tx: mpsc::UnboundedSender<Action>) -> Self {
        let mut ui_state = UiState::default();
        ui_state.list_state.select(Some(0));

        Self {
            current_screen: Screen::ServiceSelect,
            screen_stack: Vec::new(),
            services: Vec::new(),
            selected_service: None,
            resource_ids: Vec::new(),
            ui_state,
            stream_status: None,
            stream_state: "idle",
            counters: FeedCounters::default(),
            should_quit: false,
            action_tx,
        }
    }

    /// Navigate to a new screen, pushing current to stack
    pub fn navigate_to(&mut self, screen: Screen) {
        self.screen_stack.push(self.current_screen.clone());
        self.current_screen = screen;
        self.ui_state.list_state.select(Some(0));
    }

    /// Go back to previous screen
    pub fn go_back(&mut self) -> bool {
        if let Some(prev_screen) = self.screen_stack.pop() {
            self.current_screen = prev_screen;
            self.ui_state.list_state.select(Some(0));
            true
        } else {
            false
        }
    }

    /// Services matching the list query, in display order
    pub fn visible_services(&self) -> Vec<&Service> {
        let query = self.ui_state.service_query.to_lowercase();
        self.services
            .iter()
            .filter(|s| {
                query.is_empty()
                    || s.name.to_lowercase().contains(&query)
                    || s.id.to_lowercase().contains(&query)
            })
            .collect()
    }

    pub fn current_list_len(&self) -> usize {
        match self.current_screen {
            Screen::ServiceSelect => self.visible_services().len(),
            Screen::LogViewer => 0,
        }
    }

    /// Move selection up, wrapping at the top
    pub fn list_up(&mut self) {
        let len = self.current_list_len();
        if len == 0 {
            return;
        }

        let i = match self.ui_state.list_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.ui_state.list_state.select(Some(i));
    }

    /// Move selection down, wrapping at the bottom
    pub fn list_down(&mut self) {
        let len = self.current_list_len();
        if len == 0 {
            return;
        }

        let i = match self.ui_state.list_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.ui_state.list_state.select(Some(i));
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.ui_state.list_state.selected()
    }

    /// Service under the cursor on the service list
    pub fn selected_list_service(&self) -> Option<&Service> {
        let idx = self.selected_index()?;
        self.visible_services().get(idx).copied()
    }

    /// Scroll back through history; leaves follow mode
    pub fn scroll_up(&mut self, lines: usize) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_sub(lines);
    }

    /// Scroll forward; the renderer clamps to the filtered count
    pub fn scroll_down(&mut self, lines: usize) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_add(lines);
    }

    pub fn scroll_to_top(&mut self) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = usize::MAX;
    }

    pub fn show_error(&mut self, msg: String) {
        self.ui_state.error_message = Some(msg);
    }

    pub fn dismiss_error(&mut self) {
        self.ui_state.error_message = None;
    }

    /// Start search input mode, seeded with the current term
    pub fn start_search(&mut self) {
        self.ui_state.search_active = true;
        self.ui_state.search_input = match self.current_screen {
            Screen::ServiceSelect => self.ui_state.service_query.clone(),
            Screen::LogViewer => self.ui_state.active_search.clone().unwrap_or_default(),
        };
    }

    /// Leave search input mode without changing the applied term
    pub fn cancel_search(&mut self) {
        self.ui_state.search_active = false;
        self.ui_state.search_input.clear();
    }

    /// Apply the search input to the current screen
    pub fn apply_filter(&mut self) {
        self.ui_state.search_active = false;
        let term = self.ui_state.search_input.trim().to_string();

        match self.current_screen {
            Screen::ServiceSelect => {
                self.ui_state.service_query = term;
                self.ui_state.list_state.select(Some(0));
            }
            Screen::LogViewer => {
                self.ui_state.active_search = (!term.is_empty()).then_some(term);
                self.ui_state.log_scroll = 0;
                self.ui_state.filter_cache.invalidate();
            }
        }
    }

    /// Clear the applied search for the current screen
    pub fn clear_filter(&mut self) {
        self.ui_state.search_input.clear();
        match self.current_screen {
            Screen::ServiceSelect => self.ui_state.service_query.clear(),
            Screen::LogViewer => {
                self.ui_state.active_search = None;
                self.ui_state.filter_cache.invalidate();
            }
        }
    }

    pub fn search_input_char(&mut self, c: char) {
        self.ui_state.search_input.push(c);
    }

    pub fn search_input_backspace(&mut self) {
        self.ui_state.search_input.pop();
    }

    pub fn cycle_level_filter(&mut self) {
        let levels = LogLevel::selectable();
        let next = match &self.ui_state.level_filter {
            None => Some(levels[0].clone()),
            Some(current) => levels
                .iter()
                .position(|l| l == current)
                .and_then(|i| levels.get(i + 1))
                .cloned(),
        };
        self.ui_state.level_filter = next;
        self.ui_state.filter_cache.invalidate();
    }

    /// Reset per-stream viewer state before a new subscription opens
    pub fn reset_stream(&mut self) {
        self.ui_state.log_scroll = 0;
        self.ui_state.auto_scroll = true;
        self.ui_state.filter_cache.invalidate();
        self.stream_status = None;
        self.counters = FeedCounters::default();
    }

    /// Name shown in headers and export file names
    pub fn target_name(&self) -> String {
        match &self.selected_service {
            Some(service) => service.name.clone(),
            None if self.resource_ids.len() == 1 => self.resource_ids[0].clone(),
            None => format!("{} resources", self.resource_ids.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use r4r_types::LogRecord;

    fn state() -> AppState {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = AppState::new(tx);
        state.services = vec![
            Service::new("srv-a".into(), "api".into()),
            Service::new("srv-b".into(), "worker".into()),
            Service::new("srv-c".into(), "api-cron".into()),
        ];
        state
    }

    #[test]
    fn test_list_navigation_wraps() {
        let mut state = state();
        state.list_up();
        assert_eq!(state.selected_index(), Some(2));
        state.list_down();
        assert_eq!(state.selected_index(), Some(0));
    }

    #[test]
    fn test_service_query_filters_list() {
        let mut state = state();
        state.start_search();
        for c in "API".chars() {
            state.search_input_char(c);
        }
        state.apply_filter();

        let names: Vec<&str> = state.visible_services().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["api", "api-cron"]);
        state.list_down();
        assert_eq!(state.selected_list_service().map(|s| s.id.as_str()), Some("srv-c"));
    }

    #[test]
    fn test_log_search_builds_stream_filter() {
        let mut state = state();
        state.navigate_to(Screen::LogViewer);
        state.start_search();
        for c in " timeout ".chars() {
            state.search_input_char(c);
        }
        state.apply_filter();
        state.cycle_level_filter();

        let filter = state.ui_state.stream_filter();
        assert_eq!(filter.search(), Some("timeout"));
        assert_eq!(filter.level(), Some(&LogLevel::Debug));

        state.clear_filter();
        assert_eq!(state.ui_state.stream_filter().search(), None);
    }

    #[test]
    fn test_level_cycle_returns_to_none() {
        let mut state = state();
        let mut seen = Vec::new();
        for _ in 0..6 {
            state.cycle_level_filter();
            seen.push(state.ui_state.level_filter.clone());
        }
        assert_eq!(seen[3], Some(LogLevel::Error));
        assert_eq!(seen[5], None);
    }

    #[test]
    fn test_filter_cache_tracks_buffer() {
        let buffer = LogBuffer::new(10);
        let mut cache = FilterCache::default();
        let filter = StreamFilter::new().with_level(Some(LogLevel::Error));

        buffer.push(LogRecord::new(Utc::now(), LogLevel::Error, "a"));
        cache.refresh(&filter, &buffer);
        assert_eq!(cache.cached_entries.len(), 1);
        assert!(!cache.needs_refresh(&filter, &buffer));

        buffer.push(LogRecord::new(Utc::now(), LogLevel::Info, "b"));
        assert!(cache.needs_refresh(&filter, &buffer));
        cache.refresh(&filter, &buffer);
        assert_eq!(cache.cached_entries.len(), 1);
        assert!(cache.needs_refresh(&StreamFilter::new(), &buffer));
    }

    #[test]
    fn test_scroll_leaves_follow_mode() {
        let mut state = state();
        assert!(state.ui_state.auto_scroll);
        state.scroll_up(3);
        assert!(!state.ui_state.auto_scroll);
        assert_eq!(state.ui_state.log_scroll, 0);

        state.scroll_down(PAGE_LINES);
        assert_eq!(state.ui_state.log_scroll, 20);
        state.scroll_to_bottom();
        state.scroll_down(1);
        assert_eq!(state.ui_state.log_scroll, usize::MAX);
        state.scroll_to_top();
        assert_eq!(state.ui_state.log_scroll, 0);
    }

    #[test]
    fn test_go_back_from_root() {
        let mut state = state();
        assert!(!state.go_back());
        state.navigate_to(Screen::LogViewer);
        assert!(state.go_back());
        assert_eq!(state.current_screen, Screen::ServiceSelect);
    }
}
