//! Interactive log viewer loop

use std::fs;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::debug;

use r4r_logs::{LogBuffer, LogFeed, LogStreamManager, StreamEvent, StreamFilter, Subscription};
use r4r_tui::{
    Action, AppState, Event, EventHandler, HelpOverlay, KeyBindings, KeyContext, LogViewerScreen,
    PAGE_LINES, Screen, ServiceSelectScreen, Tui,
};
use r4r_types::Service;

use crate::commands::AppContext;

/// What the viewer opens on
pub(crate) enum Target {
    /// Start on the service list
    Pick,
    Service(Service),
    Resources(Vec<String>),
}

/// Internal actions for async operations
enum InternalAction {
    LoadServices,
    ServicesLoaded(Vec<Service>),
    StartStream,
    RestartStream,
    StopStream,
    Error(String),
}

pub(crate) async fn run(ctx: &AppContext, target: Target) -> Result<()> {
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<InternalAction>();

    let mut state = AppState::new(action_tx.clone());
    let manager = ctx.stream_manager().await?;
    let log_buffer = LogBuffer::new(ctx.config.logs.buffer_size);

    let mut subscription: Option<Subscription> = None;
    let mut feed: Option<LogFeed> = None;

    match target {
        Target::Pick => {}
        Target::Service(service) => {
            state.resource_ids = vec![service.id.clone()];
            state.selected_service = Some(service);
            state.navigate_to(Screen::LogViewer);
            let _ = internal_tx.send(InternalAction::StartStream);
        }
        Target::Resources(ids) => {
            state.resource_ids = ids;
            state.navigate_to(Screen::LogViewer);
            let _ = internal_tx.send(InternalAction::StartStream);
        }
    }
    let _ = internal_tx.send(InternalAction::LoadServices);

    let mut tui = Tui::new()?;
    let mut events = EventHandler::new(Duration::from_millis(100));
    let keybindings = KeyBindings::new();

    render(&mut tui, &mut state, &log_buffer)?;

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                match event {
                    Event::Key(key) => {
                        // Any key clears the current notice
                        if state.ui_state.error_message.is_some() {
                            let _ = action_tx.send(Action::DismissError);
                        }
                        let action = if state.ui_state.search_active {
                            keybindings.get_filter_input_action(&key)
                        } else {
                            let context = match state.current_screen {
                                Screen::ServiceSelect => KeyContext::ListNavigation,
                                Screen::LogViewer => KeyContext::LogViewer,
                            };
                            keybindings.get_action(context, &key)
                        };
                        if let Some(action) = action {
                            let _ = action_tx.send(action);
                        }
                    }
                    Event::Tick => {
                        if let Some(sub) = &subscription {
                            state.stream_state = sub.state().as_str();
                            state.counters.seen = sub.stats().seen();
                            state.counters.emitted = sub.stats().emitted();
                            state.counters.decode_failures = sub.stats().decode_failures();
                        }
                    }
                    Event::Resize(_, _) => {
                        let _ = action_tx.send(Action::Render);
                    }
                    Event::Error(e) => {
                        state.show_error(e);
                    }
                }
            }

            event = next_event(&mut feed) => {
                match event {
                    Some(StreamEvent::Record(record)) => {
                        log_buffer.push(record);
                    }
                    Some(StreamEvent::Diagnostic(diagnostic)) => {
                        debug!(%diagnostic, "Stream diagnostic");
                        state.stream_status = Some(diagnostic);
                    }
                    Some(StreamEvent::Failed(err)) => {
                        state.show_error(format!("Log stream failed: {err}"));
                    }
                    None => {
                        feed = None;
                        if let Some(sub) = &subscription {
                            state.stream_state = sub.state().as_str();
                        }
                    }
                }
            }

            Some(action) = action_rx.recv() => {
                handle_action(&mut state, &internal_tx, &log_buffer, action);
            }

            Some(internal) = internal_rx.recv() => {
                match internal {
                    InternalAction::LoadServices => {
                        match ctx.client.list_services(None).await {
                            Ok(services) => {
                                let _ = internal_tx.send(InternalAction::ServicesLoaded(services));
                            }
                            Err(e) => {
                                let _ = internal_tx.send(InternalAction::Error(
                                    format!("Failed to load services: {e}")
                                ));
                            }
                        }
                    }

                    InternalAction::ServicesLoaded(services) => {
                        state.services = services;
                    }

                    InternalAction::StartStream | InternalAction::RestartStream => {
                        stop_stream(&mut subscription, &mut feed).await;
                        match start_stream(&manager, &mut state, &log_buffer) {
                            Ok((sub, new_feed)) => {
                                subscription = Some(sub);
                                feed = Some(new_feed);
                            }
                            Err(e) => {
                                let _ = internal_tx.send(InternalAction::Error(
                                    format!("Failed to open log stream: {e}")
                                ));
                            }
                        }
                    }

                    InternalAction::StopStream => {
                        stop_stream(&mut subscription, &mut feed).await;
                        state.stream_state = "stopped";
                    }

                    InternalAction::Error(msg) => {
                        state.show_error(msg);
                    }
                }
            }
        }

        if state.should_quit {
            break;
        }

        render(&mut tui, &mut state, &log_buffer)?;
    }

    stop_stream(&mut subscription, &mut feed).await;
    events.shutdown();
    tui.restore()?;

    Ok(())
}

/// Next feed event, or pending forever when no feed is open
async fn next_event(feed: &mut Option<LogFeed>) -> Option<StreamEvent> {
    match feed {
        Some(feed) => feed.next().await,
        None => std::future::pending().await,
    }
}

/// Open a fresh subscription over the selected time range
///
/// Filtering happens locally in the viewer, so the feed itself is unfiltered.
fn start_stream(
    manager: &LogStreamManager,
    state: &mut AppState,
    log_buffer: &LogBuffer,
) -> Result<(Subscription, LogFeed)> {
    log_buffer.clear();
    state.reset_stream();

    let mut sub = manager.subscribe(state.resource_ids.clone(), StreamFilter::new());
    let feed = sub.open(state.ui_state.time_range.window())?;
    state.stream_state = sub.state().as_str();
    Ok((sub, feed))
}

async fn stop_stream(subscription: &mut Option<Subscription>, feed: &mut Option<LogFeed>) {
    *feed = None;
    if let Some(mut sub) = subscription.take() {
        // NotRunning just means the feed already ended
        let _ = sub.stop().await;
    }
}

fn handle_action(
    state: &mut AppState,
    internal_tx: &mpsc::UnboundedSender<InternalAction>,
    log_buffer: &LogBuffer,
    action: Action,
) {
    match action {
        Action::Quit => {
            let _ = internal_tx.send(InternalAction::StopStream);
            state.should_quit = true;
        }
        Action::GoBack => {
            if state.ui_state.help_visible {
                state.ui_state.help_visible = false;
                return;
            }
            if state.current_screen == Screen::LogViewer {
                let _ = internal_tx.send(InternalAction::StopStream);
                state.ui_state.active_search = None;
                state.ui_state.level_filter = None;
                state.ui_state.search_input.clear();
            }
            if !state.go_back() {
                state.should_quit = true;
            }
        }
        Action::ListUp => {
            state.list_up();
        }
        Action::ListDown => {
            state.list_down();
        }
        Action::ListSelect => {
            if state.current_screen == Screen::ServiceSelect {
                if let Some(service) = state.selected_list_service() {
                    let _ = state.action_tx.send(Action::SelectService(service.id.clone()));
                }
            }
        }
        Action::SelectService(id) => {
            if let Some(service) = state.services.iter().find(|s| s.id == id).cloned() {
                state.resource_ids = vec![service.id.clone()];
                state.selected_service = Some(service);
                state.navigate_to(Screen::LogViewer);
                let _ = internal_tx.send(InternalAction::StartStream);
            }
        }

        Action::ScrollUp(n) => state.scroll_up(n),
        Action::ScrollDown(n) => state.scroll_down(n),
        Action::PageUp => state.scroll_up(PAGE_LINES),
        Action::PageDown => state.scroll_down(PAGE_LINES),
        Action::ScrollToTop => state.scroll_to_top(),
        Action::ScrollToBottom => state.scroll_to_bottom(),
        Action::ToggleAutoScroll => {
            state.ui_state.auto_scroll = !state.ui_state.auto_scroll;
        }
        Action::ToggleTimestamps => {
            state.ui_state.show_timestamps = !state.ui_state.show_timestamps;
        }
        Action::ToggleLocalTime => {
            state.ui_state.use_local_time = !state.ui_state.use_local_time;
        }
        Action::ToggleSources => {
            state.ui_state.show_sources = !state.ui_state.show_sources;
        }
        Action::ToggleStats => {
            state.ui_state.stats_visible = !state.ui_state.stats_visible;
        }
        Action::ClearLogs => {
            log_buffer.clear();
            state.ui_state.log_scroll = 0;
            state.ui_state.filter_cache.invalidate();
        }
        Action::ExportLogs => {
            let filename = export_file_name(&state.target_name(), chrono::Local::now());
            let filter = state.ui_state.stream_filter();
            let count = log_buffer.matching(&filter).len();
            let mut content = log_buffer.export_lines(Some(&filter));
            if !content.is_empty() {
                content.push('\n');
            }
            match fs::write(&filename, content) {
                Ok(()) => state.show_error(format!("Exported {count} logs to {filename}")),
                Err(e) => state.show_error(format!("Export failed: {e}")),
            }
        }

        Action::CycleTimeRange => {
            state.ui_state.time_range = state.ui_state.time_range.next();
            if state.current_screen == Screen::LogViewer {
                let _ = internal_tx.send(InternalAction::RestartStream);
            }
        }
        Action::CycleTimeRangeBack => {
            state.ui_state.time_range = state.ui_state.time_range.prev();
            if state.current_screen == Screen::LogViewer {
                let _ = internal_tx.send(InternalAction::RestartStream);
            }
        }
        Action::Reconnect => {
            if state.current_screen == Screen::LogViewer {
                let _ = internal_tx.send(InternalAction::RestartStream);
            }
        }
        Action::RefreshServices => {
            let _ = internal_tx.send(InternalAction::LoadServices);
        }

        Action::DismissError => {
            state.dismiss_error();
        }
        Action::ToggleHelp => {
            state.ui_state.help_visible = !state.ui_state.help_visible;
        }

        // Search
        Action::OpenSearch => {
            state.start_search();
        }
        Action::CloseSearch => {
            state.cancel_search();
        }
        Action::SearchInput(c) => {
            state.search_input_char(c);
        }
        Action::SearchBackspace => {
            state.search_input_backspace();
        }
        Action::SearchClear => {
            state.ui_state.search_input.clear();
        }
        Action::ApplyFilter => {
            state.apply_filter();
        }
        Action::ClearFilter => {
            state.clear_filter();
        }
        Action::CycleLevelFilter => {
            state.cycle_level_filter();
            state.ui_state.log_scroll = 0;
        }

        Action::Render => {}
    }
}

/// `{target}_{YYYYmmdd_HHMMSS}.log` with path-unsafe characters replaced
fn export_file_name(target: &str, now: chrono::DateTime<chrono::Local>) -> String {
    let safe: String = target
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}_{}.log", safe, now.format("%Y%m%d_%H%M%S"))
}

fn render(tui: &mut Tui, state: &mut AppState, log_buffer: &LogBuffer) -> Result<()> {
    tui.terminal().draw(|frame| {
        match state.current_screen {
            Screen::ServiceSelect => {
                ServiceSelectScreen::render(frame, state);
            }
            Screen::LogViewer => {
                LogViewerScreen::render(frame, state, log_buffer);
            }
        }

        if state.ui_state.help_visible {
            HelpOverlay::render(frame);
        }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;
    use r4r_types::{LogLevel, LogRecord};

    fn setup() -> (
        AppState,
        mpsc::UnboundedSender<InternalAction>,
        mpsc::UnboundedReceiver<InternalAction>,
        mpsc::UnboundedReceiver<Action>,
    ) {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let mut state = AppState::new(action_tx);
        state.services = vec![
            Service::new("srv-a".into(), "api".into()),
            Service::new("srv-b".into(), "worker".into()),
        ];
        (state, internal_tx, internal_rx, action_rx)
    }

    #[test]
    fn test_select_service_starts_stream() {
        let (mut state, internal_tx, mut internal_rx, _action_rx) = setup();
        let buffer = LogBuffer::new(10);

        handle_action(&mut state, &internal_tx, &buffer, Action::SelectService("srv-b".into()));

        assert_eq!(state.current_screen, Screen::LogViewer);
        assert_eq!(state.resource_ids, vec!["srv-b".to_string()]);
        assert_eq!(state.target_name(), "worker");
        assert!(matches!(internal_rx.try_recv(), Ok(InternalAction::StartStream)));
    }

    #[test]
    fn test_list_select_sends_service_id() {
        let (mut state, internal_tx, _internal_rx, mut action_rx) = setup();
        let buffer = LogBuffer::new(10);

        handle_action(&mut state, &internal_tx, &buffer, Action::ListDown);
        handle_action(&mut state, &internal_tx, &buffer, Action::ListSelect);

        assert_eq!(action_rx.try_recv().ok(), Some(Action::SelectService("srv-b".into())));
    }

    #[test]
    fn test_go_back_from_viewer_stops_stream_and_clears_filters() {
        let (mut state, internal_tx, mut internal_rx, _action_rx) = setup();
        let buffer = LogBuffer::new(10);
        handle_action(&mut state, &internal_tx, &buffer, Action::SelectService("srv-a".into()));
        let _ = internal_rx.try_recv();

        state.ui_state.active_search = Some("timeout".into());
        state.ui_state.level_filter = Some(LogLevel::Error);
        handle_action(&mut state, &internal_tx, &buffer, Action::GoBack);

        assert_eq!(state.current_screen, Screen::ServiceSelect);
        assert!(state.ui_state.active_search.is_none());
        assert!(state.ui_state.level_filter.is_none());
        assert!(!state.should_quit);
        assert!(matches!(internal_rx.try_recv(), Ok(InternalAction::StopStream)));

        handle_action(&mut state, &internal_tx, &buffer, Action::GoBack);
        assert!(state.should_quit);
    }

    #[test]
    fn test_time_range_change_restarts_stream() {
        let (mut state, internal_tx, mut internal_rx, _action_rx) = setup();
        let buffer = LogBuffer::new(10);

        // No restart while on the service list
        handle_action(&mut state, &internal_tx, &buffer, Action::CycleTimeRange);
        assert!(internal_rx.try_recv().is_err());

        handle_action(&mut state, &internal_tx, &buffer, Action::SelectService("srv-a".into()));
        let _ = internal_rx.try_recv();
        let before = state.ui_state.time_range;
        handle_action(&mut state, &internal_tx, &buffer, Action::CycleTimeRangeBack);

        assert_eq!(state.ui_state.time_range, before.prev());
        assert!(matches!(internal_rx.try_recv(), Ok(InternalAction::RestartStream)));
    }

    #[test]
    fn test_clear_logs_empties_buffer() {
        let (mut state, internal_tx, _internal_rx, _action_rx) = setup();
        let buffer = LogBuffer::new(10);
        buffer.push(LogRecord::new(Utc::now(), LogLevel::Info, "hello"));
        state.ui_state.log_scroll = 5;

        handle_action(&mut state, &internal_tx, &buffer, Action::ClearLogs);

        assert!(buffer.is_empty());
        assert_eq!(state.ui_state.log_scroll, 0);
    }

    #[test]
    fn test_scroll_disables_auto_scroll() {
        let (mut state, internal_tx, _internal_rx, _action_rx) = setup();
        let buffer = LogBuffer::new(10);
        assert!(state.ui_state.auto_scroll);

        handle_action(&mut state, &internal_tx, &buffer, Action::ScrollUp(3));
        assert!(!state.ui_state.auto_scroll);
        assert_eq!(state.ui_state.log_scroll, 0);

        handle_action(&mut state, &internal_tx, &buffer, Action::PageDown);
        assert_eq!(state.ui_state.log_scroll, 20);
    }

    #[test]
    fn test_dismiss_error() {
        let (mut state, internal_tx, _internal_rx, _action_rx) = setup();
        let buffer = LogBuffer::new(10);
        state.show_error("Export failed".into());

        handle_action(&mut state, &internal_tx, &buffer, Action::DismissError);
        assert!(state.ui_state.error_message.is_none());
    }

    #[test]
    fn test_export_file_name() {
        let now = chrono::Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(export_file_name("api", now), "api_20240309_140507.log");
        assert_eq!(export_file_name("2 resources", now), "2_resources_20240309_140507.log");
    }
}
