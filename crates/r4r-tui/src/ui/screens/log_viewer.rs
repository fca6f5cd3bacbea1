use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout as RatatuiLayout, Margin, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use r4r_logs::{BufferedRecord, DiagnosticKind, LogBuffer, StreamFilter};
use r4r_types::LogLevel;

use crate::app::AppState;
use crate::ui::Theme;
use crate::ui::components::{LOG_VIEWER_HINTS, StatusBar};

/// Log viewer screen
pub struct LogViewerScreen;

impl LogViewerScreen {
    pub fn render(frame: &mut Frame, state: &mut AppState, log_buffer: &LogBuffer) {
        let area = frame.area();

        let show_filter_bar = state.ui_state.search_active
            || state.ui_state.active_search.is_some()
            || state.ui_state.level_filter.is_some();

        let mut constraints = vec![Constraint::Length(3)]; // Header
        if state.ui_state.stats_visible {
            constraints.push(Constraint::Length(3));
        }
        if show_filter_bar {
            constraints.push(Constraint::Length(3));
        }
        constraints.push(Constraint::Min(1)); // Logs
        constraints.push(Constraint::Length(1)); // Status bar

        let chunks = RatatuiLayout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        let mut idx = 0;
        Self::render_header(frame, chunks[idx], state);
        idx += 1;

        if state.ui_state.stats_visible {
            Self::render_stats_bar(frame, chunks[idx], state, log_buffer);
            idx += 1;
        }

        if show_filter_bar {
            Self::render_filter_bar(frame, chunks[idx], state);
            idx += 1;
        }

        Self::render_logs(frame, chunks[idx], state, log_buffer);
        idx += 1;

        Self::render_status_bar(frame, chunks[idx], state, log_buffer);
    }

    fn render_header(frame: &mut Frame, area: Rect, state: &AppState) {
        let mut spans = vec![
            Span::styled("r4r", Theme::title()),
            Span::styled(" │ ", Theme::text_dim()),
            Span::styled(state.target_name(), Theme::text_highlight()),
            Span::styled(" │ ", Theme::text_dim()),
            Span::styled(state.stream_state, Theme::text()),
            Span::styled(" │ ", Theme::text_dim()),
            Span::styled(
                format!("⏱ {}", state.ui_state.time_range.label()),
                Style::default()
                    .fg(Theme::PRIMARY)
                    .add_modifier(Modifier::BOLD),
            ),
        ];

        if let Some(msg) = &state.ui_state.error_message {
            spans.push(Span::styled(" │ ", Theme::text_dim()));
            spans.push(Span::styled(msg.clone(), Theme::error()));
        } else if let Some(diagnostic) = &state.stream_status {
            let style = match diagnostic.kind {
                DiagnosticKind::Connected | DiagnosticKind::Connection => Theme::text_dim(),
                DiagnosticKind::PollingFallback | DiagnosticKind::HistoryUnavailable => {
                    Style::default().fg(Theme::WARNING)
                }
                _ => Theme::error(),
            };
            spans.push(Span::styled(" │ ", Theme::text_dim()));
            spans.push(Span::styled(diagnostic.message.clone(), style));
        }

        let header = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border()),
        );

        frame.render_widget(header, area);
    }

    fn render_filter_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let mut spans = Vec::new();

        if let Some(level) = &state.ui_state.level_filter {
            spans.push(Span::styled(" level:", Theme::text_dim()));
            spans.push(Span::styled(level.as_str().to_string(), Theme::level_tag(level)));
        }

        if state.ui_state.search_active {
            spans.push(Span::styled(" /", Theme::text_highlight()));
            spans.push(Span::styled(state.ui_state.search_input.clone(), Theme::text_highlight()));
            spans.push(Span::styled(
                "█",
                Style::default()
                    .fg(Theme::HIGHLIGHT)
                    .add_modifier(Modifier::SLOW_BLINK),
            ));
            spans.push(Span::styled("  [Enter] Apply  [Esc] Cancel", Theme::text_dim()));
        } else if let Some(search) = &state.ui_state.active_search {
            spans.push(Span::styled(" search:", Theme::text_dim()));
            spans.push(Span::styled(search.clone(), Theme::text_highlight()));
            spans.push(Span::styled("  [n] Clear  [/] Edit", Theme::text_dim()));
        }

        let filter_bar = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(if state.ui_state.search_active {
                    Style::default().fg(Theme::HIGHLIGHT)
                } else {
                    Theme::border()
                })
                .title(Span::styled(" Filter ", Theme::title())),
        );

        frame.render_widget(filter_bar, area);
    }

    fn render_logs(frame: &mut Frame, area: Rect, state: &mut AppState, log_buffer: &LogBuffer) {
        let filter = state.ui_state.stream_filter();
        state.ui_state.filter_cache.refresh(&filter, log_buffer);

        let total_logs = state.ui_state.filter_cache.cached_entries.len();
        let inner_height = area.height.saturating_sub(2) as usize;

        if state.ui_state.auto_scroll && total_logs > 0 {
            state.ui_state.log_scroll = total_logs.saturating_sub(inner_height);
        }

        let max_scroll = total_logs.saturating_sub(inner_height);
        if state.ui_state.log_scroll > max_scroll {
            state.ui_state.log_scroll = max_scroll;
        }

        // borders and scrollbar
        let inner_width = area.width.saturating_sub(4) as usize;

        let lines: Vec<Line> = state
            .ui_state
            .filter_cache
            .cached_entries
            .iter()
            .skip(state.ui_state.log_scroll)
            .take(inner_height)
            .map(|entry| Self::format_line(entry, state, &filter, inner_width))
            .collect();

        let title = if filter.is_empty() {
            format!(" Logs ({total_logs}) ")
        } else {
            format!(" Logs ({total_logs} matching) ")
        };

        let logs_widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border())
                .title(Span::styled(title, Theme::title())),
        );
        frame.render_widget(logs_widget, area);

        if total_logs > inner_height {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("▲"))
                .end_symbol(Some("▼"));
            let mut scrollbar_state = ScrollbarState::default()
                .content_length(max_scroll)
                .position(state.ui_state.log_scroll);

            frame.render_stateful_widget(
                scrollbar,
                area.inner(Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                &mut scrollbar_state,
            );
        }
    }

    fn render_stats_bar(frame: &mut Frame, area: Rect, state: &AppState, log_buffer: &LogBuffer) {
        let counts = log_buffer.level_counts();

        let mut spans = vec![Span::styled(" ", Theme::text())];
        for level in LogLevel::selectable().iter().rev() {
            let count = counts.get(level);
            if count == 0 && matches!(level, LogLevel::Fatal | LogLevel::Debug) {
                continue;
            }
            spans.push(Span::styled(format!("{}:", level.short()), Theme::level_tag(level)));
            spans.push(Span::styled(format!("{count} "), Theme::text()));
        }
        if counts.other > 0 {
            spans.push(Span::styled("OTH:", Theme::text_dim()));
            spans.push(Span::styled(format!("{} ", counts.other), Theme::text()));
        }

        spans.push(Span::styled("│ ", Theme::text_dim()));
        spans.push(Span::styled("Total:", Theme::text_dim()));
        spans.push(Span::styled(format!("{} ", counts.total()), Theme::text()));
        spans.push(Span::styled("│ ", Theme::text_dim()));
        spans.push(Span::styled(
            format!(
                "seen {} emitted {}",
                state.counters.seen, state.counters.emitted
            ),
            Theme::text_dim(),
        ));
        if state.counters.decode_failures > 0 {
            spans.push(Span::styled(
                format!(" unparsed {}", state.counters.decode_failures),
                Style::default().fg(Theme::WARNING),
            ));
        }

        let stats_widget = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border())
                .title(Span::styled(" Stats ", Theme::title())),
        );

        frame.render_widget(stats_widget, area);
    }

    /// One display line for a buffered record
    fn format_line(
        entry: &BufferedRecord,
        state: &AppState,
        filter: &StreamFilter,
        available_width: usize,
    ) -> Line<'static> {
        let record = &entry.record;
        let mut spans = Vec::new();
        let mut prefix_width: usize = 0;

        spans.push(Span::styled(format!("{:>5}", entry.id), Theme::text_dim()));
        prefix_width += 5;

        if state.ui_state.show_timestamps {
            let time = if state.ui_state.use_local_time {
                record.timestamp().with_timezone(&Local).format("%H:%M:%S").to_string()
            } else {
                record.timestamp().format("%H:%M:%S").to_string()
            };
            spans.push(Span::styled(format!(" {time}"), Theme::text_dim()));
            prefix_width += 9;
        }

        if state.ui_state.show_sources {
            let source = display_source(record.source(), record.service_id());
            spans.push(Span::styled(
                format!(" {:>12}", truncate_to_width(source, 12)),
                Style::default().fg(Theme::source_color(source)),
            ));
            prefix_width += 13;
        }

        spans.push(Span::styled(
            format!(" {}", record.level().short()),
            Theme::level_tag(record.level()),
        ));
        prefix_width += 4;

        spans.push(Span::styled(" │ ", Theme::text_dim()));
        prefix_width += 3;

        let message_width = available_width.saturating_sub(prefix_width);
        let message = if record.message().width() > message_width {
            format!("{}...", truncate_to_width(record.message(), message_width.saturating_sub(3)))
        } else {
            record.message().to_string()
        };

        let base_style = Theme::level_text(record.level());
        let matches = filter.find_matches(&message);
        if matches.is_empty() {
            spans.push(Span::styled(message, base_style));
            return Line::from(spans);
        }

        let mut last_end = 0;
        for (start, end) in matches {
            if start > last_end {
                spans.push(Span::styled(message[last_end..start].to_string(), base_style));
            }
            spans.push(Span::styled(message[start..end].to_string(), Theme::search_match()));
            last_end = end;
        }
        if last_end < message.len() {
            spans.push(Span::styled(message[last_end..].to_string(), base_style));
        }

        Line::from(spans)
    }

    fn render_status_bar(frame: &mut Frame, area: Rect, state: &AppState, log_buffer: &LogBuffer) {
        let counts = log_buffer.level_counts();
        let summary = format!(
            "E:{} W:{} I:{} | {} logs {}",
            counts.error + counts.fatal,
            counts.warn,
            counts.info,
            counts.total(),
            if state.ui_state.auto_scroll { "▼" } else { " " }
        );

        let status = StatusBar::new()
            .badge(state.stream_state, Theme::stream_state(state.stream_state))
            .hints(LOG_VIEWER_HINTS)
            .summary(summary);
        frame.render_widget(status, area);
    }
}

/// Source column text: the record source, else its service id
fn display_source<'a>(source: &'a str, service_id: &'a str) -> &'a str {
    match (source.is_empty(), service_id.is_empty()) {
        (false, _) => source,
        (true, false) => service_id,
        (true, true) => "-",
    }
}

/// Longest prefix of `s` whose display width fits in `max_width`
fn truncate_to_width(s: &str, max_width: usize) -> &str {
    let mut width = 0;
    for (idx, ch) in s.char_indices() {
        width += ch.width().unwrap_or(0);
        if width > max_width {
            return &s[..idx];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("hello", 10), "hello");
        assert_eq!(truncate_to_width("hello", 3), "hel");
        // wide characters take two columns
        assert_eq!(truncate_to_width("日本語", 5), "日本");
        assert_eq!(truncate_to_width("", 0), "");
    }

    #[test]
    fn test_display_source_falls_back_to_service() {
        assert_eq!(display_source("", "srv-1"), "srv-1");
        assert_eq!(display_source("app", "srv-1"), "app");
        assert_eq!(display_source("", ""), "-");
    }
}
