use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Widget,
};
use unicode_width::UnicodeWidthStr;

use crate::ui::Theme;

type Hint = (&'static str, &'static str);

/// Bottom line: optional mode badge, key hints, right-aligned summary
#[derive(Default)]
pub struct StatusBar {
    badge: Option<(String, Style)>,
    hints: Vec<Hint>,
    summary: Option<String>,
}

impl StatusBar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uppercased label drawn before the hints, e.g. the stream state
    pub fn badge(mut self, label: &str, style: Style) -> Self {
        self.badge = Some((format!(" {} ", label.to_uppercase()), style));
        self
    }

    pub fn hints(mut self, hints: &[Hint]) -> Self {
        self.hints = hints.to_vec();
        self
    }

    /// Right-aligned text; dropped when it would overlap the hints
    pub fn summary(mut self, text: impl Into<String>) -> Self {
        self.summary = Some(text.into());
        self
    }

    fn left_line(&self) -> Line<'_> {
        let mut spans = Vec::with_capacity(self.hints.len() * 2 + 2);
        if let Some((label, style)) = &self.badge {
            spans.push(Span::styled(label.as_str(), *style));
            spans.push(Span::styled(" ", Theme::status_bar()));
        }
        for (key, desc) in &self.hints {
            spans.push(Span::styled(*key, Theme::status_bar_key()));
            spans.push(Span::styled(format!(" {desc}  "), Theme::status_bar()));
        }
        Line::from(spans)
    }
}

impl Widget for StatusBar {
    fn render(self, area: Rect, buf: &mut Buffer) {
        buf.set_style(area, Theme::status_bar());

        let left = self.left_line();
        let left_width = left.width() as u16;
        buf.set_line(area.x, area.y, &left, area.width);

        let Some(summary) = self.summary else {
            return;
        };
        let width = summary.width() as u16;
        let x = area.x + area.width.saturating_sub(width + 1);
        if x > area.x + left_width {
            buf.set_span(x, area.y, &Span::styled(summary, Theme::status_bar()), width);
        }
    }
}

pub const SERVICE_LIST_HINTS: &[Hint] = &[
    ("↑↓", "Move"),
    ("Enter", "Logs"),
    ("/", "Filter"),
    ("r", "Refresh"),
    ("q", "Quit"),
];

pub const LOG_VIEWER_HINTS: &[Hint] = &[
    ("/", "Search"),
    ("l", "Level"),
    ("r", "Range"),
    ("^R", "Reconnect"),
    ("e", "Export"),
    ("?", "Help"),
    ("Esc", "Back"),
];

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(bar: StatusBar, width: u16) -> String {
        let area = Rect::new(0, 0, width, 1);
        let mut buf = Buffer::empty(area);
        bar.render(area, &mut buf);
        (0..width)
            .map(|x| buf[(x, 0)].symbol().to_string())
            .collect::<String>()
    }

    #[test]
    fn test_badge_and_hints() {
        let bar = StatusBar::new()
            .badge("following", Theme::status_bar_key())
            .hints(&[("q", "Quit")]);
        let text = rendered(bar, 40);
        assert!(text.starts_with(" FOLLOWING  q Quit"));
    }

    #[test]
    fn test_summary_right_aligned() {
        let bar = StatusBar::new().hints(&[("q", "Quit")]).summary("12 logs");
        let text = rendered(bar, 30);
        assert!(text.trim_end().ends_with("12 logs"));
    }

    #[test]
    fn test_summary_dropped_when_no_room() {
        let bar = StatusBar::new().hints(LOG_VIEWER_HINTS).summary("12 logs");
        let text = rendered(bar, 20);
        assert!(!text.contains("12 logs"));
    }
}
