use ratatui::{
    Frame,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::ui::{Layout, Theme};

/// Help overlay showing keybindings
pub struct HelpOverlay;

impl HelpOverlay {
    const SECTIONS: [(&'static str, &'static [(&'static str, &'static str)]); 3] = [
        (
            "Navigation",
            &[
                ("j/↓", "Scroll down"),
                ("k/↑", "Scroll up"),
                ("Ctrl+d", "Page down"),
                ("Ctrl+u", "Page up"),
                ("g", "Go to top"),
                ("G", "Go to bottom"),
            ],
        ),
        (
            "Display",
            &[
                ("f", "Toggle follow"),
                ("t", "Toggle timestamps"),
                ("T", "Local time / UTC"),
                ("p", "Toggle sources"),
                ("s", "Toggle stats bar"),
            ],
        ),
        (
            "Stream",
            &[
                ("/", "Search messages"),
                ("l", "Cycle level filter"),
                ("n", "Clear search"),
                ("r/R", "History window"),
                ("Ctrl+r", "Reconnect"),
                ("c", "Clear logs"),
                ("e", "Export logs to file"),
                ("Esc", "Go back"),
                ("q", "Quit"),
            ],
        ),
    ];

    pub fn render(frame: &mut Frame) {
        let mut lines = vec![Line::from(Span::styled(
            "Keybindings",
            Style::default().add_modifier(Modifier::BOLD),
        ))];

        for (title, keys) in Self::SECTIONS {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(title, Theme::text_highlight())));
            lines.extend(keys.iter().map(|(key, desc)| Self::key_line(key, desc)));
        }

        let height = lines.len() as u16 + 2;
        let popup_area = Layout::popup(frame.area(), 50, height);
        frame.render_widget(Clear, popup_area);

        let help = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border_focused())
                .title(Span::styled(" Help ", Theme::title())),
        );
        frame.render_widget(help, popup_area);
    }

    fn key_line(key: &'static str, desc: &'static str) -> Line<'static> {
        Line::from(vec![
            Span::styled(format!("  {key:>8}"), Style::default().fg(Theme::SUCCESS)),
            Span::styled(format!("  {desc}"), Theme::text()),
        ])
    }
}
