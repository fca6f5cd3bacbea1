use ratatui::style::{Color, Modifier, Style};

use r4r_types::{LogLevel, ServiceStatus};

/// Color theme for the application
pub struct Theme;

impl Theme {
    pub const BG: Color = Color::Reset;
    pub const FG: Color = Color::White;
    pub const FG_DIM: Color = Color::DarkGray;

    pub const PRIMARY: Color = Color::Cyan;
    pub const HIGHLIGHT: Color = Color::Yellow;

    pub const SUCCESS: Color = Color::Green;
    pub const WARNING: Color = Color::Yellow;
    pub const ERROR: Color = Color::Red;

    /// Palette for per-source coloring
    const SOURCE_COLORS: [Color; 8] = [
        Color::Cyan,
        Color::Magenta,
        Color::Blue,
        Color::Yellow,
        Color::Green,
        Color::LightRed,
        Color::LightCyan,
        Color::LightMagenta,
    ];

    pub fn border() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    pub fn border_focused() -> Style {
        Style::default().fg(Self::PRIMARY)
    }

    pub fn title() -> Style {
        Style::default()
            .fg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text() -> Style {
        Style::default().fg(Self::FG)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    pub fn text_highlight() -> Style {
        Style::default()
            .fg(Self::HIGHLIGHT)
            .add_modifier(Modifier::BOLD)
    }

    pub fn list_item() -> Style {
        Style::default().fg(Self::FG)
    }

    pub fn list_item_selected() -> Style {
        Style::default()
            .fg(Self::BG)
            .bg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn status_bar() -> Style {
        Style::default().fg(Self::FG_DIM).bg(Color::DarkGray)
    }

    pub fn status_bar_key() -> Style {
        Style::default()
            .fg(Self::HIGHLIGHT)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    }

    pub fn error() -> Style {
        Style::default()
            .fg(Self::ERROR)
            .add_modifier(Modifier::BOLD)
    }

    /// Bold level tag, e.g. `ERR`
    pub fn level_tag(level: &LogLevel) -> Style {
        Style::default()
            .fg(level.color())
            .add_modifier(Modifier::BOLD)
    }

    /// Message text colored by severity
    pub fn level_text(level: &LogLevel) -> Style {
        match level {
            LogLevel::Error | LogLevel::Fatal => Style::default().fg(Self::ERROR),
            LogLevel::Warn => Style::default().fg(Self::WARNING),
            _ => Self::text(),
        }
    }

    pub fn search_match() -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(Self::HIGHLIGHT)
            .add_modifier(Modifier::BOLD)
    }

    /// Stable color for a source or service name
    pub fn source_color(name: &str) -> Color {
        let hash = name.bytes().fold(0u32, |acc, b| acc.wrapping_add(b as u32));
        Self::SOURCE_COLORS[hash as usize % Self::SOURCE_COLORS.len()]
    }

    /// Badge for a subscription state label ("following", "replaying", ...)
    pub fn stream_state(label: &str) -> Style {
        let bg = match label {
            "following" => Self::SUCCESS,
            "replaying" => Self::PRIMARY,
            "stopped" => Self::ERROR,
            _ => Color::Gray,
        };
        Style::default()
            .fg(Color::Black)
            .bg(bg)
            .add_modifier(Modifier::BOLD)
    }

    pub fn service_status(status: ServiceStatus) -> Style {
        match status {
            ServiceStatus::Active => Style::default().fg(Self::SUCCESS),
            ServiceStatus::Suspended => Style::default().fg(Self::WARNING),
            ServiceStatus::Unknown => Self::text_dim(),
        }
    }
}
