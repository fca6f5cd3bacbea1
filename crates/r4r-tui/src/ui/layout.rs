use ratatui::layout::{Constraint, Direction, Layout as RatatuiLayout, Rect};

/// Layout helper for consistent screen layouts
pub struct Layout;

impl Layout {
    /// Header, content, and status bar
    pub fn main(area: Rect) -> (Rect, Rect, Rect) {
        let chunks = RatatuiLayout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(1),    // Content
                Constraint::Length(1), // Status bar
            ])
            .split(area);

        (chunks[0], chunks[1], chunks[2])
    }

    /// Centered content area for list screens
    pub fn centered_list(area: Rect, width_percent: u16) -> Rect {
        let width_percent = width_percent.min(100);
        let horizontal = RatatuiLayout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage((100 - width_percent) / 2),
                Constraint::Percentage(width_percent),
                Constraint::Percentage((100 - width_percent) / 2),
            ])
            .split(area);

        let vertical = RatatuiLayout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
            ])
            .split(horizontal[1]);

        vertical[1]
    }

    /// Centered popup of at most `width` x `height`
    pub fn popup(area: Rect, width: u16, height: u16) -> Rect {
        let width = width.min(area.width.saturating_sub(4));
        let height = height.min(area.height.saturating_sub(4));
        let x = area.x + area.width.saturating_sub(width) / 2;
        let y = area.y + area.height.saturating_sub(height) / 2;
        Rect::new(x, y, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_layout_heights() {
        let (header, content, status) = Layout::main(Rect::new(0, 0, 80, 24));
        assert_eq!(header.height, 3);
        assert_eq!(status.height, 1);
        assert_eq!(content.height, 20);
    }

    #[test]
    fn test_popup_fits_small_terminal() {
        let popup = Layout::popup(Rect::new(0, 0, 30, 10), 50, 24);
        assert_eq!(popup.width, 26);
        assert_eq!(popup.height, 6);
        assert_eq!(popup.x, 2);
    }
}
