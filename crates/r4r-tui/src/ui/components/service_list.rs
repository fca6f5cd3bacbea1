use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, StatefulWidget, Widget},
};

use r4r_types::Service;

use crate::ui::Theme;

const NAME_WIDTH: usize = 32;
const KIND_WIDTH: usize = 14;

/// Selectable table of services: name, type, status, id
pub struct ServiceList<'a> {
    services: Vec<&'a Service>,
    title: String,
}

impl<'a> ServiceList<'a> {
    pub fn new(services: Vec<&'a Service>) -> Self {
        Self {
            services,
            title: " Services ".to_string(),
        }
    }

    /// Title showing `shown/total` when the list is filtered
    pub fn with_total(mut self, total: usize) -> Self {
        let shown = self.services.len();
        self.title = if shown == total {
            format!(" Services ({shown}) ")
        } else {
            format!(" Services ({shown}/{total}) ")
        };
        self
    }

    fn row(service: &Service) -> Line<'static> {
        Line::from(vec![
            Span::styled(pad(&service.name, NAME_WIDTH), Theme::list_item()),
            Span::styled(pad(&service.kind, KIND_WIDTH), Theme::text_dim()),
            Span::styled(
                pad(service.status.as_str(), 10),
                Theme::service_status(service.status),
            ),
            Span::styled(service.id.clone(), Theme::text_dim()),
        ])
    }
}

impl StatefulWidget for ServiceList<'_> {
    type State = ListState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Theme::border_focused())
            .title(Span::styled(self.title.clone(), Theme::title()));

        if self.services.is_empty() {
            Paragraph::new(Span::styled("No services found", Theme::text_dim()))
                .block(block)
                .render(area, buf);
            return;
        }

        let items: Vec<ListItem> = self
            .services
            .iter()
            .map(|s| ListItem::new(Self::row(s)))
            .collect();
        let list = List::new(items)
            .block(block)
            .highlight_style(Theme::list_item_selected())
            .highlight_symbol("▶ ");

        StatefulWidget::render(list, area, buf, state);
    }
}

/// Left-align in `width` columns, cutting long names with an ellipsis
fn pad(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count < width {
        format!("{text:<width$}")
    } else {
        let cut: String = text.chars().take(width.saturating_sub(2)).collect();
        format!("{cut}… ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad() {
        assert_eq!(pad("api", 6), "api   ");
        assert_eq!(pad("background-worker", 8), "backgr… ");
        assert_eq!(pad("exact", 5), "exa… ");
    }

    #[test]
    fn test_title_counts() {
        let a = Service::new("srv-a".into(), "api".into());
        assert_eq!(ServiceList::new(vec![&a]).with_total(1).title, " Services (1) ");
        assert_eq!(ServiceList::new(vec![&a]).with_total(4).title, " Services (1/4) ");
    }

    #[test]
    fn test_empty_list_renders_placeholder() {
        let area = Rect::new(0, 0, 30, 3);
        let mut buf = Buffer::empty(area);
        let mut state = ListState::default();
        ServiceList::new(Vec::new()).render(area, &mut buf, &mut state);

        let row: String = (0..30).map(|x| buf[(x, 1)].symbol().to_string()).collect();
        assert!(row.contains("No services found"));
    }
}
