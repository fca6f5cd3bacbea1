use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use crate::{
    app::AppState,
    ui::{
        Layout, Theme,
        components::{SERVICE_LIST_HINTS, ServiceList, StatusBar},
    },
};

/// Service selection screen
pub struct ServiceSelectScreen;

impl ServiceSelectScreen {
    pub fn render(frame: &mut Frame, state: &mut AppState) {
        let area = frame.area();
        let (header_area, content_area, status_area) = Layout::main(area);

        Self::render_header(frame, header_area, state);
        Self::render_list(frame, content_area, state);
        Self::render_status_bar(frame, status_area, state);
    }

    fn render_header(frame: &mut Frame, area: Rect, state: &AppState) {
        let mut spans = vec![
            Span::styled("r4r", Theme::title()),
            Span::styled(" │ ", Theme::text_dim()),
            Span::styled("Select Service", Theme::text()),
        ];

        if state.ui_state.search_active {
            spans.push(Span::styled(" │ /", Theme::text_dim()));
            spans.push(Span::styled(state.ui_state.search_input.clone(), Theme::text_highlight()));
            spans.push(Span::styled("█", Theme::text_highlight()));
        } else if !state.ui_state.service_query.is_empty() {
            spans.push(Span::styled(" │ filter: ", Theme::text_dim()));
            spans.push(Span::styled(state.ui_state.service_query.clone(), Theme::text_highlight()));
        }

        if let Some(msg) = &state.ui_state.error_message {
            spans.push(Span::styled(" │ ", Theme::text_dim()));
            spans.push(Span::styled(msg.clone(), Theme::error()));
        }

        let header = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border()),
        );

        frame.render_widget(header, area);
    }

    fn render_list(frame: &mut Frame, area: Rect, state: &mut AppState) {
        let list_area = Layout::centered_list(area, 80);
        // visible_services borrows all of state, so render against a copy
        let mut list_state = state.ui_state.list_state.clone();
        let list = ServiceList::new(state.visible_services()).with_total(state.services.len());
        frame.render_stateful_widget(list, list_area, &mut list_state);
        state.ui_state.list_state = list_state;
    }

    fn render_status_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let mut status = StatusBar::new().hints(SERVICE_LIST_HINTS);
        if let Some(service) = state.selected_list_service() {
            status = status.summary(service.id.clone());
        }
        frame.render_widget(status, area);
    }
}
