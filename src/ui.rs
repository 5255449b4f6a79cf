use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table},
};

use crate::model::UIData;

pub const TITLE_HEIGHT: usize = 1;
pub const CMDLINE_HEIGH: usize = 1;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;

#[derive(Debug, Default)]
pub struct TableUI {}

impl TableUI {
    pub fn new() -> Self {
        Self {}
    }

    pub fn draw(&self, uidata: &UIData, frame: &mut Frame) {
        let [title_area, table_area, cmd_area] = Layout::vertical([
            Constraint::Length(TITLE_HEIGHT as u16),
            Constraint::Min(1),
            Constraint::Length(CMDLINE_HEIGH as u16),
        ])
        .areas(frame.area());

        self.draw_title(uidata, frame, title_area);
        self.draw_table(uidata, frame, table_area);
        self.draw_cmdline(uidata, frame, cmd_area);

        if uidata.show_recent {
            self.draw_recent(uidata, frame);
        }
        if uidata.show_popup {
            self.draw_popup(uidata, frame);
        }
    }

    fn draw_title(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let name = if uidata.name.is_empty() {
            "checklist".to_string()
        } else {
            uidata.name.clone()
        };
        let mut spans = vec![
            Span::from(format!(" {name}")).bold(),
            Span::from(if uidata.unsaved_edits { " [+]" } else { "" }).yellow(),
            Span::from(format!("  {}/{} rows", uidata.nrows, uidata.total_rows)),
        ];
        if let Some(sort) = &uidata.sort {
            spans.push(Span::from(format!("  sort: {sort}")).cyan());
        }
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray)),
            area,
        );
    }

    fn draw_table(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let mut widths = vec![Constraint::Length(uidata.index.width as u16)];
        widths.extend(uidata.table.iter().map(|c| Constraint::Length(c.width as u16)));

        let mut header = vec![Cell::from(uidata.index.name.as_str())];
        header.extend(uidata.table.iter().map(|c| Cell::from(c.name.as_str())));
        let header = Row::new(header)
            .style(Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED))
            .height(TABLE_HEADER_HEIGHT as u16);

        let selected = Style::default().add_modifier(Modifier::REVERSED);
        let rows = uidata.index.data.iter().enumerate().map(|(ridx, index)| {
            let mut cells = vec![Cell::from(index.as_str()).dark_gray()];
            for (cidx, column) in uidata.table.iter().enumerate() {
                let text = column.data.get(ridx).map(String::as_str).unwrap_or("");
                let cell = Cell::from(text);
                if ridx == uidata.selected_row && cidx == uidata.selected_column {
                    cells.push(cell.style(selected));
                } else {
                    cells.push(cell);
                }
            }
            let row = Row::new(cells);
            if ridx == uidata.selected_row {
                row.style(Style::default().bg(Color::Black))
            } else {
                row
            }
        });

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(COLUMN_WIDTH_MARGIN as u16);
        frame.render_widget(table, area);
    }

    fn draw_cmdline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        if uidata.active_cmdinput
            && let Some(mode) = uidata.cmd_mode
        {
            let prompt = mode.prompt();
            let line = Line::from(vec![
                Span::from(prompt).yellow(),
                Span::from(uidata.cmdinput.input.as_str()),
            ]);
            frame.render_widget(Paragraph::new(line), area);
            let x = area.x + (prompt.chars().count() + uidata.cmdinput.cursor_pos) as u16;
            frame.set_cursor_position((x.min(area.right().saturating_sub(1)), area.y));
            return;
        }

        let mut spans = vec![Span::from(uidata.status_message.as_str())];
        if !uidata.query.is_empty() {
            spans.push(Span::from(format!("  /{}", uidata.query)).cyan());
        }
        if uidata.search_pending {
            spans.push(Span::from(" …").dark_gray());
        }
        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn draw_recent(&self, uidata: &UIData, frame: &mut Frame) {
        let area = centered_rect(70, 60, frame.area());
        let items: Vec<ListItem> = uidata
            .recent
            .iter()
            .map(|p| ListItem::new(p.as_str()))
            .collect();
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Recent sets (Enter to open, Esc to close) "),
            )
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

        let mut state = ListState::default();
        state.select(Some(uidata.recent_selected));

        frame.render_widget(Clear, area);
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_popup(&self, uidata: &UIData, frame: &mut Frame) {
        let area = centered_rect(60, 70, frame.area());
        let block = Block::default()
            .title(format!(" {} ", uidata.popup_title))
            .borders(Borders::ALL)
            .style(Style::default().bg(Color::Black));
        let paragraph = Paragraph::new(uidata.popup_message.as_str()).block(block);

        frame.render_widget(Clear, area);
        frame.render_widget(paragraph, area);
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
