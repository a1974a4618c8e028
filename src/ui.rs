use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, Cell, Clear, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Table, TableState, Wrap,
    },
};

use crate::domain::CMDMode;
use crate::model::{Model, UIData};

pub const HEADER_HEIGHT: usize = 2;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const FOOTER_HEIGHT: usize = 1;
pub const CMDLINE_HEIGH: usize = 1;
pub const SCROLLBAR_WIDTH: usize = 1;

const POPUP_WIDTH: u16 = 64;

#[derive(Debug, Default)]
pub struct TableUI {
    table_state: TableState,
}

impl TableUI {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let [header_area, table_area, footer_area, cmdline_area] = Layout::vertical([
            Constraint::Length(HEADER_HEIGHT as u16),
            Constraint::Min(0),
            Constraint::Length(FOOTER_HEIGHT as u16),
            Constraint::Length(CMDLINE_HEIGH as u16),
        ])
        .areas(frame.area());

        Self::draw_header(uidata, frame, header_area);
        if uidata.has_table {
            self.draw_table(uidata, frame, table_area);
        }
        Self::draw_footer(uidata, frame, footer_area);
        Self::draw_cmdline(uidata, frame, cmdline_area);

        if uidata.show_popup {
            Self::draw_popup(uidata, frame);
        }
    }

    fn draw_header(uidata: &UIData, frame: &mut Frame, area: Rect) {
        let title = Line::from(vec![
            " statview ".bold().reversed(),
            " ".into(),
            Span::styled(
                uidata.title.clone(),
                Style::new().fg(Color::Yellow).underlined(),
            ),
        ]);
        let download = match &uidata.download {
            Some(d) => Line::from(vec![
                " download: ".dark_gray(),
                Span::styled(d.clone(), Style::new().fg(Color::Blue)),
            ]),
            None => Line::from(" no dataset loaded".dark_gray()),
        };
        frame.render_widget(Paragraph::new(vec![title, download]), area);
    }

    fn draw_table(&mut self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let index_width = uidata.layout.index_width as u16;
        let [index_area, table_area, scrollbar_area] = Layout::horizontal([
            Constraint::Length(index_width + 1),
            Constraint::Min(0),
            Constraint::Length(SCROLLBAR_WIDTH as u16),
        ])
        .areas(area);

        let header = Row::new(
            uidata
                .table
                .iter()
                .map(|c| Cell::from(c.name.clone()))
                .collect::<Vec<Cell>>(),
        )
        .style(Style::new().bold().underlined());

        let nrows = uidata.table.first().map(|c| c.data.len()).unwrap_or(0);
        let rows = (0..nrows).map(|ridx| {
            Row::new(uidata.table.iter().map(|column| {
                let value = column.data[ridx].as_str();
                let line = if column.numeric {
                    Line::from(value).alignment(Alignment::Right)
                } else {
                    Line::from(value)
                };
                Cell::from(line)
            }))
        });
        let widths = uidata
            .table
            .iter()
            .map(|c| Constraint::Length(c.width as u16));

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(1)
            .row_highlight_style(Style::new().bg(Color::DarkGray))
            .cell_highlight_style(Style::new().bg(Color::Blue).add_modifier(Modifier::BOLD));

        self.table_state.select(Some(uidata.selected_row));
        self.table_state.select_column(Some(uidata.selected_column));
        *self.table_state.offset_mut() = 0;
        frame.render_stateful_widget(table, table_area, &mut self.table_state);

        // Row numbers, aligned with the table body below its header
        let index_lines: Vec<Line> = std::iter::once(Line::from(""))
            .chain(uidata.index.data.iter().enumerate().map(|(i, n)| {
                let line = Line::from(n.clone()).alignment(Alignment::Right);
                if i == uidata.selected_row {
                    line.bold()
                } else {
                    line.dark_gray()
                }
            }))
            .collect();
        frame.render_widget(Paragraph::new(index_lines), index_area);

        let position = uidata.first_row.saturating_sub(1) + uidata.selected_row;
        let mut scrollbar_state = ScrollbarState::new(uidata.nrows).position(position);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            scrollbar_area,
            &mut scrollbar_state,
        );
    }

    fn draw_footer(uidata: &UIData, frame: &mut Frame, area: Rect) {
        let mut spans = vec![Span::raw(" ")];
        if uidata.has_table {
            spans.push(Span::raw(format!(
                "rows {}-{} of {}",
                uidata.first_row, uidata.last_row, uidata.nrows
            )));
            if uidata.nrows != uidata.total_rows {
                spans.push(Span::raw(format!(" (filtered from {})", uidata.total_rows)));
            }
            spans.push(Span::raw(format!(
                " | page {}/{}",
                uidata.page, uidata.page_count
            )));
        }
        spans.push(Span::raw(" | limit "));
        spans.push(Span::styled(
            uidata.row_limit.to_string(),
            Style::new().bold(),
        ));
        if let Some(order) = &uidata.order {
            spans.push(Span::raw(format!(" | order {order}")));
        }
        if let Some(term) = &uidata.search {
            spans.push(Span::raw(" | search "));
            spans.push(Span::styled(format!("\"{term}\""), Style::new().italic()));
        }
        spans.push(Span::raw(" | ? help"));
        frame.render_widget(Paragraph::new(Line::from(spans)).reversed(), area);
    }

    fn draw_cmdline(uidata: &UIData, frame: &mut Frame, area: Rect) {
        if uidata.active_cmdinput {
            let prompt = match uidata.cmd_mode {
                Some(CMDMode::Search) => "/",
                Some(CMDMode::Open) => ":open ",
                None => ":",
            };
            let line = Line::from(vec![
                prompt.bold(),
                Span::raw(uidata.cmdinput.input.clone()),
            ]);
            frame.render_widget(Paragraph::new(line), area);
            let prompt_width = prompt.chars().count() as u16;
            frame.set_cursor_position(Position::new(
                area.x + prompt_width + uidata.cmdinput.curser_pos as u16,
                area.y,
            ));
        } else {
            let style = if uidata.status_is_error {
                Style::new().fg(Color::Red)
            } else {
                Style::new()
            };
            let line = Line::from(Span::styled(uidata.status_message.clone(), style));
            frame.render_widget(Paragraph::new(line), area);
        }
    }

    fn draw_popup(uidata: &UIData, frame: &mut Frame) {
        let area = frame.area();
        let height = (uidata.popup_message.lines().count() as u16 + 2).min(area.height);
        let width = POPUP_WIDTH.min(area.width);
        let popup = Rect {
            x: area.x + (area.width - width) / 2,
            y: area.y + (area.height - height) / 2,
            width,
            height,
        };
        let block = Block::bordered().title(Line::from(" Help ".bold()).centered());
        frame.render_widget(Clear, popup);
        frame.render_widget(
            Paragraph::new(uidata.popup_message.clone())
                .block(block)
                .wrap(Wrap { trim: false }),
            popup,
        );
    }
}
