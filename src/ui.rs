use chrono::Utc;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Cell as TableCell, Paragraph, Row, Table},
    Frame,
};

use crate::app::App;
use crate::columns::{render_table, Cell, Column, ColumnKind, SortDirection, TableSurface};
use crate::detail::DetailPanel;
use crate::models::WorkerRow;
use crate::theme::*;

const WARNING_GLYPH: &str = "♥ ";

/// Renders the main UI with header, workers table, detail panel and footer
pub fn render(frame: &mut Frame, app: &mut App) {
    let main_block = Block::default().style(Style::default().bg(BACKGROUND));
    frame.render_widget(main_block, frame.area());

    let detail = app
        .expanded_row()
        .map(|row| DetailPanel::for_row(row, app.grafana()));
    let detail_height = detail
        .as_ref()
        .map_or(0, |panel| panel.resources.len() as u16 + 4);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),             // Header
            Constraint::Min(3),                // Workers table
            Constraint::Length(detail_height), // Detail panel
            Constraint::Length(1),             // Footer
        ])
        .split(frame.area());

    render_header(frame, chunks[0], app);

    if app.cluster.is_none() {
        render_waiting(frame, chunks[1], app);
    } else {
        let table = build_table(app);
        frame.render_stateful_widget(table, chunks[1], &mut app.table_state);
    }

    if let Some(panel) = detail {
        render_detail(frame, chunks[2], &panel);
    }

    render_footer(frame, chunks[3], app);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let now = Utc::now();
    let pulse = if app.frame_count % 10 < 2 { "█" } else { " " };

    let metrics_age = match app.metrics.as_ref() {
        Some(m) => {
            let taken = m.value.sampled_at().unwrap_or(m.value.fetched_at);
            format!("METRICS: {}s ago", (now - taken).num_seconds().max(0))
        }
        None => "METRICS: no data".to_string(),
    };
    let title = app.cluster_name().unwrap_or(&app.source).to_string();

    let header_text = Line::from(vec![
        Span::styled(pulse, Style::default().fg(COUNT)),
        Span::styled(
            " GPU WORKERS ",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled(title, Style::default().fg(LINK)),
        Span::styled(" │ ", Style::default().fg(ACCENT)),
        Span::styled(format!("TEAM: {}", app.team), Style::default().fg(INFO)),
        Span::styled(" │ ", Style::default().fg(ACCENT)),
        Span::styled("Show Type: ", Style::default().fg(MUTED)),
        Span::styled(
            app.filter.label().to_string(),
            Style::default().fg(CLOCK).add_modifier(Modifier::BOLD),
        ),
        Span::styled(" │ ", Style::default().fg(ACCENT)),
        Span::styled(
            format!("WORKERS: {}", app.rows().len()),
            Style::default().fg(COUNT),
        ),
        Span::styled(" │ ", Style::default().fg(ACCENT)),
        Span::styled(metrics_age, Style::default().fg(INFO)),
        Span::styled(" │ ", Style::default().fg(ACCENT)),
        Span::styled(
            format!("{}", now.format("%H:%M:%S")),
            Style::default().fg(CLOCK),
        ),
    ]);

    let header = Paragraph::new(header_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Double)
                .border_style(Style::default().fg(ACCENT)),
        )
        .style(Style::default().bg(BACKGROUND))
        .alignment(Alignment::Left);
    frame.render_widget(header, area);
}

fn render_waiting(frame: &mut Frame, area: Rect, app: &App) {
    let blink = if app.frame_count % 20 < 10 { "█" } else { " " };
    let text = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  [", Style::default().fg(ERROR)),
            Span::styled("!", Style::default().fg(CLOCK).add_modifier(Modifier::BOLD)),
            Span::styled("] ", Style::default().fg(ERROR)),
            Span::styled(
                "LOADING CLUSTER DATA",
                Style::default().fg(ERROR).add_modifier(Modifier::BOLD),
            ),
            Span::styled(blink, Style::default().fg(ACCENT)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            format!("      Waiting for {}...", app.source),
            Style::default().fg(MUTED),
        )),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .border_style(Style::default().fg(ERROR))
        .style(Style::default().bg(BACKGROUND));

    frame.render_widget(Paragraph::new(text).block(block), area);
}

/// Collects ratatui rows from the column description.
struct TerminalTable {
    kinds: Vec<ColumnKind>,
    header: Vec<TableCell<'static>>,
    widths: Vec<Constraint>,
    rows: Vec<Row<'static>>,
    sort_column: usize,
    sort_direction: SortDirection,
}

impl TerminalTable {
    fn new(sort_column: usize, sort_direction: SortDirection) -> Self {
        Self {
            kinds: Vec::new(),
            header: Vec::new(),
            widths: Vec::new(),
            rows: Vec::new(),
            sort_column,
            sort_direction,
        }
    }

    fn into_table(self, filter_label: &str) -> Table<'static> {
        let header = Row::new(self.header)
            .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD));

        Table::new(self.rows, self.widths)
            .header(header)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(BORDER))
                    .title(vec![
                        Span::styled(" ◆ ", Style::default().fg(ACCENT)),
                        Span::styled("WORKERS ", Style::default().fg(ACCENT)),
                        Span::styled("│ ", Style::default().fg(BORDER)),
                        Span::styled(filter_label.to_string(), Style::default().fg(LINK)),
                        Span::raw(" "),
                    ])
                    .style(Style::default().bg(BACKGROUND)),
            )
            .row_highlight_style(Style::default().bg(SELECTED_BG).add_modifier(Modifier::BOLD))
            .highlight_symbol("▶ ")
    }
}

impl TableSurface for TerminalTable {
    fn describe_columns(&mut self, columns: &[Column]) {
        self.kinds = columns.iter().map(|c| c.kind.clone()).collect();
        self.widths = columns.iter().map(column_width).collect();
        self.header = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let mut title = column.title.clone();
                if i == self.sort_column {
                    title = format!("{title} {}", self.sort_direction.arrow());
                }
                let line = Line::from(title);
                let line = if column.numeric {
                    line.alignment(Alignment::Right)
                } else {
                    line
                };
                TableCell::from(line)
            })
            .collect();
    }

    fn render_row(&mut self, row: &WorkerRow, cells: Vec<Cell>) {
        let cells: Vec<TableCell<'static>> = cells
            .into_iter()
            .zip(&self.kinds)
            .map(|(cell, kind)| terminal_cell(cell, kind, row))
            .collect();
        self.rows.push(Row::new(cells));
    }
}

fn column_width(column: &Column) -> Constraint {
    match column.kind {
        ColumnKind::Id => Constraint::Min(14),
        _ => Constraint::Length((column.title.chars().count() + 2).clamp(7, 16) as u16),
    }
}

fn terminal_cell(cell: Cell, kind: &ColumnKind, row: &WorkerRow) -> TableCell<'static> {
    match cell {
        Cell::Link { text, warning } => {
            let mut spans = Vec::new();
            if warning {
                spans.push(Span::styled(WARNING_GLYPH, Style::default().fg(ERROR)));
            }
            spans.push(Span::styled(
                text,
                Style::default().fg(LINK).add_modifier(Modifier::UNDERLINED),
            ));
            TableCell::from(Line::from(spans))
        }
        Cell::Text(text) => TableCell::from(Line::from(Span::styled(
            text,
            Style::default().fg(MUTED),
        ))),
        Cell::Numeric(text) => {
            let style = match (kind, row.gpu_utilization) {
                (ColumnKind::GpuUtilization, Some(util)) => Style::default()
                    .fg(utilization_color(util))
                    .add_modifier(Modifier::BOLD),
                _ => Style::default().fg(INFO),
            };
            TableCell::from(Line::from(Span::styled(text, style)).alignment(Alignment::Right))
        }
    }
}

fn build_table(app: &App) -> Table<'static> {
    let mut surface = TerminalTable::new(app.sort_column, app.sort_direction);
    render_table(&mut surface, app.columns(), app.rows());
    surface.into_table(app.filter.label())
}

fn render_detail(frame: &mut Frame, area: Rect, panel: &DetailPanel) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER))
        .title(vec![
            Span::styled(" ◇ METRICS ", Style::default().fg(ACCENT)),
            Span::styled("│ ", Style::default().fg(BORDER)),
            Span::styled(panel.worker.clone(), Style::default().fg(LINK)),
            Span::raw(" "),
        ])
        .style(Style::default().bg(BACKGROUND));

    let dashboard = match &panel.dashboard_url {
        Some(url) => Span::styled(url.clone(), Style::default().fg(LINK)),
        None => Span::styled("no grafana url configured", Style::default().fg(MUTED)),
    };
    let utilization = if panel.gpu_utilization.is_empty() {
        "-".to_string()
    } else {
        panel.gpu_utilization.clone()
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled("  Dashboard: ", Style::default().fg(MUTED)),
            dashboard,
        ]),
        Line::from(vec![
            Span::styled("  GPU Utilization: ", Style::default().fg(MUTED)),
            Span::styled(utilization, Style::default().fg(CLOCK)),
        ]),
    ];
    for (resource, values) in &panel.resources {
        let mut spans = vec![Span::styled(
            format!("  {resource:<8}"),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        )];
        for (kind, value) in values {
            spans.push(Span::styled(
                format!(" {}: ", kind.name()),
                Style::default().fg(MUTED),
            ));
            spans.push(Span::styled(value.clone(), Style::default().fg(INFO)));
        }
        lines.push(Line::from(spans));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        " q quit · ↑↓ select · t/T type · space details · s/S sort · enter pods ",
        Style::default().fg(MUTED),
    )];
    if let Some(status) = &app.status {
        spans.push(Span::styled("│ ", Style::default().fg(BORDER)));
        spans.push(Span::styled(status.clone(), Style::default().fg(CLOCK)));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BACKGROUND)),
        area,
    );
}
