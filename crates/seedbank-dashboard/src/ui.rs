use crate::edit::{EditForm, FIELD_LABELS};
use crate::state::{App, Liveness, Mode};
use crate::theme;
use chrono::Local;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        block::Title, Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, Wrap,
    },
    Frame,
};
use seedbank_core::{
    format::{display_value, format_date, format_score, or_dash, payload_summary, truncate},
    overlay::{place_overlay, wrapped_height, Point, Size},
    view::SortKey,
    Seed,
};

const CONTENT_PREVIEW: usize = 60;
const DETAIL_WIDTH: u16 = 44;
/// Cells between the pointer and the detail panel.
const DETAIL_OFFSET: i32 = 1;
const FIXED_WIDTHS: [u16; 5] = [7, 12, 18, 7, 13];
const COLUMN_SPACING: u16 = 1;

pub fn render(f: &mut Frame, app: &mut App) {
    let area = f.size();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(2),
        ])
        .split(area);
    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(68), Constraint::Percentage(32)])
        .split(rows[1]);

    render_header(f, app, rows[0]);
    render_seeds(f, app, main[0]);
    render_activity(f, app, main[1]);
    render_footer(f, app, rows[2]);

    match &app.mode {
        Mode::Help => render_help(f, area),
        Mode::Form(form) => render_form(f, form, area),
        Mode::Normal | Mode::Filter => render_detail(f, app, area),
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let (badge, color) = match app.liveness() {
        Liveness::Live => ("● LIVE", theme::LIVE),
        Liveness::Offline => ("○ OFFLINE", theme::ERROR),
        Liveness::Connecting => ("… CONNECTING", theme::WARN),
    };
    let stats = app
        .seeds
        .snapshot()
        .map(|bundle| bundle.stats)
        .unwrap_or_default();

    let mut spans = vec![
        Span::styled(badge, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        Span::raw("   "),
        Span::styled("seeds ", Style::default().fg(theme::MUTED)),
        Span::raw(stats.seeds_count.to_string()),
        Span::raw("   "),
        Span::styled("contexts ", Style::default().fg(theme::MUTED)),
        Span::raw(stats.agent_contexts_count.to_string()),
        Span::raw("   "),
        Span::styled("query ", Style::default().fg(theme::MUTED)),
        Span::raw(format!("\"{}\"", app.remote_query())),
    ];
    if let Some(err) = app.seeds.last_error() {
        spans.push(Span::raw("   "));
        spans.push(Span::styled(err.to_string(), Style::default().fg(theme::ERROR)));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(" Seedbank ", theme::HEADER_STYLE))
        .title(Title::from(Local::now().format(" %H:%M:%S ").to_string()).alignment(Alignment::Right));
    f.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

/// Column widths for a table body `total` cells wide. Content takes the rest.
fn column_widths(total: u16) -> [u16; 6] {
    let fixed: u16 = FIXED_WIDTHS.iter().sum();
    let spacing = COLUMN_SPACING * (FIXED_WIDTHS.len() as u16);
    let content = total.saturating_sub(fixed + spacing).max(10);
    [
        FIXED_WIDTHS[0],
        content,
        FIXED_WIDTHS[1],
        FIXED_WIDTHS[2],
        FIXED_WIDTHS[3],
        FIXED_WIDTHS[4],
    ]
}

fn header_cells(inner: Rect, widths: &[u16; 6]) -> Vec<(SortKey, Rect)> {
    let mut x = inner.x;
    let mut cells = Vec::with_capacity(widths.len());
    for (key, width) in SortKey::COLUMNS.iter().zip(widths.iter()) {
        let width = (*width).min(inner.right().saturating_sub(x));
        cells.push((*key, Rect::new(x, inner.y, width, 1)));
        x = x.saturating_add(width + COLUMN_SPACING);
    }
    cells
}

fn render_seeds(f: &mut Frame, app: &mut App, area: Rect) {
    let total = app.total_seeds();
    let visible = app.visible_rows().len();
    let count = if app.filter_text().is_empty() {
        total.to_string()
    } else {
        format!("{visible} / {total}")
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(format!(" Seeds {count} "), theme::HEADER_STYLE))
        .border_style(Style::default().fg(theme::ACCENT));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);
    render_filter_bar(f, app, parts[0]);
    let table_area = parts[1];

    if app.seeds.snapshot().is_none() {
        let message = match app.seeds.last_error() {
            Some(err) => Line::from(Span::styled(err.to_string(), Style::default().fg(theme::ERROR))),
            None => Line::from(Span::styled(
                format!("Waiting for {} …", app.api_base),
                Style::default().fg(theme::MUTED),
            )),
        };
        f.render_widget(
            Paragraph::new(vec![message, Line::from(""), Line::from("Press r to retry, q to quit.")])
                .wrap(Wrap { trim: true }),
            table_area,
        );
        return;
    }

    let widths = column_widths(table_area.width);
    let sort = app.sort();
    let header = Row::new(SortKey::COLUMNS.iter().map(|key| {
        Cell::from(format!("{}{}", key.label(), sort.indicator(*key)))
    }))
    .style(theme::HEADER_STYLE);

    let hovered = app.hover.hovered().copied();
    let rows: Vec<Row> = app
        .visible_rows()
        .into_iter()
        .enumerate()
        .map(|(idx, seed)| {
            let style = if hovered == Some(seed.id) {
                theme::HOVERED_STYLE
            } else {
                theme::zebra_row_style(idx)
            };
            seed_row(seed).style(style)
        })
        .collect();

    let table = Table::new(rows, widths.map(Constraint::Length))
        .header(header)
        .column_spacing(COLUMN_SPACING)
        .highlight_style(theme::SELECTED_STYLE);
    f.render_stateful_widget(table, table_area, &mut app.table_state);

    let body = Rect {
        y: table_area.y.saturating_add(1),
        height: table_area.height.saturating_sub(1),
        ..table_area
    };
    app.update_layout(body, header_cells(table_area, &widths));
}

fn seed_row(seed: &Seed) -> Row<'static> {
    let single_line = seed.content.replace('\n', " ");
    let tag = seed.meta_str("tag");
    let mut tag_spans = Vec::new();
    if !tag.is_empty() {
        tag_spans.push(Span::styled(tag.to_string(), theme::tag_badge_style(tag)));
    }
    for extra in seed.meta_tags() {
        if !tag_spans.is_empty() {
            tag_spans.push(Span::raw(" "));
        }
        tag_spans.push(Span::styled(format!("#{extra}"), Style::default().fg(theme::MUTED)));
    }
    if tag_spans.is_empty() {
        tag_spans.push(Span::styled(or_dash("").to_string(), Style::default().fg(theme::MUTED)));
    }

    Row::new(vec![
        Cell::from(format!("#{}", seed.id)),
        Cell::from(truncate(&single_line, CONTENT_PREVIEW)),
        Cell::from(or_dash(seed.meta_str("source")).to_string()),
        Cell::from(Line::from(tag_spans)),
        Cell::from(Span::styled(
            format_score(seed.score),
            Style::default().fg(theme::score_color(seed.score)),
        )),
        Cell::from(format_date(&seed.created_at)),
    ])
}

fn render_filter_bar(f: &mut Frame, app: &App, area: Rect) {
    let editing = matches!(app.mode, Mode::Filter);
    let line = if editing {
        Line::from(vec![
            Span::styled("/ ", Style::default().fg(theme::WARN)),
            Span::raw(app.filter_text().to_string()),
            Span::styled("▏", Style::default().fg(theme::WARN)),
            Span::styled(
                "  Enter search · Esc done · Ctrl-U clear",
                Style::default().fg(theme::MUTED),
            ),
        ])
    } else if app.filter_text().is_empty() {
        Line::from(Span::styled(
            "/ filter  1-6 sort  e edit  n new",
            Style::default().fg(theme::MUTED),
        ))
    } else {
        Line::from(vec![
            Span::styled("filter ", Style::default().fg(theme::MUTED)),
            Span::styled(app.filter_text().to_string(), Style::default().fg(theme::ACCENT)),
        ])
    };
    f.render_widget(Paragraph::new(line), area);
}

fn render_activity(f: &mut Frame, app: &App, area: Rect) {
    let filter_label = app.memory_filter.map_or("ALL", |memory_type| memory_type.label());
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" Activity · {filter_label} "),
            theme::HEADER_STYLE,
        ))
        .border_style(Style::default().fg(theme::ACCENT));

    let Some(contexts) = app.contexts.snapshot() else {
        let message = app
            .contexts
            .last_error()
            .map(str::to_string)
            .unwrap_or_else(|| "Loading agent activity …".to_string());
        f.render_widget(
            Paragraph::new(Span::styled(message, Style::default().fg(theme::MUTED)))
                .wrap(Wrap { trim: true })
                .block(block),
            area,
        );
        return;
    };

    if contexts.is_empty() {
        f.render_widget(
            Paragraph::new(Span::styled("No agent activity", Style::default().fg(theme::MUTED)))
                .block(block),
            area,
        );
        return;
    }

    let width = block.inner(area).width as usize;
    let items: Vec<ListItem> = contexts
        .iter()
        .map(|ctx| {
            let color = theme::memory_type_color(ctx.memory_type);
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(
                        format!("[{}]", ctx.memory_type.label()),
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(" "),
                    Span::styled(ctx.agent_id.clone(), Style::default().fg(Color::White)),
                    Span::raw(" "),
                    Span::styled(format_date(&ctx.created_at), Style::default().fg(theme::MUTED)),
                ]),
                Line::from(Span::styled(
                    truncate(&payload_summary(&ctx.payload), width.saturating_sub(2).max(8)),
                    Style::default().fg(theme::MUTED),
                )),
            ])
        })
        .collect();
    f.render_widget(List::new(items).block(block), area);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let source = Line::from(vec![
        Span::styled("api ", Style::default().fg(theme::MUTED)),
        Span::raw(app.api_base.clone()),
        Span::styled(
            format!("  ·  search every {}s", app.seed_poll.as_secs()),
            Style::default().fg(theme::MUTED),
        ),
    ]);
    let hints = match &app.status_note {
        Some(note) => Line::from(Span::styled(note.clone(), Style::default().fg(theme::WARN))),
        None => Line::from(Span::styled(
            "r refresh  m memory type  Enter details  ? help  q quit",
            Style::default().fg(theme::MUTED),
        )),
    };
    f.render_widget(Paragraph::new(vec![source, hints]), area);
}

/// Lines of the detail panel before wrapping.
fn detail_lines(seed: &Seed) -> Vec<String> {
    let mut lines = vec![
        format!(
            "#{}  {}  {}",
            seed.id,
            format_score(seed.score),
            format_date(&seed.created_at)
        ),
        String::new(),
    ];
    lines.extend(seed.content.lines().map(str::to_string));
    lines.push(String::new());
    lines.push(format!("source: {}", or_dash(seed.meta_str("source"))));
    lines.push(format!("tag: {}", or_dash(seed.meta_str("tag"))));
    for (key, value) in seed.extra_metadata() {
        lines.push(format!("{key}: {}", display_value(value)));
    }
    lines
}

fn wrap_chars(line: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(width.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Clamps a placement to the frame. Returns `None` when nothing is visible.
fn clip_to_frame(left: i32, top: i32, width: u16, height: u16, frame: Rect) -> Option<Rect> {
    let x = left.clamp(0, i32::from(frame.width)) as u16;
    let y = top.clamp(0, i32::from(frame.height)) as u16;
    let width = width.min(frame.width.saturating_sub(x));
    let height = height.min(frame.height.saturating_sub(y));
    (width > 0 && height > 0).then(|| Rect::new(frame.x + x, frame.y + y, width, height))
}

fn render_detail(f: &mut Frame, app: &App, area: Rect) {
    let Some(seed) = app.detail_seed() else {
        return;
    };
    let width = DETAIL_WIDTH.min(area.width);
    let inner_width = usize::from(width.saturating_sub(2));
    let lines = detail_lines(seed);
    let height = wrapped_height(lines.iter().map(String::as_str), inner_width) as u16 + 2;

    let panel = Size {
        width: i32::from(width),
        height: i32::from(height),
    };
    let viewport = Size {
        width: i32::from(area.width),
        height: i32::from(area.height),
    };
    let placement = match app.hover.placement(panel, viewport, DETAIL_OFFSET) {
        Some(placement) => placement,
        None => {
            let center = Point {
                x: i32::from(area.width.saturating_sub(width) / 2) - DETAIL_OFFSET,
                y: i32::from(area.height.saturating_sub(height) / 2) - DETAIL_OFFSET,
            };
            place_overlay(center, panel, viewport, DETAIL_OFFSET)
        }
    };
    let Some(rect) = clip_to_frame(placement.left, placement.top, width, height, area) else {
        return;
    };

    let text: Vec<Line> = lines
        .iter()
        .enumerate()
        .flat_map(|(idx, line)| {
            let style = if idx == 0 {
                Style::default().fg(theme::ACCENT).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            wrap_chars(line, inner_width)
                .into_iter()
                .map(move |chunk| Line::from(Span::styled(chunk, style)))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Seed ")
        .border_style(Style::default().fg(theme::ACCENT));
    f.render_widget(Clear, rect);
    f.render_widget(Paragraph::new(text).block(block), rect);
}

fn render_form(f: &mut Frame, form: &EditForm, area: Rect) {
    let rect = centered_rect(70, 70, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(form.title(), theme::HEADER_STYLE))
        .border_style(Style::default().fg(theme::WARN));
    let inner = block.inner(rect);
    f.render_widget(Clear, rect);
    f.render_widget(block, rect);

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(2),
        ])
        .split(inner);

    for (idx, label) in FIELD_LABELS.iter().enumerate() {
        let focused = form.focus == idx;
        let border = if focused {
            Style::default().fg(theme::WARN)
        } else {
            Style::default().fg(theme::MUTED)
        };
        let mut value = form.fields[idx].clone();
        if focused {
            value.push('▏');
        }
        let field = Paragraph::new(value)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title(*label).border_style(border));
        f.render_widget(field, sections[idx]);
    }

    let status = if form.saving {
        Line::from(Span::styled("Saving…", Style::default().fg(theme::WARN)))
    } else if let Some(err) = &form.error {
        Line::from(Span::styled(err.clone(), Style::default().fg(theme::ERROR)))
    } else {
        Line::from(Span::styled(
            "Tab next field · Ctrl-S save · Esc cancel",
            Style::default().fg(theme::MUTED),
        ))
    };
    f.render_widget(Paragraph::new(status), sections[4]);
}

fn render_help(f: &mut Frame, area: Rect) {
    let rect = centered_rect(60, 70, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Help")
        .border_style(Style::default().fg(Color::Yellow));
    let entries = [
        ("j / Down", "Next seed"),
        ("k / Up", "Previous seed"),
        ("1-6", "Sort by column (again to reverse)"),
        ("/", "Filter the page; Enter searches the store"),
        ("Ctrl-U", "Clear filter and search"),
        ("Enter", "Pin details of the selected seed"),
        ("e", "Edit selected seed"),
        ("n", "New seed"),
        ("m", "Cycle memory type of the activity stream"),
        ("r", "Refresh now"),
        ("?", "Toggle help"),
        ("q", "Quit"),
    ];
    let mut text = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    text.extend(entries.iter().map(|(keys, what)| {
        Line::from(vec![
            Span::styled(format!("{keys:<10}"), Color::Cyan),
            Span::raw(*what),
        ])
    }));
    f.render_widget(Clear, rect);
    f.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }).block(block), rect);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100u16.saturating_sub(percent_y)) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100u16.saturating_sub(percent_x)) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Args, Config, FileConfig};
    use crate::poller::{PollEvent, SeedBundle};
    use crossterm::event::{MouseEvent, MouseEventKind};
    use ratatui::{backend::TestBackend, buffer::Buffer, Terminal};
    use seedbank_core::Stats;
    use seedbank_storage::{MemoryBackend, PreferenceStore};
    use serde_json::json;
    use std::sync::Arc;

    fn app() -> App {
        let config = Config::resolve(&Args::default(), FileConfig::default());
        let mut app = App::new(&config, PreferenceStore::new(Box::new(MemoryBackend::new())));
        let seed: Seed = serde_json::from_value(json!({
            "id": 1,
            "content": "Der Hund bellt laut",
            "metadata": {"source": "telegram", "tag": "Tier", "tags": ["haus"], "lang": "de"},
            "created_at": "",
            "score": 0.876
        }))
        .unwrap();
        app.apply_seed_event(PollEvent::Settled(Arc::new(SeedBundle {
            seeds: vec![seed],
            stats: Stats {
                seeds_count: 42,
                agent_contexts_count: 3,
            },
            healthy: true,
        })));
        app
    }

    fn text(buffer: &Buffer) -> String {
        let mut out = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                out.push_str(buffer.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn renders_header_and_rows() {
        let mut app = app();
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| render(f, &mut app)).unwrap();
        let screen = text(terminal.backend().buffer());

        assert!(screen.contains("LIVE"));
        assert!(screen.contains("42"));
        assert!(screen.contains("#1"));
        assert!(screen.contains("87.6%"));
        assert!(screen.contains("ID ▲"));
        assert!(screen.contains("telegram"));
        assert!(screen.contains(" Seeds 42 "));
    }

    #[test]
    fn seed_counter_shows_visible_over_store_total_when_filtered() {
        let mut app = app();
        app.handle_key(crossterm::event::KeyEvent::from(crossterm::event::KeyCode::Char('/')));
        app.handle_key(crossterm::event::KeyEvent::from(crossterm::event::KeyCode::Char('z')));
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| render(f, &mut app)).unwrap();
        let screen = text(terminal.backend().buffer());
        assert!(screen.contains(" Seeds 0 / 42 "));
    }

    #[test]
    fn hovering_a_row_opens_detail_panel() {
        let mut app = app();
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| render(f, &mut app)).unwrap();

        // header 3 rows, table border 1, filter bar 1, column header 1
        app.handle_mouse(MouseEvent {
            kind: MouseEventKind::Moved,
            column: 20,
            row: 6,
            modifiers: crossterm::event::KeyModifiers::NONE,
        });
        assert_eq!(app.hover.hovered(), Some(&1));
        terminal.draw(|f| render(f, &mut app)).unwrap();
        let screen = text(terminal.backend().buffer());
        assert!(screen.contains(" Seed "));
        assert!(screen.contains("lang: de"));
    }

    #[test]
    fn column_widths_fill_the_table() {
        let widths = column_widths(100);
        let used: u16 = widths.iter().sum::<u16>() + COLUMN_SPACING * 5;
        assert_eq!(used, 100);
        let cells = header_cells(Rect::new(2, 4, 100, 5), &widths);
        assert_eq!(cells[0].1, Rect::new(2, 4, 7, 1));
        assert_eq!(cells[1].1.x, 10);
    }

    #[test]
    fn wrapping_matches_measured_height() {
        let lines = ["abcdefghij".to_string(), String::new(), "abc".to_string()];
        let measured = wrapped_height(lines.iter().map(String::as_str), 4);
        let wrapped: usize = lines.iter().map(|line| wrap_chars(line, 4).len()).sum();
        assert_eq!(measured, wrapped);
        assert_eq!(measured, 5);
    }

    #[test]
    fn clipping_keeps_panels_on_screen() {
        let frame = Rect::new(0, 0, 80, 24);
        assert_eq!(
            clip_to_frame(70, -5, 44, 10, frame),
            Some(Rect::new(70, 0, 10, 10))
        );
        assert_eq!(clip_to_frame(90, 0, 44, 10, frame), None);
    }
}
