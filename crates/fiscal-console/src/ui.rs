use crate::app::App;
use chrono::{DateTime, Local, Utc};
use fiscal_core::contracts::display_value;
use fiscal_core::{Connectivity, Disposition, FiscalDayPhase, QueueItem, Severity};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Tabs, Wrap},
};

const COMPACT_WIDTH: u16 = 92;
const LOG_PANEL_HEIGHT: u16 = 12;

#[derive(Clone, Copy)]
pub struct ConsoleTheme {
    bg: Color,
    surface: Color,
    border: Color,
    title: Color,
    text: Color,
    muted: Color,
    accent: Color,
    ok: Color,
    warn: Color,
    critical: Color,
    info: Color,
}

pub fn console_theme() -> ConsoleTheme {
    ConsoleTheme {
        bg: Color::Rgb(11, 18, 32),
        surface: Color::Rgb(17, 26, 46),
        border: Color::Rgb(71, 85, 105),
        title: Color::Rgb(191, 219, 254),
        text: Color::Rgb(226, 232, 240),
        muted: Color::Rgb(148, 163, 184),
        accent: Color::Rgb(56, 189, 248),
        ok: Color::Rgb(34, 197, 94),
        warn: Color::Rgb(245, 158, 11),
        critical: Color::Rgb(239, 68, 68),
        info: Color::Rgb(59, 130, 246),
    }
}

pub fn render_ui(frame: &mut ratatui::Frame, app: &App) {
    let size = frame.size();
    let theme = console_theme();
    let offline = !app.snapshot.connectivity.is_online();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(if offline { 3 } else { 0 }),
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(LOG_PANEL_HEIGHT),
        ])
        .split(size);
    frame.render_widget(render_header(app, theme), layout[0]);
    if offline {
        frame.render_widget(render_offline_notice(app, theme), layout[1]);
    }
    render_status_cards(frame, app, theme, layout[2]);
    frame.render_widget(render_operations(app, theme), layout[3]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(if is_compact(size.width) {
            [Constraint::Percentage(100), Constraint::Percentage(0)]
        } else {
            [Constraint::Percentage(62), Constraint::Percentage(38)]
        })
        .split(layout[4]);
    render_receipts(frame, app, theme, body[0]);
    if !is_compact(size.width) {
        frame.render_widget(render_config(app, theme), body[1]);
    }
    frame.render_widget(render_activity_log(app, theme), layout[5]);

    if app.help_open {
        render_help_overlay(frame, theme);
    }
}

fn panel(title: &str, theme: ConsoleTheme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.border))
        .style(Style::default().bg(theme.surface))
        .title(Span::styled(
            title.to_string(),
            Style::default()
                .fg(theme.title)
                .add_modifier(Modifier::BOLD),
        ))
}

fn render_header(app: &App, theme: ConsoleTheme) -> Paragraph<'static> {
    let snapshot = &app.snapshot;
    let mut spans = vec![
        Span::styled(
            format!("Fiscal Console v{}", env!("CARGO_PKG_VERSION")),
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(
            snapshot.display_name.clone(),
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(app.bridge_url.clone(), Style::default().fg(theme.muted)),
    ];
    if let Some(at) = snapshot.last_status_at {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("status {}", format_clock(at)),
            Style::default().fg(theme.muted),
        ));
    }
    Paragraph::new(Line::from(spans))
        .style(Style::default().fg(theme.text).bg(theme.bg))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .style(Style::default().bg(theme.bg)),
        )
}

fn render_offline_notice(app: &App, theme: ConsoleTheme) -> Paragraph<'static> {
    let text = format!(
        "Bridge unreachable at {}. Showing last known values; polling continues.",
        app.bridge_url
    );
    Paragraph::new(Line::from(Span::styled(
        text,
        Style::default()
            .fg(theme.critical)
            .add_modifier(Modifier::BOLD),
    )))
    .style(Style::default().bg(theme.bg))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.critical))
            .style(Style::default().bg(theme.bg)),
    )
}

fn render_status_cards(frame: &mut ratatui::Frame, app: &App, theme: ConsoleTheme, area: Rect) {
    let snapshot = &app.snapshot;
    let cards = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25); 4])
        .split(area);

    let link = match snapshot.connectivity {
        Connectivity::Online => ("ONLINE", theme.ok),
        Connectivity::Offline => ("OFFLINE", theme.critical),
    };
    let mode = match snapshot.upstream_online {
        Some(true) => ("ONLINE", theme.ok),
        Some(false) => ("OFFLINE MODE", theme.warn),
        None => ("UNKNOWN", theme.muted),
    };
    let phase_note = if snapshot.phase_source == fiscal_core::PhaseSource::Optimistic {
        " (pending)"
    } else {
        ""
    };
    let phase = (
        format!("{}{phase_note}", snapshot.phase.label()),
        phase_color(snapshot.phase, theme),
    );
    let watcher = if snapshot.watcher_running {
        ("RUNNING", theme.ok)
    } else {
        ("STOPPED", theme.warn)
    };

    let entries = [
        ("Bridge Link", link.0.to_string(), link.1),
        ("Operating Mode", mode.0.to_string(), mode.1),
        ("Fiscal Day", phase.0, phase.1),
        ("File Watcher", watcher.0.to_string(), watcher.1),
    ];
    for ((title, value, color), area) in entries.into_iter().zip(cards.iter()) {
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                value,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )))
            .block(panel(title, theme)),
            *area,
        );
    }
}

fn render_operations(app: &App, theme: ConsoleTheme) -> Paragraph<'static> {
    let key = |label: &'static str| {
        Span::styled(
            label,
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )
    };
    let mut spans = vec![
        key("o"),
        Span::raw(" open day  "),
        key("c"),
        Span::raw(" close day  "),
        key("s"),
        Span::raw(" force sync  "),
        key("g"),
        Span::raw(" status  "),
        key("f"),
        Span::raw(" config  "),
        key("?"),
        Span::raw(" help"),
    ];
    if let Some(note) = app.note.as_deref() {
        spans.push(Span::raw("   "));
        spans.push(Span::styled(note.to_string(), Style::default().fg(theme.warn)));
    }
    Paragraph::new(Line::from(spans))
        .style(Style::default().fg(theme.text))
        .block(panel("Operations", theme))
}

fn render_receipts(frame: &mut ratatui::Frame, app: &App, theme: ConsoleTheme, area: Rect) {
    let snapshot = &app.snapshot;
    let block = panel("Receipt Centre", theme);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(inner);

    let titles: Vec<Line<'static>> = Disposition::ALL
        .iter()
        .map(|tab| {
            Line::from(format!(
                "{} ({})",
                tab.title(),
                snapshot.queue_count(*tab)
            ))
        })
        .collect();
    let selected = Disposition::ALL
        .iter()
        .position(|tab| *tab == app.receipt_tab)
        .unwrap_or(0);
    frame.render_widget(
        Tabs::new(titles)
            .select(selected)
            .style(Style::default().fg(theme.muted))
            .highlight_style(
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
        parts[0],
    );

    let items: Vec<&QueueItem> = snapshot.queue_for(app.receipt_tab).collect();
    let lines = if items.is_empty() {
        vec![Line::from(Span::styled(
            format!("No {} receipts.", app.receipt_tab.as_str()),
            Style::default().fg(theme.muted),
        ))]
    } else {
        items
            .into_iter()
            .map(|item| receipt_line(item, theme))
            .collect()
    };
    frame.render_widget(
        Paragraph::new(Text::from(lines)).style(Style::default().fg(theme.text)),
        parts[1],
    );
}

fn receipt_line(item: &QueueItem, theme: ConsoleTheme) -> Line<'static> {
    let mut spans = vec![
        Span::styled(
            format!("{:<14}", ellipsize(&item.invoice_number, 14)),
            Style::default().fg(theme.text).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("{:>12.2}", item.amount), Style::default().fg(theme.ok)),
        Span::raw("  "),
        Span::styled(
            item.occurred_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            Style::default().fg(theme.muted),
        ),
    ];
    if item.pdf_path.is_some() {
        spans.push(Span::styled("  pdf", Style::default().fg(theme.info)));
    }
    Line::from(spans)
}

fn render_config(app: &App, theme: ConsoleTheme) -> Paragraph<'static> {
    let snapshot = &app.snapshot;
    let lines: Vec<Line<'static>> = if !snapshot.config_loaded {
        vec![Line::from(Span::styled(
            "Config not loaded yet. Press f to fetch.",
            Style::default().fg(theme.muted),
        ))]
    } else if snapshot.config.is_empty() {
        vec![Line::from(Span::styled(
            "Bridge returned an empty config.",
            Style::default().fg(theme.muted),
        ))]
    } else {
        snapshot
            .config
            .entries()
            .map(|(field, value)| {
                Line::from(vec![
                    Span::styled(format!("{field}: "), Style::default().fg(theme.muted)),
                    Span::styled(display_value(value), Style::default().fg(theme.text)),
                ])
            })
            .collect()
    };
    Paragraph::new(Text::from(lines))
        .style(Style::default().fg(theme.text))
        .block(panel("Configuration", theme))
        .wrap(Wrap { trim: true })
}

fn render_activity_log(app: &App, theme: ConsoleTheme) -> Paragraph<'static> {
    let lines: Vec<Line<'static>> = app
        .snapshot
        .log
        .iter()
        .map(|entry| {
            let (tag, color) = match entry.severity() {
                Severity::Success => ("OK ", theme.ok),
                Severity::Error => ("ERR", theme.critical),
                Severity::Info => ("INF", theme.info),
            };
            Line::from(vec![
                Span::styled(
                    format_clock(entry.occurred_at()),
                    Style::default().fg(theme.muted),
                ),
                Span::raw(" "),
                Span::styled(tag, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(" "),
                Span::styled(entry.message().to_string(), Style::default().fg(theme.text)),
            ])
        })
        .collect();
    Paragraph::new(Text::from(lines))
        .style(Style::default().fg(theme.text))
        .block(panel("Activity", theme))
        .scroll((app.log_scroll, 0))
}

fn render_help_overlay(frame: &mut ratatui::Frame, theme: ConsoleTheme) {
    let area = centered_rect(64, 60, frame.size());
    let heading = |text: &'static str| {
        Line::from(Span::styled(
            text,
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ))
    };
    let lines = vec![
        heading("Fiscal Day"),
        Line::from("  o        open fiscal day"),
        Line::from("  c        close fiscal day"),
        Line::from("  s        force sync of pending receipts"),
        Line::from(""),
        heading("Bridge"),
        Line::from("  g        fetch status now"),
        Line::from("  f        fetch configuration"),
        Line::from(""),
        heading("Navigation"),
        Line::from("  1/2/3    signed / sent / excluded receipts"),
        Line::from("  Tab      next receipt tab"),
        Line::from("  j/k      scroll activity log"),
        Line::from("  ? or F1  toggle this help"),
        Line::from("  q        quit"),
    ];
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .style(Style::default().fg(theme.text).bg(theme.surface))
            .block(panel("Help", theme))
            .wrap(Wrap { trim: false }),
        area,
    );
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

fn phase_color(phase: FiscalDayPhase, theme: ConsoleTheme) -> Color {
    match phase {
        FiscalDayPhase::Open => theme.ok,
        FiscalDayPhase::CloseInitiated => theme.warn,
        FiscalDayPhase::Closed => theme.info,
        FiscalDayPhase::Unknown => theme.muted,
    }
}

fn format_clock(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn is_compact(width: u16) -> bool {
    width < COMPACT_WIDTH
}

fn ellipsize(input: &str, max: usize) -> String {
    if input.chars().count() <= max {
        return input.to_string();
    }
    let keep = max.saturating_sub(1);
    let mut out: String = input.chars().take(keep).collect();
    out.push('~');
    out
}
