mod tui_app;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table},
    Frame, Terminal,
};

use odds_radar::config::Config;
use odds_radar::signal::classify;
use odds_radar::types::{MarketKind, SignalCategory};
use tui_app::{format_clock, truncate, AppState, ConnectionStatus};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    let mut app = match AppState::bootstrap(&cfg).await {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Bootstrap error: {e}");
            std::process::exit(1);
        }
    };

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut match_list_state = ListState::default();
    match_list_state.select(Some(0));

    let result = run_loop(&mut terminal, &mut app, &cfg, &mut match_list_state).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    cfg: &Config,
    match_state: &mut ListState,
) -> io::Result<()> {
    let refresh_interval = Duration::from_secs(cfg.poll_interval_secs);
    let mut last_tick = std::time::Instant::now();

    loop {
        terminal.draw(|f| render(f, app, match_state))?;

        // Drain realtime invalidations before waiting on the keyboard.
        while let Ok(notice) = app.notice_rx.try_recv() {
            app.apply_notice(notice).await;
        }

        let timeout = refresh_interval
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO)
            .min(Duration::from_millis(250));

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => {
                            app.refresh().await;
                            last_tick = std::time::Instant::now();
                        }
                        KeyCode::Char('1') => app.active_tab = MarketKind::Handicap,
                        KeyCode::Char('2') => app.active_tab = MarketKind::OverUnder,
                        KeyCode::Char('3') => app.active_tab = MarketKind::Moneyline,
                        KeyCode::Tab => app.next_tab(),
                        KeyCode::Down | KeyCode::Char('j') => {
                            if app.select_next() {
                                match_state.select(Some(app.selected));
                                app.activate_selected().await;
                                last_tick = std::time::Instant::now();
                            }
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            if app.select_prev() {
                                match_state.select(Some(app.selected));
                                app.activate_selected().await;
                                last_tick = std::time::Instant::now();
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= refresh_interval {
            app.refresh().await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, match_state: &mut ListState) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header / scoreboard
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, match_state, chunks[1]);
    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● live".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 32)), Color::Red),
    };

    let info = app.board.match_info();
    let refreshing = if app.board.is_refreshing() { "  ⟳" } else { "" };

    let title_spans = vec![
        Span::styled(
            " Odds Radar  ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(
            format!("{} {} {}", info.home_team, info.score, info.away_team),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  │  "),
        Span::styled(format!("⏱ {}", format_clock(&info.clock)), Style::default().fg(Color::White)),
        Span::styled(refreshing, Style::default().fg(Color::DarkGray)),
    ];

    let paragraph = Paragraph::new(Line::from(title_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );

    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &AppState, match_state: &mut ListState, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
        .split(area);

    render_match_list(f, app, match_state, halves[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // market tabs
            Constraint::Length(6), // current signal panel
            Constraint::Min(0),    // history
        ])
        .split(halves[1]);

    render_tabs(f, app, right[0]);
    render_signal_panel(f, app, right[1]);
    render_history(f, app, right[2]);
}

fn render_match_list(f: &mut Frame, app: &AppState, state: &mut ListState, area: Rect) {
    let items: Vec<ListItem> = app
        .matches
        .iter()
        .map(|m| ListItem::new(truncate(&m.display_name(), 30)))
        .collect();

    let title = match &app.discovery_error {
        Some(e) => format!(" MATCHES — error: {} ", truncate(e, 20)),
        None => " MATCHES ".to_string(),
    };
    let title_color = if app.discovery_error.is_some() { Color::Red } else { Color::Cyan };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(Span::styled(
                    title,
                    Style::default().fg(title_color).add_modifier(Modifier::BOLD),
                )),
        )
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    f.render_stateful_widget(list, area, state);
}

fn render_tabs(f: &mut Frame, app: &AppState, area: Rect) {
    let mut spans = Vec::new();
    for (i, kind) in MarketKind::ALL.into_iter().enumerate() {
        let style = if kind == app.active_tab {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" [{}] {} ", i + 1, kind.label()), style));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn category_color(category: SignalCategory) -> Color {
    match category {
        SignalCategory::Entry => Color::Green,
        SignalCategory::Fire => Color::LightRed,
        SignalCategory::Wait => Color::Yellow,
        SignalCategory::Hold => Color::Blue,
        SignalCategory::None => Color::DarkGray,
    }
}

fn render_signal_panel(f: &mut Frame, app: &AppState, area: Rect) {
    let snapshot = app.board.snapshot(app.active_tab);
    let error = app.board.error(app.active_tab);

    let title = match &error {
        Some(e) => format!(" {} — error: {} ", app.active_tab.label(), truncate(e, 28)),
        None => format!(" {} — CURRENT SIGNAL ", app.active_tab.label()),
    };
    let title_color = if error.is_some() { Color::Red } else { Color::Cyan };

    let lines = match &snapshot.current {
        Some(row) => {
            let c = classify(&row.signal);
            let color = category_color(c.category);
            let signal_line = if c.marker.is_empty() {
                c.remainder.clone()
            } else {
                format!("{} {}", c.marker, c.remainder)
            };
            let mut lines = vec![
                Line::from(vec![
                    Span::styled(
                        signal_line,
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw("  "),
                    Span::styled(format!("[{}]", c.category), Style::default().fg(color)),
                ]),
                Line::from(Span::styled(
                    row.odds_summary(),
                    Style::default().fg(Color::White),
                )),
            ];
            if !row.staking_plan.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("Staking: {}", row.staking_plan),
                    Style::default().fg(Color::Magenta),
                )));
            }
            lines
        }
        None => vec![Line::from(Span::styled(
            "no rows yet",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(title_color).add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(paragraph, area);
}

fn render_history(f: &mut Frame, app: &AppState, area: Rect) {
    let snapshot = app.board.snapshot(app.active_tab);

    let header_cells = ["Clock", "Score", "Signal", "Odds"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = snapshot
        .history
        .iter()
        .map(|entry| {
            let c = classify(&entry.row.signal);
            Row::new(vec![
                Cell::from(format_clock(&entry.row.clock))
                    .style(Style::default().fg(Color::DarkGray)),
                Cell::from(entry.row.score.clone()),
                Cell::from(truncate(&entry.row.signal, 24))
                    .style(Style::default().fg(category_color(c.category))),
                Cell::from(entry.odds_summary.clone()),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(6),
            Constraint::Length(7),
            Constraint::Min(16),
            Constraint::Min(24),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " SIGNAL HISTORY — newest first ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );

    f.render_widget(table, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[1 2 3 / tab] ", Style::default().fg(Color::Yellow)),
        Span::raw("market  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("match"),
    ]);
    f.render_widget(Paragraph::new(line).style(Style::default().fg(Color::White)), area);
}
