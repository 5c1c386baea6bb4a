//! Terminal map front end using ratatui
//!
//! Plays the role of the map surface: it applies render intents to its own
//! cell -> visual table and draws it. Movement with WASD, cache selection
//! with the mouse or the arrow-key cursor plus Enter.

use std::collections::HashMap;
use std::error::Error;
use std::io::stdout;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, MouseButton, MouseEvent, MouseEventKind},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::grid::{CellCoord, GeoPoint};
use crate::persistence::SaveSlot;
use crate::render::{RenderIntent, RenderSurface};
use crate::session::GameSession;

/// Screen columns per map cell.
const CELL_WIDTH: u16 = 4;

#[derive(Clone, Copy, Debug, PartialEq)]
struct CacheVisual {
    value: u32,
    in_range: bool,
}

/// What is currently drawn on the map, keyed by cell.
struct MapView {
    visuals: HashMap<CellCoord, CacheVisual>,
    player: GeoPoint,
    center: GeoPoint,
}

impl MapView {
    fn new(position: GeoPoint) -> Self {
        Self { visuals: HashMap::new(), player: position, center: position }
    }
}

impl RenderSurface for MapView {
    fn apply(&mut self, intent: &RenderIntent) {
        match *intent {
            RenderIntent::Show { cell, value, in_range } => {
                self.visuals.insert(cell, CacheVisual { value, in_range });
            }
            RenderIntent::Hide { cell } => {
                self.visuals.remove(&cell);
            }
            RenderIntent::Restyle { cell, in_range } => {
                if let Some(v) = self.visuals.get_mut(&cell) {
                    v.in_range = in_range;
                }
            }
            RenderIntent::Relabel { cell, value } => {
                if let Some(v) = self.visuals.get_mut(&cell) {
                    v.value = value;
                }
            }
            RenderIntent::MovePlayer { position } => self.player = position,
            RenderIntent::SetView { center } => self.center = center,
        }
    }
}

/// Screen layout of the map: which cell sits at the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
struct MapLayout {
    area: Rect,
    /// Cell drawn in the top-left slot (north-west corner)
    top_left: CellCoord,
}

impl MapLayout {
    fn new(area: Rect, center: CellCoord) -> Self {
        let cols = (area.width / CELL_WIDTH) as i32;
        let rows = area.height as i32;
        // North is up: rows count down in x, columns count up in y
        let top_left = CellCoord::new(center.x + rows / 2, center.y - cols / 2);
        Self { area, top_left }
    }

    fn cols(&self) -> u16 {
        self.area.width / CELL_WIDTH
    }

    fn cell_at_slot(&self, col: u16, row: u16) -> CellCoord {
        CellCoord::new(self.top_left.x - row as i32, self.top_left.y + col as i32)
    }

    /// Cell under a screen position, if it is inside the map.
    fn cell_at_screen(&self, column: u16, row: u16) -> Option<CellCoord> {
        let inside_x = column >= self.area.x && column < self.area.x + self.area.width;
        let inside_y = row >= self.area.y && row < self.area.y + self.area.height;
        if !inside_x || !inside_y {
            return None;
        }
        let col = (column - self.area.x) / CELL_WIDTH;
        if col >= self.cols() {
            return None;
        }
        Some(self.cell_at_slot(col, row - self.area.y))
    }
}

struct Explorer<S: SaveSlot> {
    session: GameSession<S>,
    view: MapView,
    /// Selection cursor, relative to the player's cell
    cursor: (i32, i32),
    message: Option<String>,
    show_help: bool,
    layout: Option<MapLayout>,
}

impl<S: SaveSlot> Explorer<S> {
    fn new(mut session: GameSession<S>) -> Self {
        let mut view = MapView::new(session.player().position);
        view.apply_all(&session.viewport_settled());
        Self { session, view, cursor: (0, 0), message: None, show_help: false, layout: None }
    }

    fn player_cell(&self) -> CellCoord {
        self.session.grid().cell_at(self.view.player)
    }

    fn cursor_cell(&self) -> CellCoord {
        let p = self.player_cell();
        CellCoord::new(p.x + self.cursor.0, p.y + self.cursor.1)
    }

    fn move_cursor(&mut self, dx: i32, dy: i32) {
        let r = self.session.config().view_radius as i32;
        self.cursor.0 = (self.cursor.0 + dx).clamp(-r, r);
        self.cursor.1 = (self.cursor.1 + dy).clamp(-r, r);
    }

    fn select(&mut self, cell: CellCoord) {
        match self.session.select_cache(cell, Instant::now()) {
            Ok((_, intents)) => self.view.apply_all(&intents),
            Err(e) => {
                log::debug!("Interaction at {} refused: {}", cell, e);
                self.message = Some(e.to_string());
            }
        }
    }

    fn render_map(&self, layout: &MapLayout, buf: &mut Buffer) {
        let player = self.player_cell();
        let cursor = self.cursor_cell();

        for row in 0..layout.area.height {
            for col in 0..layout.cols() {
                let cell = layout.cell_at_slot(col, row);
                let x = layout.area.x + col * CELL_WIDTH;
                let y = layout.area.y + row;

                let (text, mut style) = match self.view.visuals.get(&cell) {
                    Some(v) => {
                        let bg = if v.in_range { Color::Blue } else { Color::DarkGray };
                        (format!("{:^4}", v.value), Style::default().fg(Color::White).bg(bg))
                    }
                    None => (" .  ".to_string(), Style::default().fg(Color::DarkGray)),
                };
                if cell == player {
                    style = style.fg(Color::Yellow).add_modifier(Modifier::BOLD);
                    if !self.view.visuals.contains_key(&cell) {
                        buf.set_string(x, y, " @  ", style);
                        continue;
                    }
                }
                if cell == cursor {
                    style = style.add_modifier(Modifier::REVERSED);
                }
                buf.set_string(x, y, text, style);
            }
        }
    }

    fn render_celebration(&self, area: Rect, buf: &mut Buffer) {
        let target = self.session.config().achievement_target;
        let text = format!("*** You reached {}! ***", target);
        let width = text.len() as u16 + 4;
        let popup = Rect::new(
            area.x + area.width.saturating_sub(width) / 2,
            area.y + area.height.saturating_sub(3) / 2,
            width.min(area.width),
            3.min(area.height),
        );
        Clear.render(popup, buf);
        let block = Block::default().borders(Borders::ALL).style(Style::default().bg(Color::Magenta));
        let inner = block.inner(popup);
        block.render(popup, buf);
        buf.set_string(inner.x + 1, inner.y, text, Style::default().fg(Color::White).add_modifier(Modifier::BOLD));
    }

    fn render_help(&self, area: Rect, buf: &mut Buffer) {
        let help_text = [
            "=== World of Bits ===",
            "",
            "  W/A/S/D    - Move (WASD mode)",
            "  Arrow keys - Move selection cursor",
            "  Enter/Space - Use cache under cursor",
            "  Mouse click - Use clicked cache",
            "  M          - Toggle WASD/GEO movement",
            "  R          - Reset game (clears save)",
            "  ?          - Toggle this help",
            "  Q / Esc    - Quit",
            "",
            "Blue caches are in reach, grey are not.",
            "Equal values merge into their sum.",
            "",
            "Press any key to close",
        ];

        let width = 46;
        let height = help_text.len() as u16 + 2;
        let x = area.x + area.width.saturating_sub(width) / 2;
        let y = area.y + area.height.saturating_sub(height) / 2;
        let help_area = Rect::new(x, y, width.min(area.width), height.min(area.height));

        Clear.render(help_area, buf);
        let block = Block::default()
            .title(" Help ")
            .borders(Borders::ALL)
            .style(Style::default().bg(Color::DarkGray));
        let inner = block.inner(help_area);
        block.render(help_area, buf);

        for (i, line) in help_text.iter().enumerate() {
            if i as u16 >= inner.height {
                break;
            }
            buf.set_string(inner.x, inner.y + i as u16, line, Style::default().fg(Color::White));
        }
    }
}

/// Run the game until the player quits. Saves on the way out, even if the
/// terminal loop failed.
pub fn run_explorer<S: SaveSlot>(session: GameSession<S>) -> Result<(), Box<dyn Error>> {
    terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut explorer = Explorer::new(session);
    let result = event_loop(&mut terminal, &mut explorer);
    explorer.session.teardown();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

fn event_loop<S: SaveSlot, B: Backend>(terminal: &mut Terminal<B>, explorer: &mut Explorer<S>) -> Result<(), Box<dyn Error>> {
    loop {
        // Location updates arrive between key presses
        let intents = explorer.session.poll_location();
        explorer.view.apply_all(&intents);

        let now = Instant::now();
        terminal.draw(|f| {
            let size = f.area();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(1), Constraint::Length(1)])
                .split(size);
            let map_area = chunks[0];
            let status_area = chunks[1];

            let layout = MapLayout::new(map_area, explorer.session.grid().cell_at(explorer.view.center));
            explorer.render_map(&layout, f.buffer_mut());
            explorer.layout = Some(layout);

            let msg_str = explorer.message.as_ref().map(|m| format!(" | {}", m)).unwrap_or_default();
            let status = format!(
                " {} | M:{}  R:Reset  ?:Help  Q:Quit{}",
                explorer.session.status_text(),
                explorer.session.toggle_label(),
                msg_str,
            );
            let status_para = Paragraph::new(status).style(Style::default().bg(Color::DarkGray).fg(Color::White));
            f.render_widget(status_para, status_area);

            if explorer.session.celebrating(now) {
                explorer.render_celebration(map_area, f.buffer_mut());
            }
            if explorer.show_help {
                explorer.render_help(map_area, f.buffer_mut());
            }
        })?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        match event::read()? {
            Event::Key(key) => {
                explorer.message = None;
                if explorer.show_help {
                    explorer.show_help = false;
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('?') => explorer.show_help = true,
                    KeyCode::Char(c @ ('w' | 'a' | 's' | 'd' | 'W' | 'A' | 'S' | 'D')) => {
                        let intents = explorer.session.handle_key(c);
                        explorer.view.apply_all(&intents);
                    }
                    KeyCode::Up => explorer.move_cursor(1, 0),
                    KeyCode::Down => explorer.move_cursor(-1, 0),
                    KeyCode::Left => explorer.move_cursor(0, -1),
                    KeyCode::Right => explorer.move_cursor(0, 1),
                    KeyCode::Enter | KeyCode::Char(' ') => {
                        let cell = explorer.cursor_cell();
                        explorer.select(cell);
                    }
                    KeyCode::Char('m') | KeyCode::Char('M') => {
                        let mode = explorer.session.toggle_mode();
                        explorer.message = Some(format!("Moving with {}", mode));
                    }
                    KeyCode::Char('r') | KeyCode::Char('R') => {
                        let intents = explorer.session.reset();
                        explorer.view.apply_all(&intents);
                        explorer.cursor = (0, 0);
                        explorer.message = Some("Game reset".to_string());
                    }
                    _ => {}
                }
            }
            Event::Mouse(MouseEvent { kind: MouseEventKind::Down(MouseButton::Left), column, row, .. }) => {
                explorer.message = None;
                if let Some(cell) = explorer.layout.and_then(|l| l.cell_at_screen(column, row)) {
                    explorer.select(cell);
                }
            }
            _ => {}
        }
    }
}
