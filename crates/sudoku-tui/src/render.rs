use crate::app::{App, InputMode, MenuState};
use crate::theme::Theme;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Color, Print, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use std::io;
use sudoku_session::{DigitSet, Difficulty, Position};

const GRID_WIDTH: u16 = 37;
const GRID_HEIGHT: u16 = 19;
const PANEL_WIDTH: usize = 22;

pub fn render(stdout: &mut io::Stdout, app: &App) -> io::Result<()> {
    let (term_width, term_height) = terminal::size()?;

    execute!(stdout, Hide, SetBackgroundColor(app.theme.bg), Clear(ClearType::All))?;
    render_game_screen(stdout, app, term_width, term_height)?;
    execute!(stdout, Show)?;
    Ok(())
}

fn render_game_screen(stdout: &mut io::Stdout, app: &App, term_width: u16, term_height: u16) -> io::Result<()> {
    // Center the grid horizontally, leave room for info panel
    let total_width = GRID_WIDTH + 3 + PANEL_WIDTH as u16;
    let start_x = if term_width > total_width {
        (term_width - total_width) / 2
    } else {
        1
    };
    let start_y = if term_height > GRID_HEIGHT + 8 { 2 } else { 1 };

    render_grid(stdout, app, start_x, start_y)?;
    render_info_panel(stdout, app, start_x + GRID_WIDTH + 3, start_y)?;
    render_controls(stdout, app, start_x, start_y + GRID_HEIGHT + 1)?;

    if let Some(ref msg) = app.message {
        render_message(stdout, app, msg, term_width)?;
    }

    if app.menu != MenuState::None {
        render_menu(stdout, app, term_width, term_height)?;
    }

    Ok(())
}

fn render_grid(stdout: &mut io::Stdout, app: &App, x: u16, y: u16) -> io::Result<()> {
    let theme = &app.theme;

    // +===+===+===+ ... each cell is " X " between borders
    execute!(
        stdout,
        SetBackgroundColor(theme.bg),
        MoveTo(x, y),
        SetForegroundColor(theme.box_border),
        Print("+===+===+===+===+===+===+===+===+===+")
    )?;

    for row in 0..9 {
        let cell_y = y + 1 + row as u16 * 2;
        execute!(stdout, MoveTo(x, cell_y))?;

        for col in 0..9 {
            if col % 3 == 0 {
                execute!(
                    stdout,
                    SetBackgroundColor(theme.bg),
                    SetForegroundColor(theme.box_border),
                    Print("║")
                )?;
            } else {
                execute!(
                    stdout,
                    SetBackgroundColor(theme.bg),
                    SetForegroundColor(theme.border),
                    Print("│")
                )?;
            }
            render_cell(stdout, app, Position::new(row, col))?;
        }
        execute!(
            stdout,
            SetBackgroundColor(theme.bg),
            SetForegroundColor(theme.box_border),
            Print("║")
        )?;

        let (color, separator) = if (row + 1) % 3 == 0 {
            (theme.box_border, "+===+===+===+===+===+===+===+===+===+")
        } else {
            (theme.border, "+---+---+---+---+---+---+---+---+---+")
        };
        execute!(stdout, MoveTo(x, cell_y + 1), SetForegroundColor(color), Print(separator))?;
    }

    Ok(())
}

fn render_cell(stdout: &mut io::Stdout, app: &App, pos: Position) -> io::Result<()> {
    let theme = &app.theme;
    let session = &app.session;
    let cell = session.grid().cell(pos);
    let value = cell.value();

    let bg = if pos == session.selection() {
        theme.selected_bg
    } else if session.hint_cells().contains(&pos) {
        theme.hint_bg
    } else if app.has_same_value(pos) || app.is_highlighted(pos) {
        theme.highlight_bg
    } else {
        theme.bg
    };

    let fg = if session.conflicts().contains(&pos) {
        theme.conflict
    } else if cell.is_fixed() {
        theme.given
    } else {
        theme.filled
    };

    execute!(stdout, SetBackgroundColor(bg), SetForegroundColor(fg))?;

    if value != 0 {
        return execute!(stdout, Print(format!(" {} ", value)));
    }

    execute!(stdout, SetForegroundColor(theme.note), Print(cell_marks(session.overlay(pos))))
}

/// Three columns of small digits for an empty cell: up to two digits fit,
/// more collapse to `*` and are listed in the info panel
fn cell_marks(marks: DigitSet) -> String {
    let digits: Vec<u8> = marks.iter().collect();
    match digits.as_slice() {
        [] => " · ".to_string(),
        [d] => format!(" {} ", d),
        [a, b] => format!("{}{} ", a, b),
        _ => " * ".to_string(),
    }
}

/// The selected cell's marks, labelled by overlay mode
fn marks_line(app: &App) -> String {
    let session = &app.session;
    let label = if session.candidate_overlay() { "Cands:" } else { "Notes:" };
    let digits: Vec<String> = session
        .overlay(session.selection())
        .iter()
        .map(|d| d.to_string())
        .collect();
    format!("{} {:>15}", label, digits.join(" "))
}

fn render_info_panel(stdout: &mut io::Stdout, app: &App, x: u16, y: u16) -> io::Result<()> {
    let theme = &app.theme;
    let session = &app.session;
    let meta = session.meta();

    execute!(
        stdout,
        SetBackgroundColor(theme.bg),
        MoveTo(x, y),
        SetForegroundColor(theme.key),
        Print("═══ SUDOKU ═══")
    )?;

    let name = if meta.name.is_empty() { "(untitled)" } else { meta.name.as_str() };
    let id = match session.identity() {
        "" => "unsaved".to_string(),
        id => truncate(id, 12),
    };
    let rows = [
        format!("Name:  {:>15}", truncate(name, 15)),
        format!("Level: {:>15}", meta.difficulty.label()),
        format!("Id:    {:>15}", id),
        format!("Store: {:>15}", app.backend_name()),
    ];
    for (i, row) in rows.iter().enumerate() {
        execute!(
            stdout,
            MoveTo(x, y + 2 + i as u16),
            SetForegroundColor(theme.info),
            Print(row)
        )?;
    }

    // Save status
    let (status, color) = if session.has_pending() {
        ("working", theme.key)
    } else if session.is_dirty() {
        ("unsaved", theme.conflict)
    } else {
        ("saved", theme.success)
    };
    execute!(
        stdout,
        MoveTo(x, y + 7),
        SetForegroundColor(theme.info),
        Print("State: "),
        SetForegroundColor(color),
        Print(format!("{:>15}", status))
    )?;

    let (mode, mode_color) = match app.mode {
        InputMode::Normal => ("Normal", theme.fg),
        InputMode::Notes => ("Notes", theme.note),
    };
    execute!(
        stdout,
        MoveTo(x, y + 9),
        SetForegroundColor(theme.info),
        Print("Mode: "),
        SetForegroundColor(mode_color),
        Print(format!("{:>16}", mode))
    )?;

    let overlay = if session.candidate_overlay() { "candidates" } else { "notes" };
    let history = session.history();
    execute!(
        stdout,
        MoveTo(x, y + 10),
        SetForegroundColor(theme.info),
        Print(format!("Marks: {:>15}", overlay)),
        MoveTo(x, y + 11),
        Print(format!(
            "Undo {:>3}   Redo {:>3}",
            history.undo_len(),
            history.redo_len()
        ))
    )?;

    execute!(
        stdout,
        MoveTo(x, y + 12),
        SetForegroundColor(theme.border),
        Print("─".repeat(PANEL_WIDTH))
    )?;

    let pos = session.selection();
    execute!(
        stdout,
        MoveTo(x, y + 13),
        SetForegroundColor(theme.info),
        Print(format!("Cell: Row {} Col {}", pos.row + 1, pos.col + 1)),
        MoveTo(x, y + 14),
        SetForegroundColor(theme.note),
        Print(marks_line(app))
    )?;

    if let Some(hint) = session.hint_message() {
        execute!(
            stdout,
            MoveTo(x, y + 16),
            SetForegroundColor(theme.success),
            Print("Hint")
        )?;
        for (i, line) in wrap_text(hint, PANEL_WIDTH).iter().take(6).enumerate() {
            execute!(
                stdout,
                MoveTo(x, y + 17 + i as u16),
                SetForegroundColor(theme.fg),
                Print(line)
            )?;
        }
    }

    Ok(())
}

fn render_controls(stdout: &mut io::Stdout, app: &App, x: u16, y: u16) -> io::Result<()> {
    let theme = &app.theme;

    execute!(stdout, SetBackgroundColor(theme.bg))?;

    let controls = [
        ("hjkl", "Move"),
        ("1-9", "Set/Note"),
        ("0/Del", "Clear"),
        ("n", "Notes mode"),
        ("u/^Z", "Undo"),
        ("^R/^Y", "Redo"),
        ("f", "Fill singles"),
        ("c", "Candidates"),
        ("?", "Hint"),
        ("v", "Validate"),
        ("s", "Solve"),
        ("N", "New puzzle"),
        ("S", "Save"),
        ("L", "Load"),
        ("t", "Theme"),
        ("q", "Quit"),
    ];

    // 4 columns of 4
    for (i, (key, desc)) in controls.iter().enumerate() {
        let cx = x + (i / 4) as u16 * 17;
        let cy = y + (i % 4) as u16;
        execute!(
            stdout,
            MoveTo(cx, cy),
            SetForegroundColor(theme.key),
            Print(format!("{:>6}", key)),
            SetForegroundColor(theme.info),
            Print(format!(" {}", desc))
        )?;
    }

    Ok(())
}

fn render_message(stdout: &mut io::Stdout, app: &App, msg: &str, term_width: u16) -> io::Result<()> {
    let theme = &app.theme;
    let padded = format!("  {}  ", msg);
    let x = term_width.saturating_sub(padded.chars().count() as u16) / 2;

    execute!(
        stdout,
        MoveTo(x, 0),
        SetForegroundColor(theme.fg),
        SetBackgroundColor(theme.selected_bg),
        Print(&padded)
    )?;

    Ok(())
}

/// Title and entries for the open menu
fn menu_options(app: &App) -> (&'static str, Vec<String>) {
    match app.menu {
        MenuState::NewPuzzle => (
            "New Puzzle",
            Difficulty::all().iter().map(|d| capitalize(d.label())).collect(),
        ),
        MenuState::Theme => ("Theme", Theme::all().iter().map(|t| t.name.to_string()).collect()),
        MenuState::Load => (
            "Load Puzzle",
            app.saved_puzzles
                .iter()
                .map(|p| format!("{} {}", truncate(&p.to_string(), 18), p.difficulty.label()))
                .collect(),
        ),
        MenuState::None => ("", Vec::new()),
    }
}

fn render_menu(stdout: &mut io::Stdout, app: &App, term_width: u16, term_height: u16) -> io::Result<()> {
    let theme = &app.theme;
    let (title, options) = menu_options(app);

    // Long listings scroll with the selection
    let visible = (term_height.saturating_sub(8) as usize).clamp(1, 12);
    let first = app.menu_selection.saturating_sub(visible - 1);
    let shown = options.len().min(visible).max(1);

    let menu_width: u16 = 30;
    let menu_height = shown as u16 + 5;
    let x = term_width.saturating_sub(menu_width) / 2;
    let y = term_height.saturating_sub(menu_height) / 2;

    for row in 0..menu_height {
        execute!(
            stdout,
            MoveTo(x, y + row),
            SetBackgroundColor(theme.menu_bg),
            Print(" ".repeat(menu_width as usize))
        )?;
    }

    execute!(
        stdout,
        MoveTo(x + (menu_width - title.len() as u16) / 2, y + 1),
        SetForegroundColor(theme.key),
        Print(title)
    )?;

    if options.is_empty() {
        execute!(
            stdout,
            MoveTo(x + 2, y + 3),
            SetForegroundColor(theme.info),
            Print(format!(" {:^24} ", "loading..."))
        )?;
        return Ok(());
    }

    for (i, option) in options.iter().enumerate().skip(first).take(visible) {
        let (fg, bg) = if i == app.menu_selection {
            (Color::Black, theme.key)
        } else {
            (theme.fg, theme.menu_bg)
        };
        execute!(
            stdout,
            MoveTo(x + 2, y + 3 + (i - first) as u16),
            SetForegroundColor(fg),
            SetBackgroundColor(bg),
            Print(format!(" {:^24} ", option))
        )?;
    }

    Ok(())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_width && !current.is_empty() {
            lines.push(current);
            current = String::new();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use sudoku_session::{MemoryService, Session, SessionConfig, StrategyTier};

    fn app() -> App {
        let transport = Transport::spawn(Arc::new(MemoryService::new())).unwrap();
        App::new(Session::new(SessionConfig::default()), transport, StrategyTier::Singles)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn test_marks_line_follows_overlay_mode() {
        let mut app = app();
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Char('5'));
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Char('n'));
        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('7'));
        assert_eq!(marks_line(&app), format!("Notes: {:>15}", "2 7"));

        press(&mut app, KeyCode::Char('c'));
        assert_eq!(marks_line(&app), "Cands: 1 2 3 4 6 7 8 9");
    }

    #[test]
    fn test_cell_marks_fit_three_columns() {
        assert_eq!(cell_marks(DigitSet::empty()), " · ");
        assert_eq!(cell_marks([4].into_iter().collect()), " 4 ");
        assert_eq!(cell_marks([2, 7].into_iter().collect()), "27 ");
        assert_eq!(cell_marks([1, 2, 3].into_iter().collect()), " * ");
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(
            wrap_text("Single: only 4 fits here", 12),
            vec!["Single: only", "4 fits here"]
        );
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn test_truncate_and_capitalize() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("1700000000000000000", 8), "1700000…");
        assert_eq!(capitalize("expert"), "Expert");
        assert_eq!(capitalize(""), "");
    }
}
