use crate::prefs::PrefsStore;
use crate::theme::Theme;
use crate::transport::Transport;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use sudoku_session::candidates;
use sudoku_session::service::PuzzleSummary;
use sudoku_session::{
    Difficulty, Position, RequestId, Response, ServiceError, ServiceResult, Session, SessionEvent, StrategyTier,
};
use tracing::{debug, warn};

/// How long a status message stays visible
const MESSAGE_TIME: Duration = Duration::from_secs(3);

/// Longest the event loop sleeps while waiting for input
const IDLE_TICK: Duration = Duration::from_millis(100);

/// Result of handling a key press
pub enum AppAction {
    Continue,
    Quit,
}

/// What the digit keys do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Digits set values
    Normal,
    /// Digits toggle pencil notes
    Notes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    None,
    NewPuzzle,
    Theme,
    Load,
}

/// The terminal application: a session, the worker that runs its requests,
/// and view state that is not part of the puzzle
pub struct App {
    pub session: Session,
    transport: Transport,
    events: Rc<RefCell<Vec<SessionEvent>>>,
    pub mode: InputMode,
    pub menu: MenuState,
    pub menu_selection: usize,
    pub theme: Theme,
    pub hint_tier: StrategyTier,
    pub message: Option<String>,
    message_until: Option<Instant>,
    /// Listing shown by the load menu
    pub saved_puzzles: Vec<PuzzleSummary>,
    /// Save requested with `S` that has not been answered yet
    manual_save: Option<RequestId>,
    prefs: Option<PrefsStore>,
}

impl App {
    pub fn new(mut session: Session, transport: Transport, hint_tier: StrategyTier) -> Self {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        session.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        session.init();

        Self {
            session,
            transport,
            events,
            mode: InputMode::Normal,
            menu: MenuState::None,
            menu_selection: 0,
            theme: Theme::dark(),
            hint_tier,
            message: None,
            message_until: None,
            saved_puzzles: Vec::new(),
            manual_save: None,
            prefs: None,
        }
    }

    /// Remember the difficulty of each generated puzzle in `prefs`
    pub fn with_prefs(mut self, prefs: PrefsStore) -> Self {
        self.prefs = Some(prefs);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.transport.backend_name()
    }

    /// Ask for a fresh puzzle
    pub fn start(&mut self, difficulty: Difficulty) {
        self.session.generate(difficulty);
        self.pump();
    }

    /// How long the event loop may wait for input before `pump` is due
    pub fn poll_timeout(&self) -> Duration {
        let until_deadline = self
            .session
            .next_deadline()
            .map(|at| at.saturating_duration_since(Instant::now()));
        until_deadline.map_or(IDLE_TICK, |d| d.min(IDLE_TICK))
    }

    /// Run timers, hand queued requests to the worker and apply finished ones
    pub fn pump(&mut self) {
        self.session.tick();

        for outgoing in self.session.drain_requests() {
            if let Err(outgoing) = self.transport.send(outgoing) {
                self.session.apply_response(outgoing.id, Err(ServiceError::Unavailable));
            }
        }
        for (id, result) in self.transport.poll() {
            self.session.apply_response(id, result);
        }

        self.process_events();

        if self.message_until.is_some_and(|at| Instant::now() >= at) {
            self.message = None;
            self.message_until = None;
        }
    }

    /// Stop the session and fire off a final save if anything is unsaved.
    /// Does not wait for it; the returned receiver reports when it is done.
    pub fn shutdown(&mut self) -> Option<Receiver<ServiceResult<Response>>> {
        let flush = self.session.teardown()?;
        self.transport.send_detached(flush)
    }

    pub fn show_message(&mut self, msg: impl Into<String>) {
        self.message = Some(msg.into());
        self.message_until = Some(Instant::now() + MESSAGE_TIME);
    }

    fn process_events(&mut self) {
        let events = std::mem::take(&mut *self.events.borrow_mut());
        for event in events {
            match event {
                SessionEvent::BoardChanged => {
                    if self.is_complete() {
                        self.show_message("Puzzle complete!");
                    }
                }
                SessionEvent::SelectionChanged(_) | SessionEvent::MetadataChanged => {}
                SessionEvent::Saved { request, id } => {
                    if self.manual_save == Some(request) {
                        self.manual_save = None;
                        self.show_message(format!("Saved as {}", id));
                    }
                }
                SessionEvent::SaveFailed { request, error } => {
                    if self.manual_save == Some(request) {
                        self.manual_save = None;
                        self.show_message(format!("Save failed: {}", error));
                    }
                }
                SessionEvent::Loaded { id } => self.show_message(format!("Loaded {}", id)),
                SessionEvent::Generated(difficulty) => {
                    if let Some(prefs) = &self.prefs {
                        if let Err(e) = prefs.remember_difficulty(difficulty) {
                            warn!(error = %e, "could not store preferences");
                        }
                    }
                    self.show_message(format!("New {} puzzle", difficulty));
                }
                SessionEvent::Validated(validation) => {
                    if validation.ok {
                        self.show_message("No conflicts");
                    } else {
                        self.show_message(format!("{} conflicting cells", validation.conflicts.len()));
                    }
                }
                // the hint text stays in the info panel
                SessionEvent::Hint(Some(_)) => {}
                SessionEvent::Hint(None) => self.show_message("No hint available"),
                SessionEvent::Listed(puzzles) => {
                    self.saved_puzzles = puzzles;
                    if self.menu == MenuState::Load && self.saved_puzzles.is_empty() {
                        self.menu = MenuState::None;
                        self.show_message("No saved puzzles");
                    }
                }
                SessionEvent::ServiceFailed { operation, error } => {
                    if operation == "list" {
                        self.menu = MenuState::None;
                    }
                    self.show_message(format!("{} failed: {}", operation, error));
                }
            }
        }
    }

    /// Handle a key press
    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        let action = match self.menu {
            MenuState::None => self.handle_game_key(key),
            MenuState::NewPuzzle | MenuState::Theme | MenuState::Load => self.handle_menu_key(key),
        };
        self.pump();
        action
    }

    fn handle_game_key(&mut self, key: KeyEvent) -> AppAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let pos = self.session.selection();

        match key.code {
            KeyCode::Char('q') => return AppAction::Quit,

            // Navigation
            KeyCode::Up | KeyCode::Char('k') => self.session.move_selection(-1, 0),
            KeyCode::Down | KeyCode::Char('j') => self.session.move_selection(1, 0),
            KeyCode::Left | KeyCode::Char('h') => self.session.move_selection(0, -1),
            KeyCode::Right | KeyCode::Char('l') => self.session.move_selection(0, 1),

            // Undo/Redo
            KeyCode::Char('u') => self.undo(),
            KeyCode::Char('z') if ctrl => self.undo(),
            KeyCode::Char('r') | KeyCode::Char('y') if ctrl => {
                if !self.session.redo() {
                    self.show_message("Nothing to redo");
                }
            }

            KeyCode::Char(c @ '1'..='9') => {
                let digit = c as u8 - b'0';
                let changed = match self.mode {
                    InputMode::Normal => self.session.edit_value(pos, digit),
                    InputMode::Notes => self.session.edit_note(pos, digit),
                };
                if !changed {
                    self.show_message("That cell is part of the puzzle");
                }
            }
            KeyCode::Char('0') | KeyCode::Char(' ') | KeyCode::Backspace | KeyCode::Delete => {
                if !self.session.edit_value(pos, 0) {
                    self.show_message("That cell is part of the puzzle");
                }
            }

            KeyCode::Char('n') => {
                self.mode = match self.mode {
                    InputMode::Normal => InputMode::Notes,
                    InputMode::Notes => InputMode::Normal,
                };
                let name = match self.mode {
                    InputMode::Normal => "Normal",
                    InputMode::Notes => "Notes",
                };
                self.show_message(format!("{} mode", name));
            }
            KeyCode::Char('c') => {
                let on = self.session.toggle_candidate_overlay();
                self.show_message(format!("Candidates {}", if on { "on" } else { "off" }));
            }
            KeyCode::Char('f') => {
                let filled = self.session.auto_fill_singles();
                if filled == 0 {
                    self.show_message("No singles to fill");
                } else {
                    self.show_message(format!("Filled {} cells", filled));
                }
            }

            KeyCode::Char('?') => {
                self.session.hint(self.hint_tier);
            }
            KeyCode::Char('v') => {
                self.session.validate();
            }
            KeyCode::Char('s') => {
                self.session.solve();
            }
            KeyCode::Char('S') => {
                self.manual_save = Some(self.session.save());
            }
            KeyCode::Char('L') => {
                self.session.list();
                self.open_menu(MenuState::Load);
            }
            KeyCode::Char('N') => self.open_menu(MenuState::NewPuzzle),
            KeyCode::Char('t') => self.open_menu(MenuState::Theme),

            _ => {}
        }

        AppAction::Continue
    }

    fn handle_menu_key(&mut self, key: KeyEvent) -> AppAction {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => self.menu = MenuState::None,

            KeyCode::Up | KeyCode::Char('k') => {
                self.menu_selection = self.menu_selection.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let max = self.menu_len().saturating_sub(1);
                self.menu_selection = (self.menu_selection + 1).min(max);
            }

            KeyCode::Enter | KeyCode::Char(' ') => {
                match self.menu {
                    MenuState::NewPuzzle => {
                        if let Some(difficulty) = Difficulty::all().get(self.menu_selection) {
                            self.session.generate(*difficulty);
                        }
                    }
                    MenuState::Theme => {
                        if let Some(theme) = Theme::all().into_iter().nth(self.menu_selection) {
                            self.theme = theme;
                        }
                    }
                    MenuState::Load => {
                        if let Some(summary) = self.saved_puzzles.get(self.menu_selection) {
                            debug!(id = %summary.id, "loading from menu");
                            let id = summary.id.clone();
                            self.session.load(id);
                        }
                    }
                    MenuState::None => {}
                }
                self.menu = MenuState::None;
            }

            _ => {}
        }

        AppAction::Continue
    }

    fn open_menu(&mut self, menu: MenuState) {
        self.menu = menu;
        self.menu_selection = match menu {
            MenuState::NewPuzzle => Difficulty::all()
                .iter()
                .position(|d| *d == self.session.meta().difficulty)
                .unwrap_or(0),
            _ => 0,
        };
    }

    /// Number of entries in the open menu
    pub fn menu_len(&self) -> usize {
        match self.menu {
            MenuState::NewPuzzle => Difficulty::all().len(),
            MenuState::Theme => Theme::all().len(),
            MenuState::Load => self.saved_puzzles.len(),
            MenuState::None => 0,
        }
    }

    fn undo(&mut self) {
        if !self.session.undo() {
            self.show_message("Nothing to undo");
        }
    }

    fn is_complete(&self) -> bool {
        let grid = self.session.grid();
        grid.is_full() && candidates::conflicts(grid).is_empty()
    }

    /// Check if a position is highlighted (same row, col, or box as cursor)
    pub fn is_highlighted(&self, pos: Position) -> bool {
        let cursor = self.session.selection();
        pos.row == cursor.row || pos.col == cursor.col || pos.box_index() == cursor.box_index()
    }

    /// Check if a position has the same value as the cursor
    pub fn has_same_value(&self, pos: Position) -> bool {
        let value = self.session.value(self.session.selection());
        value != 0 && self.session.value(pos) == value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use sudoku_session::{ManualClock, MemoryService, PuzzleBoard, SessionConfig};

    fn app_with(backend: Arc<MemoryService>) -> App {
        let transport = Transport::spawn(backend).unwrap();
        App::new(Session::new(SessionConfig::default()), transport, StrategyTier::Singles)
    }

    fn press(app: &mut App, code: KeyCode) -> AppAction {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(app: &mut App, c: char) -> AppAction {
        app.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    /// Pump until every request has been answered
    fn settle(app: &mut App) {
        for _ in 0..500 {
            app.pump();
            if !app.session.has_pending() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("requests did not settle");
    }

    #[test]
    fn test_digits_set_values_and_notes() {
        let mut app = app_with(Arc::new(MemoryService::new()));
        press(&mut app, KeyCode::Char('5'));
        assert_eq!(app.session.value(Position::new(0, 0)), 5);

        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Char('n'));
        press(&mut app, KeyCode::Char('3'));
        assert_eq!(app.mode, InputMode::Notes);
        assert!(app.session.grid().notes(Position::new(0, 1)).contains(3));

        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Delete);
        assert_eq!(app.session.value(Position::new(0, 0)), 0);
    }

    #[test]
    fn test_undo_and_redo_keys() {
        let mut app = app_with(Arc::new(MemoryService::new()));
        press(&mut app, KeyCode::Char('7'));
        press(&mut app, KeyCode::Char('u'));
        assert_eq!(app.session.value(Position::new(0, 0)), 0);
        ctrl(&mut app, 'r');
        assert_eq!(app.session.value(Position::new(0, 0)), 7);
        ctrl(&mut app, 'z');
        ctrl(&mut app, 'y');
        assert_eq!(app.session.value(Position::new(0, 0)), 7);

        press(&mut app, KeyCode::Char('u'));
        press(&mut app, KeyCode::Char('u'));
        assert_eq!(app.message.as_deref(), Some("Nothing to undo"));
    }

    #[test]
    fn test_wrapping_navigation() {
        let mut app = app_with(Arc::new(MemoryService::new()));
        press(&mut app, KeyCode::Char('k'));
        press(&mut app, KeyCode::Char('h'));
        assert_eq!(app.session.selection(), Position::new(8, 8));
    }

    #[test]
    fn test_manual_save_then_load_from_menu() {
        let backend = Arc::new(MemoryService::new());
        let mut app = app_with(backend.clone());
        press(&mut app, KeyCode::Char('4'));
        press(&mut app, KeyCode::Char('S'));
        settle(&mut app);
        assert_eq!(app.session.identity(), "mem-1");
        assert!(!app.session.is_dirty());
        assert_eq!(app.message.as_deref(), Some("Saved as mem-1"));

        press(&mut app, KeyCode::Char('6'));
        press(&mut app, KeyCode::Char('L'));
        settle(&mut app);
        assert_eq!(app.menu, MenuState::Load);
        assert_eq!(app.saved_puzzles.len(), 1);

        press(&mut app, KeyCode::Enter);
        settle(&mut app);
        assert_eq!(app.menu, MenuState::None);
        assert_eq!(app.session.value(Position::new(0, 0)), 4);
        assert!(!app.session.history().can_undo());
    }

    #[test]
    fn test_manual_save_reports_its_own_result() {
        let backend = Arc::new(MemoryService::new());
        let clock = ManualClock::new();
        let session = Session::with_clock(SessionConfig::default(), Box::new(clock.clone()));
        let transport = Transport::spawn(backend.clone()).unwrap();
        let mut app = App::new(session, transport, StrategyTier::Singles);

        press(&mut app, KeyCode::Char('4'));
        clock.advance_ms(2000);
        // autosave is queued but not yet answered when S arrives
        assert!(app.session.tick().is_some());
        press(&mut app, KeyCode::Char('S'));
        assert_eq!(app.message, None);

        settle(&mut app);
        assert_eq!(backend.count(), 1);
        assert_eq!(app.session.identity(), "mem-1");
        assert_eq!(app.message.as_deref(), Some("Saved as mem-1"));
    }

    #[test]
    fn test_new_puzzle_menu_generates() {
        let backend = Arc::new(MemoryService::new());
        let mut values = vec![vec![0u8; 9]; 9];
        values[4][4] = 9;
        let mut fixed = vec![vec![false; 9]; 9];
        fixed[4][4] = true;
        backend.set_generated(PuzzleBoard { values, fixed });

        let mut app = app_with(backend);
        press(&mut app, KeyCode::Char('N'));
        assert_eq!(app.menu, MenuState::NewPuzzle);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        settle(&mut app);

        assert_eq!(app.session.meta().difficulty, Difficulty::Hard);
        assert!(app.session.grid().is_fixed(Position::new(4, 4)));
        assert_eq!(app.session.identity(), "");
    }

    #[test]
    fn test_generated_difficulty_is_remembered() {
        let dir = tempfile::TempDir::new().unwrap();
        let backend = Arc::new(MemoryService::new());
        backend.set_generated(PuzzleBoard {
            values: vec![vec![0; 9]; 9],
            fixed: vec![vec![false; 9]; 9],
        });
        let mut app = app_with(backend).with_prefs(PrefsStore::in_dir(dir.path()));
        app.start(Difficulty::Expert);
        settle(&mut app);

        let prefs = PrefsStore::in_dir(dir.path()).load();
        assert_eq!(prefs.last_difficulty, Some(Difficulty::Expert));
    }

    #[test]
    fn test_failures_are_reported_not_fatal() {
        let backend = Arc::new(MemoryService::new());
        backend.set_available(false);
        let mut app = app_with(backend);
        press(&mut app, KeyCode::Char('L'));
        settle(&mut app);
        assert_eq!(app.menu, MenuState::None);
        assert!(app.message.as_deref().is_some_and(|m| m.starts_with("list failed")));
    }

    #[test]
    fn test_theme_menu() {
        let mut app = app_with(Arc::new(MemoryService::new()));
        press(&mut app, KeyCode::Char('t'));
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.theme.name, "Light");
    }

    #[test]
    fn test_shutdown_flushes_unsaved_changes() {
        let backend = Arc::new(MemoryService::new());
        let mut app = app_with(backend.clone());
        press(&mut app, KeyCode::Char('2'));

        let done = app.shutdown().unwrap();
        assert!(done.recv_timeout(Duration::from_secs(5)).unwrap().is_ok());
        assert_eq!(backend.count(), 1);
        assert!(app.shutdown().is_none());
    }

    #[test]
    fn test_shutdown_without_changes_sends_nothing() {
        let backend = Arc::new(MemoryService::new());
        let mut app = app_with(backend.clone());
        assert!(app.shutdown().is_none());
        assert_eq!(backend.count(), 0);
    }

    #[test]
    fn test_quit_key() {
        let mut app = app_with(Arc::new(MemoryService::new()));
        assert!(matches!(press(&mut app, KeyCode::Char('q')), AppAction::Quit));
    }
}
