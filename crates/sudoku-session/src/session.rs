//! The session controller.
//!
//! Every command that changes the board goes through one internal commit step:
//! snapshot into history, mutate, mark dirty, arm the autosave debounce, notify.
//! Network work is never performed here. Requests are queued for a transport
//! ([`Session::drain_requests`]) and their results re-enter through
//! [`Session::apply_response`], which is just another command.

use crate::autosave::{AutosaveScheduler, Clock, SessionState, SystemClock};
use crate::candidates;
use crate::config::SessionConfig;
use crate::grid::{DigitSet, Grid, Position};
use crate::history::{History, Snapshot};
use crate::service::{
    Difficulty, HintOutcome, Outgoing, PuzzleBoard, PuzzleSummary, Request, RequestId, Response,
    SaveRequest, SavedPuzzle, ServiceError, ServiceResult, StrategyTier, Validation,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Free-text metadata that travels with snapshots
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionMeta {
    pub name: String,
    pub notes_text: String,
    pub difficulty: Difficulty,
}

/// How [`Session::load_board`] installs a board
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMode {
    /// Freshly generated puzzle: new identity boundary, history cleared, session dirty
    NewPuzzle,
    /// Puzzle loaded from storage under `id`: history cleared, session clean
    Saved { id: String },
    /// User-initiated bulk replace of the unfixed cells, undoable like any edit
    Replace,
}

/// Notifications for whoever renders the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    BoardChanged,
    SelectionChanged(Position),
    MetadataChanged,
    /// A save finished; `request` is the id returned by `save` or `tick`
    Saved { request: RequestId, id: String },
    SaveFailed { request: RequestId, error: ServiceError },
    Loaded { id: String },
    Generated(Difficulty),
    Validated(Validation),
    Hint(Option<HintOutcome>),
    Listed(Vec<PuzzleSummary>),
    ServiceFailed {
        operation: &'static str,
        error: ServiceError,
    },
}

type Listener = Box<dyn FnMut(&SessionEvent)>;

/// What an in-flight request needs to know when its response arrives
#[derive(Debug, Clone)]
enum Pending {
    Save { revision: u64, epoch: u64 },
    Validate { revision: u64 },
    Solve { epoch: u64 },
    Generate { difficulty: Difficulty },
    Hint { revision: u64 },
    Load { id: String },
    List,
}

impl Pending {
    fn operation(&self) -> &'static str {
        match self {
            Pending::Save { .. } => "save",
            Pending::Validate { .. } => "validate",
            Pending::Solve { .. } => "solve",
            Pending::Generate { .. } => "generate",
            Pending::Hint { .. } => "hint",
            Pending::Load { .. } => "load",
            Pending::List => "list",
        }
    }
}

pub struct Session {
    grid: Grid,
    selection: Position,
    meta: SessionMeta,
    history: History,
    state: SessionState,
    autosave: AutosaveScheduler,
    clock: Box<dyn Clock>,
    config: SessionConfig,
    running: bool,

    next_request: u64,
    outbox: Vec<Outgoing>,
    pending: BTreeMap<RequestId, Pending>,
    /// Manual save held back until the first save of an unsaved puzzle resolves
    deferred_save: Option<RequestId>,

    conflicts: Vec<Position>,
    hint_cells: Vec<Position>,
    hint_message: Option<String>,
    candidate_overlay: bool,

    listeners: Vec<Listener>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: SessionConfig, clock: Box<dyn Clock>) -> Self {
        let meta = SessionMeta {
            difficulty: config.default_difficulty,
            ..SessionMeta::default()
        };
        Self {
            grid: Grid::new(),
            selection: Position::default(),
            meta,
            history: History::new(config.history_capacity()),
            state: SessionState::default(),
            autosave: AutosaveScheduler::new(config.debounce(), config.autosave_interval()),
            clock,
            config,
            running: false,
            next_request: 1,
            outbox: Vec::new(),
            pending: BTreeMap::new(),
            deferred_save: None,
            conflicts: Vec::new(),
            hint_cells: Vec::new(),
            hint_message: None,
            candidate_overlay: false,
            listeners: Vec::new(),
        }
    }

    // ==================== Lifecycle ====================

    /// Start the periodic autosave timer
    pub fn init(&mut self) {
        self.running = true;
        self.autosave.start(self.clock.now());
        debug!("session started");
    }

    /// Stop all timers. When there are changes no in-flight save already
    /// carries, a final save request is returned for the caller to send without
    /// waiting; its response, if one ever arrives, is ignored. Delivery is not
    /// guaranteed.
    pub fn teardown(&mut self) -> Option<Outgoing> {
        self.running = false;
        self.autosave.stop();
        self.deferred_save = None;
        if !self.state.is_dirty() {
            return None;
        }
        if self.in_flight_save_revision() == Some(self.state.revision()) {
            debug!("in-flight save already covers the latest changes");
            return None;
        }
        let id = self.allocate_id();
        info!(request = %id, "flushing unsaved changes on teardown");
        Some(Outgoing {
            id,
            request: Request::Save(self.save_request()),
        })
    }

    /// Expire timers and issue an autosave when one is due.
    /// Call this from the event loop; see [`Session::next_deadline`].
    pub fn tick(&mut self) -> Option<RequestId> {
        if !self.running {
            return None;
        }
        let now = self.clock.now();
        let trigger = self.autosave.poll(now, self.state.is_dirty())?;

        if self.save_in_flight() {
            debug!(?trigger, "save already in flight, deferring autosave");
            self.autosave.arm(now);
            return None;
        }
        debug!(?trigger, "autosave due");
        Some(self.issue_save())
    }

    /// When `tick` next needs to run
    pub fn next_deadline(&self) -> Option<std::time::Instant> {
        if self.running {
            self.autosave.next_deadline()
        } else {
            None
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&SessionEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    // ==================== Accessors ====================

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn value(&self, pos: Position) -> u8 {
        self.grid.get(pos)
    }

    pub fn selection(&self) -> Position {
        self.selection
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state.is_dirty()
    }

    pub fn identity(&self) -> &str {
        self.state.identity()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Cells flagged by the last validation
    pub fn conflicts(&self) -> &[Position] {
        &self.conflicts
    }

    /// Cells pointed at by the last hint
    pub fn hint_cells(&self) -> &[Position] {
        &self.hint_cells
    }

    pub fn hint_message(&self) -> Option<&str> {
        self.hint_message.as_deref()
    }

    pub fn candidate_overlay(&self) -> bool {
        self.candidate_overlay
    }

    /// Whether any request is still waiting for its response
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || self.deferred_save.is_some()
    }

    /// Digits to draw in the small-number overlay of a cell. Filled cells show
    /// nothing; otherwise computed candidates or the manual notes, depending
    /// on the overlay mode.
    pub fn overlay(&self, pos: Position) -> DigitSet {
        if self.grid.get(pos) != 0 {
            DigitSet::empty()
        } else if self.candidate_overlay {
            candidates::candidates(&self.grid, pos)
        } else {
            self.grid.notes(pos)
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.grid.clone(), self.selection, self.meta.clone())
    }

    // ==================== Edit commands ====================

    /// Set a value (0 clears). Returns false, without touching history, for a fixed cell.
    pub fn edit_value(&mut self, pos: Position, value: u8) -> bool {
        if self.grid.is_fixed(pos) {
            return false;
        }
        debug!(%pos, value, "edit value");
        self.commit(|grid| {
            grid.set_value(pos, value);
        });
        true
    }

    /// Toggle a note digit. Fixed cells and digits outside 1-9 are ignored.
    pub fn edit_note(&mut self, pos: Position, digit: u8) -> bool {
        if self.grid.is_fixed(pos) || !(1..=9).contains(&digit) {
            return false;
        }
        debug!(%pos, digit, "toggle note");
        self.commit(|grid| {
            grid.toggle_note(pos, digit);
        });
        true
    }

    /// Move the cursor, wrapping around the board edges. Not undoable.
    pub fn move_selection(&mut self, row_delta: i32, col_delta: i32) {
        self.selection = self.selection.offset_wrapping(row_delta, col_delta);
        self.emit(SessionEvent::SelectionChanged(self.selection));
    }

    /// Place the cursor directly; out-of-range coordinates are clamped
    pub fn select(&mut self, row: usize, col: usize) {
        self.selection = Position::new(row, col);
        self.emit(SessionEvent::SelectionChanged(self.selection));
    }

    pub fn undo(&mut self) -> bool {
        let current = self.snapshot();
        let Some(previous) = self.history.undo(current) else {
            return false;
        };
        debug!(depth = self.history.undo_len(), "undo");
        self.restore(previous);
        true
    }

    pub fn redo(&mut self) -> bool {
        let current = self.snapshot();
        let Some(next) = self.history.redo(current) else {
            return false;
        };
        debug!(depth = self.history.redo_len(), "redo");
        self.restore(next);
        true
    }

    /// Fill every cell that has exactly one candidate, one undoable edit per
    /// cell. Cells are checked against the board as it is when they are
    /// reached, so an early fill can create a later single.
    pub fn auto_fill_singles(&mut self) -> usize {
        let mut filled = 0;
        for pos in Position::all() {
            if let Some(value) = candidates::sole_candidate(&self.grid, pos) {
                if self.edit_value(pos, value) {
                    filled += 1;
                }
            }
        }
        debug!(filled, "auto-fill singles");
        filled
    }

    /// Install a board. See [`LoadMode`] for how history, identity and the
    /// dirty flag are treated.
    pub fn load_board(&mut self, board: &PuzzleBoard, notes: Option<&[Vec<String>]>, mode: LoadMode) {
        self.clear_highlights();
        match mode {
            LoadMode::Replace => {
                self.commit(|grid| grid.replace_values(&board.values));
            }
            LoadMode::NewPuzzle => {
                self.history.clear();
                self.state.begin_puzzle("");
                self.grid.load(&board.values, &board.fixed, notes);
                self.selection = Position::default();
                self.touch();
                info!(epoch = self.state.epoch(), "installed new puzzle");
                self.emit(SessionEvent::BoardChanged);
            }
            LoadMode::Saved { id } => {
                self.history.clear();
                self.grid.load(&board.values, &board.fixed, notes);
                self.selection = Position::default();
                self.state.begin_puzzle(id);
                self.state.reset_clean();
                self.autosave.cancel_debounce();
                info!(id = self.state.identity(), "installed saved puzzle");
                self.emit(SessionEvent::BoardChanged);
            }
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        self.update_meta(|meta| std::mem::replace(&mut meta.name, name.clone()) != name)
    }

    pub fn set_notes_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        self.update_meta(|meta| std::mem::replace(&mut meta.notes_text, text.clone()) != text)
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) -> bool {
        self.update_meta(|meta| std::mem::replace(&mut meta.difficulty, difficulty) != difficulty)
    }

    /// Switch between showing manual notes and computed candidates
    pub fn toggle_candidate_overlay(&mut self) -> bool {
        self.candidate_overlay = !self.candidate_overlay;
        self.emit(SessionEvent::BoardChanged);
        self.candidate_overlay
    }

    // ==================== Request commands ====================

    /// Save now, regardless of timers.
    ///
    /// While the first save of an unsaved puzzle is still in flight the request
    /// is held back and sent, under the returned id, once that save resolves,
    /// so the backend does not create a second record.
    pub fn save(&mut self) -> RequestId {
        self.autosave.cancel_debounce();
        if self.state.identity().is_empty() && self.save_in_flight() {
            if let Some(id) = self.deferred_save {
                return id;
            }
            let id = self.allocate_id();
            debug!(request = %id, "deferring save until the in-flight save resolves");
            self.deferred_save = Some(id);
            return id;
        }
        self.issue_save()
    }

    pub fn validate(&mut self) -> RequestId {
        let board = self.grid.values();
        self.enqueue(
            Request::Validate { board },
            Pending::Validate {
                revision: self.state.revision(),
            },
        )
    }

    pub fn solve(&mut self) -> RequestId {
        let board = self.grid.values();
        self.enqueue(
            Request::Solve { board },
            Pending::Solve {
                epoch: self.state.epoch(),
            },
        )
    }

    pub fn generate(&mut self, difficulty: Difficulty) -> RequestId {
        self.enqueue(Request::Generate { difficulty }, Pending::Generate { difficulty })
    }

    pub fn hint(&mut self, max_tier: StrategyTier) -> RequestId {
        let board = self.grid.values();
        self.enqueue(
            Request::Hint { board, max_tier },
            Pending::Hint {
                revision: self.state.revision(),
            },
        )
    }

    pub fn load(&mut self, id: impl Into<String>) -> RequestId {
        let id = id.into();
        self.enqueue(Request::Load { id: id.clone() }, Pending::Load { id })
    }

    pub fn list(&mut self) -> RequestId {
        self.enqueue(Request::List, Pending::List)
    }

    /// Hand queued requests to the transport
    pub fn drain_requests(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply the result of an earlier request. Unknown ids are ignored.
    pub fn apply_response(&mut self, id: RequestId, result: ServiceResult<Response>) {
        let Some(pending) = self.pending.remove(&id) else {
            debug!(request = %id, "ignoring response to unknown request");
            return;
        };
        let operation = pending.operation();

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                self.report_failure(id, pending, error);
                return;
            }
        };

        match (pending, response) {
            (Pending::Save { revision, epoch }, Response::Saved { id: saved }) => {
                self.finish_save(id, revision, epoch, saved)
            }
            (Pending::Validate { revision }, Response::Validated(validation)) => {
                if revision != self.state.revision() {
                    debug!("dropping validation of an outdated board");
                    return;
                }
                self.conflicts = validation.conflicts.iter().filter_map(|c| c.position()).collect();
                self.emit(SessionEvent::Validated(validation));
            }
            (Pending::Solve { epoch }, Response::Solved(values)) => {
                if epoch != self.state.epoch() {
                    debug!("dropping solution for a previous puzzle");
                    return;
                }
                let board = PuzzleBoard {
                    values,
                    fixed: Vec::new(),
                };
                self.load_board(&board, None, LoadMode::Replace);
            }
            (Pending::Generate { difficulty }, Response::Generated(board)) => {
                self.meta = SessionMeta {
                    difficulty,
                    ..SessionMeta::default()
                };
                self.load_board(&board, None, LoadMode::NewPuzzle);
                self.emit(SessionEvent::Generated(difficulty));
            }
            (Pending::Hint { revision }, Response::Hint(outcome)) => {
                if revision != self.state.revision() {
                    debug!("dropping hint for an outdated board");
                    return;
                }
                self.hint_cells = outcome
                    .iter()
                    .flat_map(|h| h.cells.iter().filter_map(|c| c.position()))
                    .collect();
                self.hint_message = outcome.as_ref().map(|h| h.message.clone());
                self.emit(SessionEvent::Hint(outcome));
            }
            (Pending::Load { id }, Response::Loaded(puzzle)) => self.finish_load(id, puzzle),
            (Pending::List, Response::Listed(puzzles)) => self.emit(SessionEvent::Listed(puzzles)),
            (pending, other) => {
                let error = ServiceError::InvalidResponse(format!("unexpected {:?} for {}", other, operation));
                self.report_failure(id, pending, error);
            }
        }
    }

    // ==================== Internals ====================

    /// The single mutation path for undoable commands
    fn commit(&mut self, mutate: impl FnOnce(&mut Grid)) {
        let before = self.snapshot();
        self.history.record(before);
        mutate(&mut self.grid);
        self.touch();
        self.emit(SessionEvent::BoardChanged);
    }

    fn touch(&mut self) {
        self.state.mark_dirty();
        self.autosave.arm(self.clock.now());
    }

    fn restore(&mut self, snapshot: Snapshot) {
        let (grid, selection, meta) = snapshot.into_parts();
        self.grid = grid;
        self.selection = selection;
        self.meta = meta;
        self.clear_highlights();
        self.touch();
        self.emit(SessionEvent::BoardChanged);
    }

    fn update_meta(&mut self, change: impl FnOnce(&mut SessionMeta) -> bool) -> bool {
        if !change(&mut self.meta) {
            return false;
        }
        self.touch();
        self.emit(SessionEvent::MetadataChanged);
        true
    }

    fn clear_highlights(&mut self) {
        self.conflicts.clear();
        self.hint_cells.clear();
        self.hint_message = None;
    }

    fn save_request(&self) -> SaveRequest {
        SaveRequest {
            id: self.state.identity().to_string(),
            name: self.meta.name.clone(),
            notes: self.meta.notes_text.clone(),
            difficulty: Some(self.meta.difficulty),
            board: PuzzleBoard::from_grid(&self.grid),
            cell_notes: Some(self.grid.note_strings()),
        }
    }

    fn issue_save(&mut self) -> RequestId {
        let id = self.allocate_id();
        self.issue_save_as(id);
        id
    }

    fn issue_save_as(&mut self, id: RequestId) {
        let pending = Pending::Save {
            revision: self.state.revision(),
            epoch: self.state.epoch(),
        };
        let request = Request::Save(self.save_request());
        self.enqueue_as(id, request, pending);
    }

    fn save_in_flight(&self) -> bool {
        self.pending.values().any(|p| matches!(p, Pending::Save { .. }))
    }

    /// Newest revision carried by a save of the current puzzle still in flight
    fn in_flight_save_revision(&self) -> Option<u64> {
        let epoch = self.state.epoch();
        self.pending
            .values()
            .filter_map(|p| match p {
                Pending::Save { revision, epoch: e } if *e == epoch => Some(*revision),
                _ => None,
            })
            .max()
    }

    /// Send a held-back manual save once no other save is outstanding
    fn release_deferred_save(&mut self) {
        if self.save_in_flight() {
            return;
        }
        if let Some(id) = self.deferred_save.take() {
            debug!(request = %id, identity = self.state.identity(), "sending deferred save");
            self.issue_save_as(id);
        }
    }

    fn finish_save(&mut self, request: RequestId, revision: u64, epoch: u64, id: String) {
        if epoch != self.state.epoch() {
            debug!(%id, "save finished for a previous puzzle");
            self.release_deferred_save();
            return;
        }
        self.state.adopt_identity(id.clone());
        if self.state.mark_saved(revision) {
            info!(%id, "puzzle saved");
        } else {
            debug!(%id, "saved, but newer edits remain unsaved");
        }
        self.emit(SessionEvent::Saved { request, id });
        self.release_deferred_save();
    }

    fn finish_load(&mut self, requested: String, puzzle: SavedPuzzle) {
        let id = if puzzle.id.is_empty() { requested } else { puzzle.id };
        self.meta = SessionMeta {
            name: puzzle.name,
            notes_text: puzzle.notes,
            difficulty: puzzle.difficulty.unwrap_or(self.meta.difficulty),
        };
        self.load_board(&puzzle.board, puzzle.cell_notes.as_deref(), LoadMode::Saved { id: id.clone() });
        self.emit(SessionEvent::Loaded { id });
    }

    fn report_failure(&mut self, request: RequestId, pending: Pending, error: ServiceError) {
        match pending {
            Pending::Save { .. } => {
                warn!(%error, "save failed, changes stay pending");
                self.emit(SessionEvent::SaveFailed { request, error });
                self.release_deferred_save();
            }
            other => {
                warn!(operation = other.operation(), %error, "request failed");
                self.emit(SessionEvent::ServiceFailed {
                    operation: other.operation(),
                    error,
                });
            }
        }
    }

    fn allocate_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        id
    }

    fn enqueue(&mut self, request: Request, pending: Pending) -> RequestId {
        let id = self.allocate_id();
        self.enqueue_as(id, request, pending);
        id
    }

    fn enqueue_as(&mut self, id: RequestId, request: Request, pending: Pending) {
        debug!(request = %id, op = request.operation(), "queued request");
        self.pending.insert(id, pending);
        self.outbox.push(Outgoing { id, request });
    }

    fn emit(&mut self, event: SessionEvent) {
        for listener in self.listeners.iter_mut() {
            listener(&event);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("selection", &self.selection)
            .field("meta", &self.meta)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
